use super::{DocumentSource, FetchedExport, ProgressTracker, decode_document};
use crate::error::{DashboardError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{info, instrument};

/// Upper bound on the buffer reserved up front from `Content-Length`.
const MAX_PREALLOCATION: u64 = 256 * 1024 * 1024;

/// Downloads the export with a single streamed GET.
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    /// Use a preconfigured client (timeouts, proxies, user agent).
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DocumentSource for HttpSource {
    #[instrument(skip(self, on_progress), fields(url = %self.url))]
    async fn fetch(&self, on_progress: &mut (dyn FnMut(f64) + Send)) -> Result<FetchedExport> {
        info!("Fetching scan export...");

        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DashboardError::network(
                status.as_u16(),
                status.canonical_reason().unwrap_or("request failed"),
            ));
        }

        let total = response.content_length();
        let mut body = Vec::with_capacity(total.unwrap_or(0).min(MAX_PREALLOCATION) as usize);
        let mut tracker = ProgressTracker::new(total, on_progress);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            body.extend_from_slice(&chunk);
            tracker.advance(chunk.len());
        }

        let export = decode_document(&body)?;
        info!(
            "Fetched export: {} bytes, {} groups, {} vulnerabilities",
            tracker.received(),
            export.data.groups.len(),
            export.data.vulnerability_count()
        );
        tracker.complete();

        Ok(export)
    }

    fn name(&self) -> &str {
        "HTTP"
    }
}
