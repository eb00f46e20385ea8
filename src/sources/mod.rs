//! Scan export sources.
//!
//! Each source retrieves the complete export document and implements the
//! [`DocumentSource`] trait.
//!
//! # Available Sources
//!
//! - [`http::HttpSource`] - streamed HTTP GET of the published export
//! - [`file::FileSource`] - a local copy of the export

pub mod file;
pub mod http;

use crate::error::{DashboardError, Result};
use crate::models::VulnerabilityData;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub use file::FileSource;
pub use http::HttpSource;

/// Highest percentage reported before the document has been decoded.
const MAX_PARTIAL_PROGRESS: f64 = 99.9;

/// Trait for scan export sources.
///
/// # Example
///
/// ```ignore
/// use vulnera_dashboard::sources::DocumentSource;
/// use vulnera_dashboard::sources::FetchedExport;
/// use async_trait::async_trait;
///
/// struct Fixture(serde_json::Value);
///
/// #[async_trait]
/// impl DocumentSource for Fixture {
///     async fn fetch(&self, on_progress: &mut (dyn FnMut(f64) + Send)) -> Result<FetchedExport> {
///         let export = FetchedExport::from_value(self.0.clone())?;
///         on_progress(100.0);
///         Ok(export)
///     }
///
///     fn name(&self) -> &str {
///         "fixture"
///     }
/// }
/// ```
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Retrieve and decode the whole export.
    ///
    /// `on_progress` receives percentages in increasing order while bytes
    /// arrive (only when the total size is known), then `100.0` exactly once
    /// after the document decoded successfully. Nothing is returned and 100 is
    /// never reported on failure.
    async fn fetch(&self, on_progress: &mut (dyn FnMut(f64) + Send)) -> Result<FetchedExport>;

    /// Name of this source, used in logs.
    fn name(&self) -> &str;
}

/// A decoded export: the document exactly as received plus its typed view.
///
/// `raw` is what gets cached, so fields the model does not know about
/// survive a cache round trip untouched.
#[derive(Debug, Clone)]
pub struct FetchedExport {
    pub raw: Value,
    pub data: VulnerabilityData,
}

impl FetchedExport {
    /// Build the typed view of an already parsed document.
    pub fn from_value(raw: Value) -> Result<Self> {
        let data = VulnerabilityData::deserialize(&raw)
            .map_err(|e| DashboardError::decode(format!("export has an unexpected shape: {}", e)))?;
        Ok(Self { raw, data })
    }
}

/// Decode a fully received export body.
pub fn decode_document(bytes: &[u8]) -> Result<FetchedExport> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        DashboardError::decode(format!("export is not valid UTF-8: {}", e))
    })?;
    let raw: Value = serde_json::from_str(text)
        .map_err(|e| DashboardError::decode(format!("export is not valid JSON: {}", e)))?;
    FetchedExport::from_value(raw)
}

/// Turns received byte counts into percentage callbacks.
pub(crate) struct ProgressTracker<'a> {
    total: Option<u64>,
    received: u64,
    last_reported: f64,
    callback: &'a mut (dyn FnMut(f64) + Send),
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(total: Option<u64>, callback: &'a mut (dyn FnMut(f64) + Send)) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            received: 0,
            last_reported: 0.0,
            callback,
        }
    }

    pub(crate) fn received(&self) -> u64 {
        self.received
    }

    pub(crate) fn advance(&mut self, bytes: usize) {
        self.received += bytes as u64;

        if let Some(total) = self.total {
            let percent =
                (self.received as f64 / total as f64 * 100.0).min(MAX_PARTIAL_PROGRESS);
            if percent > self.last_reported {
                self.last_reported = percent;
                (self.callback)(percent);
            }
        }
    }

    pub(crate) fn complete(self) {
        debug!("Received {} bytes", self.received);
        (self.callback)(100.0);
    }
}
