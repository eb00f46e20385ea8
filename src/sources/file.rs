use super::{DocumentSource, FetchedExport, ProgressTracker, decode_document};
use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{info, instrument};

const CHUNK_SIZE: usize = 64 * 1024;

/// Reads the export from a local file, e.g. a copy downloaded out of band.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DocumentSource for FileSource {
    #[instrument(skip(self, on_progress), fields(path = ?self.path))]
    async fn fetch(&self, on_progress: &mut (dyn FnMut(f64) + Send)) -> Result<FetchedExport> {
        let mut file = File::open(&self.path).await?;
        let total = file.metadata().await?.len();

        let mut body = Vec::with_capacity(total as usize);
        let mut tracker = ProgressTracker::new(Some(total), on_progress);
        let mut chunk = vec![0u8; CHUNK_SIZE];

        loop {
            let read = file.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
            tracker.advance(read);
        }

        let export = decode_document(&body)?;
        info!(
            "Loaded export from file: {} groups, {} vulnerabilities",
            export.data.groups.len(),
            export.data.vulnerability_count()
        );
        tracker.complete();

        Ok(export)
    }

    fn name(&self) -> &str {
        "file"
    }
}
