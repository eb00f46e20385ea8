//! Single-slot expiring cache for the raw scan export.
//!
//! The export is large and changes at most daily, so the last successful
//! download is kept locally together with its capture time. Every operation
//! on [`CacheStore`] is infallible from the caller's point of view: storage
//! failures are logged and read as "nothing cached", so the pipeline always
//! falls back to a fresh download.

use crate::error::{DashboardError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Key of the one and only cache slot.
pub const CACHE_KEY: &str = "main_data";
/// Schema tag stamped on every entry; entries with another tag are ignored.
pub const CACHE_VERSION: &str = "1.0";
/// Default freshness window.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const ZSTD_LEVEL: i32 = 3;

/// The persisted cache slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: String,
    pub data: Value,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub version: String,
}

impl CacheEntry {
    /// Stamp a payload with the current time and schema version.
    pub fn new(data: Value) -> Self {
        Self::with_timestamp(data, Utc::now().timestamp_millis())
    }

    pub fn with_timestamp(data: Value, timestamp: i64) -> Self {
        Self {
            id: CACHE_KEY.to_string(),
            data,
            timestamp,
            version: CACHE_VERSION.to_string(),
        }
    }

    /// Time elapsed since capture. Entries stamped in the future have zero age.
    pub fn age(&self) -> Duration {
        let elapsed = Utc::now().timestamp_millis().saturating_sub(self.timestamp);
        Duration::from_millis(elapsed.max(0) as u64)
    }

    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.version == CACHE_VERSION && self.age() < ttl
    }

    /// Approximate payload size, as serialized JSON.
    pub fn payload_size(&self) -> u64 {
        serde_json::to_vec(&self.data)
            .map(|bytes| bytes.len() as u64)
            .unwrap_or(0)
    }
}

/// Diagnostics about the cache slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheInfo {
    pub present: bool,
    pub age: Option<Duration>,
    pub approximate_size_bytes: Option<u64>,
}

impl CacheInfo {
    fn from_entry(entry: Option<&CacheEntry>) -> Self {
        match entry {
            Some(entry) => Self {
                present: true,
                age: Some(entry.age()),
                approximate_size_bytes: Some(entry.payload_size()),
            },
            None => Self::default(),
        }
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// The cached payload, or `None` when nothing fresh is stored.
    ///
    /// Expired entries are left in place; the next `write` replaces them.
    async fn read(&self) -> Option<Value>;

    /// Replace the slot with `payload`, stamped with the current time.
    async fn write(&self, payload: &Value);

    /// Remove the slot.
    async fn clear(&self);

    /// Describe the slot without modifying it.
    async fn info(&self) -> CacheInfo;
}

/// Cache slot kept in a zstd-compressed file.
pub struct FileCacheStore {
    dir: PathBuf,
    ttl: Duration,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_ttl(dir, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json.zst", CACHE_KEY))
    }

    fn temp_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json.zst.tmp", CACHE_KEY))
    }

    fn compress(data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = zstd::stream::write::Encoder::new(Vec::new(), ZSTD_LEVEL)
            .map_err(|e| DashboardError::compression(e.to_string()))?;
        encoder
            .write_all(data)
            .map_err(|e| DashboardError::compression(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| DashboardError::compression(e.to_string()))
    }

    fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = zstd::stream::read::Decoder::new(data)
            .map_err(|e| DashboardError::compression(e.to_string()))?;
        let mut decoded = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut decoded)
            .map_err(|e| DashboardError::compression(e.to_string()))?;
        Ok(decoded)
    }

    /// Load the stored entry regardless of its age.
    pub async fn load_entry(&self) -> Result<Option<CacheEntry>> {
        let bytes = match fs::read(self.entry_path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(DashboardError::cache(format!("read failed: {}", e))),
        };

        let decompressed = Self::decompress(&bytes)?;
        let entry: CacheEntry = serde_json::from_slice(&decompressed)
            .map_err(|e| DashboardError::cache(format!("corrupt entry: {}", e)))?;
        Ok(Some(entry))
    }

    /// Persist an entry as-is, replacing the file atomically.
    pub async fn store_entry(&self, entry: &CacheEntry) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DashboardError::cache(format!("cannot create {:?}: {}", self.dir, e)))?;

        let json = serde_json::to_vec(entry)?;
        let compressed = Self::compress(&json)?;

        let temp_path = self.temp_path();
        fs::write(&temp_path, &compressed)
            .await
            .map_err(|e| DashboardError::cache(format!("write failed: {}", e)))?;
        if let Err(e) = fs::rename(&temp_path, self.entry_path()).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                warn!("Failed to remove {:?}: {}", temp_path, cleanup);
            }
            return Err(DashboardError::cache(format!("rename failed: {}", e)));
        }

        debug!(
            "Stored cache entry ({} bytes, {} compressed)",
            json.len(),
            compressed.len()
        );
        Ok(())
    }

    /// Delete the stored entry; a missing file is not an error.
    pub async fn remove_entry(&self) -> Result<()> {
        match fs::remove_file(self.entry_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DashboardError::cache(format!("remove failed: {}", e))),
        }
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    #[instrument(skip(self), fields(dir = ?self.dir))]
    async fn read(&self) -> Option<Value> {
        match self.load_entry().await {
            Ok(Some(entry)) if entry.is_fresh(self.ttl) => {
                info!("Loaded export from cache (age: {}s)", entry.age().as_secs());
                Some(entry.data)
            }
            Ok(Some(entry)) => {
                info!(
                    "Cached export expired (age: {}s), will fetch fresh data",
                    entry.age().as_secs()
                );
                None
            }
            Ok(None) => {
                debug!("No cached export found");
                None
            }
            Err(e) => {
                warn!("Failed to read cache, treating as miss: {}", e);
                None
            }
        }
    }

    #[instrument(skip(self, payload), fields(dir = ?self.dir))]
    async fn write(&self, payload: &Value) {
        match self.store_entry(&CacheEntry::new(payload.clone())).await {
            Ok(()) => info!("Export cached successfully"),
            Err(e) => warn!("Failed to write cache: {}", e),
        }
    }

    async fn clear(&self) {
        match self.remove_entry().await {
            Ok(()) => info!("Cache cleared"),
            Err(e) => warn!("Failed to clear cache: {}", e),
        }
    }

    async fn info(&self) -> CacheInfo {
        match self.load_entry().await {
            Ok(entry) => CacheInfo::from_entry(entry.as_ref()),
            Err(e) => {
                warn!("Failed to inspect cache: {}", e);
                CacheInfo::default()
            }
        }
    }
}

/// Process-local cache slot, used as a substitute store in tests and embeddings.
pub struct MemoryCacheStore {
    entry: RwLock<Option<CacheEntry>>,
    ttl: Duration,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            ttl,
        }
    }

    /// The stored entry regardless of its age.
    pub async fn entry(&self) -> Option<CacheEntry> {
        self.entry.read().await.clone()
    }

    /// Replace the stored entry as-is.
    pub async fn set_entry(&self, entry: CacheEntry) {
        *self.entry.write().await = Some(entry);
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn read(&self) -> Option<Value> {
        self.entry
            .read()
            .await
            .as_ref()
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.data.clone())
    }

    async fn write(&self, payload: &Value) {
        self.set_entry(CacheEntry::new(payload.clone())).await;
    }

    async fn clear(&self) {
        *self.entry.write().await = None;
    }

    async fn info(&self) -> CacheInfo {
        CacheInfo::from_entry(self.entry.read().await.as_ref())
    }
}
