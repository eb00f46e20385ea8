use crate::aggregator::{DashboardStats, StatsAggregator};
use crate::config::Config;
use crate::error::{DashboardError, Result};
use crate::models::{ProcessedVulnerability, VulnerabilityData};
use crate::normalizer::normalize;
use crate::sources::{DocumentSource, FetchedExport, FileSource, HttpSource};
use crate::store::{CacheInfo, CacheStore, FileCacheStore, MemoryCacheStore};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Where a loaded dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOrigin {
    Cache,
    Network,
}

/// Normalized records plus the statistics of the unfiltered set.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub records: Vec<ProcessedVulnerability>,
    pub stats: DashboardStats,
    pub origin: DataOrigin,
}

impl Dataset {
    fn from_document(data: &VulnerabilityData, origin: DataOrigin) -> Self {
        let records = normalize(data);
        let stats = StatsAggregator::aggregate(&records);
        Self {
            records,
            stats,
            origin,
        }
    }
}

/// Clears the in-flight flag however the ingestion ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Cache-first loader for the dashboard dataset.
pub struct DashboardManager {
    source: Arc<dyn DocumentSource>,
    store: Arc<dyn CacheStore>,
    in_flight: AtomicBool,
}

impl DashboardManager {
    pub fn builder() -> DashboardManagerBuilder {
        DashboardManagerBuilder::default()
    }

    /// HTTP source and file cache as configured.
    pub fn from_config(config: &Config) -> Self {
        Self {
            source: Arc::new(HttpSource::new(config.data_source_url.clone())),
            store: Arc::new(FileCacheStore::with_ttl(&config.cache_dir, config.cache_ttl)),
            in_flight: AtomicBool::new(false),
        }
    }

    fn begin(&self) -> Result<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DashboardError::IngestionInProgress)?;
        Ok(InFlightGuard(&self.in_flight))
    }

    /// Load the dataset, using the cached export when it is still fresh.
    ///
    /// On a miss the export is fetched from the source and cached before
    /// returning; a failed fetch leaves the cache untouched. Progress is only
    /// reported when the source is actually used.
    pub async fn load(&self, on_progress: &mut (dyn FnMut(f64) + Send)) -> Result<Dataset> {
        let _guard = self.begin()?;

        if let Some(data) = self.cached_document().await {
            let dataset = Dataset::from_document(&data, DataOrigin::Cache);
            info!("Loaded {} records from cache", dataset.records.len());
            return Ok(dataset);
        }

        self.fetch_and_store(on_progress).await
    }

    /// Fetch a fresh export regardless of the cache, then cache it.
    pub async fn refresh(&self, on_progress: &mut (dyn FnMut(f64) + Send)) -> Result<Dataset> {
        let _guard = self.begin()?;
        self.fetch_and_store(on_progress).await
    }

    pub async fn clear_cache(&self) {
        self.store.clear().await;
    }

    pub async fn cache_info(&self) -> CacheInfo {
        self.store.info().await
    }

    async fn cached_document(&self) -> Option<VulnerabilityData> {
        let payload = self.store.read().await?;
        match serde_json::from_value(payload) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Cached export has an unexpected shape, ignoring it: {}", e);
                None
            }
        }
    }

    async fn fetch_and_store(
        &self,
        on_progress: &mut (dyn FnMut(f64) + Send),
    ) -> Result<Dataset> {
        info!("Fetching export from {} source", self.source.name());
        let FetchedExport { raw, data } = self.source.fetch(on_progress).await?;

        self.store.write(&raw).await;

        let dataset = Dataset::from_document(&data, DataOrigin::Network);
        info!(
            "Loaded {} records ({} unique CVEs)",
            dataset.records.len(),
            dataset.stats.unique_cves
        );
        Ok(dataset)
    }
}

#[derive(Default)]
pub struct DashboardManagerBuilder {
    source: Option<Arc<dyn DocumentSource>>,
    store: Option<Arc<dyn CacheStore>>,
}

impl DashboardManagerBuilder {
    pub fn source(mut self, source: impl DocumentSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn http(self, url: impl Into<String>) -> Self {
        self.source(HttpSource::new(url))
    }

    pub fn file(self, path: impl Into<PathBuf>) -> Self {
        self.source(FileSource::new(path))
    }

    pub fn store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn file_cache(self, dir: impl Into<PathBuf>) -> Self {
        self.store(Arc::new(FileCacheStore::new(dir)))
    }

    /// Build the manager. Without an explicit store, an in-memory cache is used.
    pub fn build(self) -> Result<DashboardManager> {
        let source = self
            .source
            .ok_or_else(|| DashboardError::config("a document source is required"))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryCacheStore::new()));

        Ok(DashboardManager {
            source,
            store,
            in_flight: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterState, apply_filters};
    use crate::query::critical_vulnerabilities;
    use crate::store::CacheEntry;
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn round_trip_document() -> serde_json::Value {
        json!({
            "groups": {"g": {"repos": {"r": {"images": {"v1": {
                "name": "img",
                "vulnerabilities": [
                    {"cve": "CVE-2021-1111", "severity": "critical", "cvss": 9.8, "status": "Fixed",
                     "packageName": "libfoo", "packageVersion": "1.0"},
                    {"cve": "CVE-2022-2222", "severity": "low", "cvss": 3.1, "status": "Affected",
                     "packageName": "libbar", "packageVersion": "2.0"}
                ]
            }}}}}}
        })
    }

    struct FixtureSource {
        document: serde_json::Value,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl FixtureSource {
        fn new(document: serde_json::Value) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                document,
                calls: calls.clone(),
                fail: false,
            };
            (source, calls)
        }

        fn failing() -> (Self, Arc<AtomicUsize>) {
            let (mut source, calls) = Self::new(json!({}));
            source.fail = true;
            (source, calls)
        }
    }

    #[async_trait]
    impl DocumentSource for FixtureSource {
        async fn fetch(&self, on_progress: &mut (dyn FnMut(f64) + Send)) -> Result<FetchedExport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DashboardError::network(503, "Service Unavailable"));
            }
            let export = FetchedExport::from_value(self.document.clone())?;
            on_progress(100.0);
            Ok(export)
        }

        fn name(&self) -> &str {
            "fixture"
        }
    }

    struct GatedSource {
        gate: Arc<Notify>,
        document: serde_json::Value,
    }

    #[async_trait]
    impl DocumentSource for GatedSource {
        async fn fetch(&self, _on_progress: &mut (dyn FnMut(f64) + Send)) -> Result<FetchedExport> {
            self.gate.notified().await;
            FetchedExport::from_value(self.document.clone())
        }

        fn name(&self) -> &str {
            "gated"
        }
    }

    #[tokio::test]
    async fn test_round_trip_pipeline() {
        let (source, _) = FixtureSource::new(round_trip_document());
        let manager = DashboardManager::builder().source(source).build().unwrap();

        let dataset = manager.load(&mut |_: f64| {}).await.unwrap();
        assert_eq!(dataset.origin, DataOrigin::Network);
        assert_eq!(dataset.records.len(), 2);
        assert!(dataset.records.iter().all(|r| r.group_name == "g"));

        let stats = &dataset.stats;
        assert_eq!(stats.critical_count, 1);
        assert_eq!(stats.low_count, 1);
        assert_eq!(stats.status_fixed, 1);
        assert_eq!(stats.status_affected, 1);
        assert_eq!(stats.unique_cves, 2);

        let critical_only = apply_filters(
            &dataset.records,
            &FilterState::new().with_severities(["critical"]),
        );
        assert_eq!(critical_only.len(), 1);
        assert_eq!(critical_only[0].vuln.cve, "CVE-2021-1111");

        let top = critical_vulnerabilities(&dataset.records, 5);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].vuln.cve, "CVE-2021-1111");
    }

    #[tokio::test]
    async fn test_second_load_is_served_from_cache() {
        let (source, calls) = FixtureSource::new(round_trip_document());
        let manager = DashboardManager::builder().source(source).build().unwrap();

        let first = manager.load(&mut |_: f64| {}).await.unwrap();
        let mut progress = Vec::new();
        let second = manager.load(&mut |p: f64| progress.push(p)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.origin, DataOrigin::Cache);
        assert_eq!(second.records, first.records);
        assert_eq!(second.stats, first.stats);
        assert!(progress.is_empty());
        assert!(manager.cache_info().await.present);
    }

    #[tokio::test]
    async fn test_expired_cache_triggers_fetch() {
        let store = Arc::new(MemoryCacheStore::new());
        let stale = CacheEntry::with_timestamp(
            json!({"groups": {}}),
            Utc::now().timestamp_millis() - 25 * 60 * 60 * 1000,
        );
        store.set_entry(stale).await;

        let (source, calls) = FixtureSource::new(round_trip_document());
        let manager = DashboardManager::builder()
            .source(source)
            .store(store.clone())
            .build()
            .unwrap();

        let dataset = manager.load(&mut |_: f64| {}).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dataset.origin, DataOrigin::Network);
        assert_eq!(dataset.records.len(), 2);

        let entry = store.entry().await.unwrap();
        assert!(entry.is_fresh(crate::store::DEFAULT_CACHE_TTL));
    }

    #[tokio::test]
    async fn test_failed_fetch_does_not_write_cache() {
        let store = Arc::new(MemoryCacheStore::new());
        let (source, calls) = FixtureSource::failing();
        let manager = DashboardManager::builder()
            .source(source)
            .store(store.clone())
            .build()
            .unwrap();

        let err = manager.load(&mut |_: f64| {}).await.unwrap_err();
        assert!(matches!(err, DashboardError::Network { status: 503, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.entry().await.is_none());

        // no automatic retry, and the guard is released
        let err = manager.load(&mut |_: f64| {}).await.unwrap_err();
        assert!(matches!(err, DashboardError::Network { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_holds_document_as_received() {
        let document = json!({
            "generatedAt": "2024-05-01T00:00:00Z",
            "groups": {"g": {
                "owner": "team-a",
                "repos": {"r": {
                    "url": "https://git.example.invalid/r",
                    "images": {"v1": {
                        "digest": "sha256:abc",
                        "vulnerabilities": [{"cve": "CVE-1"}]
                    }}
                }}
            }}
        });
        let store = Arc::new(MemoryCacheStore::new());
        let (source, _) = FixtureSource::new(document.clone());
        let manager = DashboardManager::builder()
            .source(source)
            .store(store.clone())
            .build()
            .unwrap();

        let fetched = manager.load(&mut |_: f64| {}).await.unwrap();
        assert_eq!(store.entry().await.unwrap().data, document);

        let cached = manager.load(&mut |_: f64| {}).await.unwrap();
        assert_eq!(cached.origin, DataOrigin::Cache);
        assert_eq!(cached.records, fetched.records);
        assert_eq!(store.entry().await.unwrap().data, document);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let (source, calls) = FixtureSource::new(round_trip_document());
        let manager = DashboardManager::builder().source(source).build().unwrap();

        manager.load(&mut |_: f64| {}).await.unwrap();
        let refreshed = manager.refresh(&mut |_: f64| {}).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed.origin, DataOrigin::Network);
    }

    #[tokio::test]
    async fn test_unreadable_cached_payload_falls_back_to_source() {
        let store = Arc::new(MemoryCacheStore::new());
        store.write(&json!("not an export")).await;

        let (source, calls) = FixtureSource::new(round_trip_document());
        let manager = DashboardManager::builder()
            .source(source)
            .store(store)
            .build()
            .unwrap();

        let dataset = manager.load(&mut |_: f64| {}).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dataset.origin, DataOrigin::Network);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_fetch() {
        let (source, calls) = FixtureSource::new(round_trip_document());
        let manager = DashboardManager::builder().source(source).build().unwrap();

        manager.load(&mut |_: f64| {}).await.unwrap();
        manager.clear_cache().await;
        assert!(!manager.cache_info().await.present);

        manager.load(&mut |_: f64| {}).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_overlapping_load_is_rejected() {
        let gate = Arc::new(Notify::new());
        let manager = DashboardManager::builder()
            .source(GatedSource {
                gate: gate.clone(),
                document: round_trip_document(),
            })
            .build()
            .unwrap();

        let mut first_progress = |_: f64| {};
        let mut second_progress = |_: f64| {};
        let (first, second) = tokio::join!(manager.load(&mut first_progress), async {
            let result = manager.load(&mut second_progress).await;
            gate.notify_one();
            result
        });

        assert_eq!(first.unwrap().records.len(), 2);
        assert!(matches!(second, Err(DashboardError::IngestionInProgress)));

        let third = manager.load(&mut |_: f64| {}).await.unwrap();
        assert_eq!(third.origin, DataOrigin::Cache);
    }

    #[test]
    fn test_builder_requires_source() {
        let err = DashboardManager::builder().build().err().unwrap();
        assert!(matches!(err, DashboardError::Config(_)));
    }
}
