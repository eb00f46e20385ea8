//! Data pipeline behind the vulnerability dashboard.
//!
//! Downloads the nested scan export (group → repository → image → findings),
//! keeps the last download in a local expiring cache, flattens it into
//! [`ProcessedVulnerability`] records and answers the dashboard's filter,
//! search, sort and statistics queries over them.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod logging;
pub mod manager;
pub mod models;
pub mod normalizer;
pub mod query;
pub mod sources;
pub mod store;

pub use aggregator::{ComparisonSummary, DashboardStats, MonthlyCount, StatsAggregator};
pub use config::Config;
pub use error::{DashboardError, Result};
pub use filter::{AnalysisMode, FilterState, apply_filters};
pub use manager::{DashboardManager, DataOrigin, Dataset};
pub use models::{ProcessedVulnerability, RawVulnerability, VulnerabilityData};
pub use normalizer::normalize;
pub use store::{CacheStore, FileCacheStore, MemoryCacheStore};
