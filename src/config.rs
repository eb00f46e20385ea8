use crate::error::{DashboardError, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Public demo export used when no data source is configured.
pub const DEFAULT_DATA_SOURCE_URL: &str =
    "https://media.githubusercontent.com/media/chanduusc/Ui-Demo-Data/main/ui_demo.json";

/// Hours a cached export stays valid.
pub const DEFAULT_CACHE_TTL_HOURS: u64 = 24;

pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_PREFIX: &str = "VULNERA_DASHBOARD__";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data_source_url: String,
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub log_to_file: bool,
    pub log_dir: PathBuf,
    /// Filter directive used when `RUST_LOG` is not set, e.g. `debug` or
    /// `vulnera_dashboard=trace`.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_source_url: DEFAULT_DATA_SOURCE_URL.to_string(),
            cache_dir: env::temp_dir().join("vulnera-dashboard"),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_HOURS * 3600),
            log_to_file: false,
            log_dir: PathBuf::from("logs"),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let defaults = Self::default();

        let data_source_url = var("DATA_SOURCE_URL").unwrap_or(defaults.data_source_url);

        let cache_dir = var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let cache_ttl = match var("CACHE_TTL_HOURS") {
            Some(raw) => {
                let hours: u64 = raw.trim().parse().map_err(|_| {
                    DashboardError::config(format!(
                        "CACHE_TTL_HOURS must be an integer, got '{}'",
                        raw
                    ))
                })?;
                let secs = hours.checked_mul(3600).ok_or_else(|| {
                    DashboardError::config(format!("CACHE_TTL_HOURS is too large: {}", hours))
                })?;
                Duration::from_secs(secs)
            }
            None => defaults.cache_ttl,
        };

        let log_to_file = match var("LOG_TO_FILE") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                DashboardError::config(format!("LOG_TO_FILE must be a boolean, got '{}'", raw))
            })?,
            None => defaults.log_to_file,
        };

        let log_dir = var("LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir);

        let log_level = match var("LOG_LEVEL") {
            Some(raw) => {
                EnvFilter::try_new(&raw).map_err(|e| {
                    DashboardError::config(format!("LOG_LEVEL '{}' is not a valid filter: {}", raw, e))
                })?;
                raw
            }
            None => defaults.log_level,
        };

        Ok(Self {
            data_source_url,
            cache_dir,
            cache_ttl,
            log_to_file,
            log_dir,
            log_level,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
