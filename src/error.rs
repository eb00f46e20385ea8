//! Error types for the vulnera-dashboard crate.
//!
//! This module provides a single error type [`DashboardError`] covering every
//! failure mode of the ingestion pipeline, the cache layer and the export surfaces.

use std::io;

/// The main error type for all operations in this crate.
#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    /// The transport answered with a non-success status.
    #[error("Network error: HTTP {status}: {message}")]
    Network {
        /// HTTP status code returned by the server.
        status: u16,
        /// Reason phrase or other detail about the failure.
        message: String,
    },

    /// HTTP request failed before or while the body was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The received bytes were not valid UTF-8 or not a valid scan export.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A cache storage operation failed.
    ///
    /// [`CacheStore`](crate::store::CacheStore) implementations log and swallow
    /// this error; it only escapes from their inherent diagnostic methods.
    #[error("Cache error: {0}")]
    Cache(String),

    /// JSON serialization failed (exports, cache entries).
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (file sources, exports).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Compression or decompression of a cache entry failed.
    #[error("Compression error: {0}")]
    Compression(String),

    /// Configuration error (missing or invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A load or refresh was requested while another one is still running.
    #[error("An ingestion is already in progress")]
    IngestionInProgress,
}

/// A specialized Result type for dashboard operations.
pub type Result<T> = std::result::Result<T, DashboardError>;

impl DashboardError {
    /// Create a new network error from a status code and reason.
    pub fn network(status: u16, message: impl Into<String>) -> Self {
        Self::Network {
            status,
            message: message.into(),
        }
    }

    /// Create a new decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Create a new cache error.
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Create a new compression error.
    pub fn compression(message: impl Into<String>) -> Self {
        Self::Compression(message.into())
    }

    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this error is worth retrying.
    ///
    /// The pipeline itself never retries; this is for callers building their own policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::IngestionInProgress => true,
            Self::Network { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
