//! HTTP API Request/Response Types
//!
//! JSON-serializable types for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::search::SearchHit;

fn default_page() -> i64 {
    0
}

fn default_size() -> i64 {
    10
}

/// Query string of `GET /search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Free text; blank or missing is rejected
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
}

/// Query string of `POST /search/advanced`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
}

/// Search response
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// Matching documents for the requested page
    pub results: Vec<SearchHit>,
    /// Page actually served, after clamping
    pub page: usize,
    /// Page size actually served, after clamping
    pub size: usize,
    /// Query execution time in milliseconds
    pub query_time_ms: u64,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Whether the service is healthy
    pub healthy: bool,
    /// Service version
    pub version: String,
}

/// Synchronization status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Whether committed changes are being indexed
    pub indexing_enabled: bool,
    /// Documents currently in the index
    pub documents_indexed: u64,
    /// Change events queued or being applied
    pub pending_events: usize,
}

/// Bulk reindex result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexResponse {
    pub applied: usize,
    pub failed: usize,
    pub purged: usize,
    pub duration_ms: u64,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn indexing_disabled() -> Self {
        Self::new("INDEXING_DISABLED", "Search indexing is disabled")
    }
}
