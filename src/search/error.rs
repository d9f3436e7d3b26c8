//! Query path errors

use thiserror::Error;

/// Errors returned by the query service
#[derive(Debug, Error)]
pub enum SearchError {
    /// The request itself is malformed; reported to the caller as a client error
    #[error("Invalid search request: {0}")]
    Validation(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SearchError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result type for query operations
pub type SearchResult<T> = Result<T, SearchError>;
