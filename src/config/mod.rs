//! Configuration for invsearch

mod dispatch;
mod http;
mod logging;
mod search;

pub use dispatch::DispatchConfig;
pub use http::HttpConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use search::SearchConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the search synchronization service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Secondary index configuration
    #[serde(default)]
    pub search: SearchConfig,
    /// Change event dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// HTTP query API configuration
    #[serde(default)]
    pub http: HttpConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Dispatch validation
        if self.dispatch.min_workers == 0 {
            errors.push("min_workers must be positive".to_string());
        }
        if self.dispatch.max_workers < self.dispatch.min_workers {
            errors.push(format!(
                "max_workers ({}) must be >= min_workers ({})",
                self.dispatch.max_workers, self.dispatch.min_workers
            ));
        }
        if self.dispatch.queue_capacity == 0 {
            errors.push("queue_capacity must be positive".to_string());
        }
        if self.dispatch.apply_timeout_ms == 0 {
            errors.push("apply_timeout_ms must be positive".to_string());
        }

        // Search validation
        if self.search.max_page_size == 0 {
            errors.push("max_page_size must be positive".to_string());
        }
        // Tantivy refuses writer budgets below 15MB
        if self.search.writer_heap_bytes < 15_000_000 {
            errors.push("writer_heap_bytes must be at least 15000000".to_string());
        }

        // HTTP config validation
        if self.http.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "HTTP listen_addr '{}' is not a valid socket address",
                self.http.listen_addr
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
