//! Search index configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Secondary index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Enable indexing. Selects the real or the disabled index writer at startup.
    #[serde(default)]
    pub enabled: bool,
    /// On-disk index directory (None = in-memory index)
    #[serde(default)]
    pub index_path: Option<PathBuf>,
    /// Tantivy writer heap budget in bytes
    #[serde(default = "default_writer_heap_bytes")]
    pub writer_heap_bytes: usize,
    /// Upper bound applied to the `size` query parameter
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
}

fn default_writer_heap_bytes() -> usize {
    50_000_000
}

fn default_max_page_size() -> usize {
    100
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            index_path: None,
            writer_heap_bytes: default_writer_heap_bytes(),
            max_page_size: default_max_page_size(),
        }
    }
}
