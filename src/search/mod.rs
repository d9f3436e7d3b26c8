//! Secondary search index
//!
//! - [`EquipmentDoc`]: the denormalized projection that gets indexed
//! - [`EquipmentIndex`]: Tantivy storage keyed by equipment id
//! - [`QueryService`]: fuzzy text search and filtered search

mod document;
mod error;
mod fuzzy;
mod highlight;
mod index;
mod query;

pub use document::{EquipmentDoc, DESCRIPTION_SEPARATOR};
pub use error::{SearchError, SearchResult};
pub use highlight::{highlight, POST_TAG, PRE_TAG};
pub use index::{EquipmentIndex, ScoredDoc, SortOrder};
pub use query::{Pagination, QueryService, SearchFilters, SearchHit, MAX_RESULT_WINDOW};
