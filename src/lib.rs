//! invsearch: eventually consistent search index for an IT equipment inventory
//!
//! Committed inventory mutations are published as change events, dispatched
//! to a worker pool and applied to a Tantivy index by re-reading the primary
//! store, so the index converges on the store without ever blocking or
//! failing the write path.
//!
//! - [`inventory`]: equipment model, transactional primary store, CRUD service
//! - [`sync`]: change publisher, dispatch runtime, index writers
//! - [`search`]: index documents, Tantivy storage, fuzzy and filtered queries
//! - [`http`]: read-only query API
//! - [`pipeline`]: wiring and lifecycle

pub mod config;
pub mod http;
pub mod inventory;
pub mod pipeline;
pub mod search;
pub mod sync;

pub use config::Config;
pub use pipeline::Pipeline;
