//! Index synchronization pipeline
//!
//! Committed mutations flow publisher → dispatch runtime → index writer.
//! Every event is a hint to re-read the primary store, so the index
//! converges on the store's state regardless of delivery order.

mod dispatch;
mod event;
mod publisher;
mod writer;

pub use dispatch::DispatchRuntime;
pub use event::{ChangeEvent, Operation};
pub use publisher::ChangePublisher;
pub use writer::{DisabledIndexWriter, DocumentSink, IndexWriter, ReindexReport, SearchIndexWriter};
