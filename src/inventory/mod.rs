//! Inventory records and the primary store
//!
//! The CRUD side of the system: the equipment model, a transactional
//! in-memory store that acts as the system of record, and the service
//! that mutates it and publishes committed changes for indexing.

mod error;
mod model;
mod service;
mod store;

pub use error::{InventoryError, InventoryResult};
pub use model::{
    normalize_asset_number, Equipment, EquipmentId, EquipmentInput, EquipmentStatus,
    EquipmentType,
};
pub use service::EquipmentService;
pub use store::{CommitHook, MemoryStore, PrimaryStore, Transaction};
