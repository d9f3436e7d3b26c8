//! Errors raised by the inventory store and CRUD service

use thiserror::Error;

use super::model::EquipmentId;

/// Errors surfaced to CRUD callers
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Equipment with id {0} not found")]
    NotFound(EquipmentId),

    #[error("Invalid equipment: {0}")]
    Validation(String),

    #[error("Asset number already exists: {0}")]
    DuplicateAssetNumber(String),

    #[error("Store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Result type for inventory operations
pub type InventoryResult<T> = Result<T, InventoryError>;
