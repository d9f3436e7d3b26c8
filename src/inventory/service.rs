//! Equipment CRUD service
//!
//! Performs mutations inside a store transaction and, when indexing is
//! enabled, registers a post-commit hook that publishes the change. A
//! mutation that fails or rolls back never publishes.

use std::sync::Arc;

use tracing::debug;

use crate::sync::{ChangePublisher, Operation};

use super::error::{InventoryError, InventoryResult};
use super::model::{normalize_asset_number, Equipment, EquipmentId, EquipmentInput};
use super::store::{MemoryStore, Transaction};

/// CRUD operations over equipment records
pub struct EquipmentService {
    store: Arc<MemoryStore>,
    /// `None` when indexing is disabled
    publisher: Option<ChangePublisher>,
}

impl EquipmentService {
    pub fn new(store: Arc<MemoryStore>, publisher: Option<ChangePublisher>) -> Self {
        Self { store, publisher }
    }

    /// Whether committed mutations are published for indexing
    pub fn publishes_changes(&self) -> bool {
        self.publisher.is_some()
    }

    pub fn get(&self, id: EquipmentId) -> InventoryResult<Equipment> {
        self.store.get(id).ok_or(InventoryError::NotFound(id))
    }

    pub fn create(&self, input: EquipmentInput) -> InventoryResult<Equipment> {
        let input = prepare(input)?;

        let mut tx = self.store.begin();
        if let Some(asset) = input.asset_number.as_deref() {
            if tx.find_by_asset_number(asset).is_some() {
                return Err(InventoryError::DuplicateAssetNumber(asset.to_string()));
            }
        }

        let record = tx.insert(input);
        self.publish_on_commit(&mut tx, record.id, Operation::Upsert);
        tx.commit()?;

        debug!("Created equipment id={}", record.id);
        Ok(record)
    }

    /// Full replacement of every mutable field
    pub fn update(&self, id: EquipmentId, input: EquipmentInput) -> InventoryResult<Equipment> {
        let input = prepare(input)?;

        let mut tx = self.store.begin();
        if tx.get(id).is_none() {
            return Err(InventoryError::NotFound(id));
        }
        if let Some(asset) = input.asset_number.as_deref() {
            if let Some(existing) = tx.find_by_asset_number(asset) {
                if existing.id != id {
                    return Err(InventoryError::DuplicateAssetNumber(asset.to_string()));
                }
            }
        }

        let record = input.into_record(id);
        tx.put(record.clone());
        self.publish_on_commit(&mut tx, id, Operation::Upsert);
        tx.commit()?;

        debug!("Updated equipment id={}", id);
        Ok(record)
    }

    pub fn delete(&self, id: EquipmentId) -> InventoryResult<()> {
        let mut tx = self.store.begin();
        if tx.get(id).is_none() {
            return Err(InventoryError::NotFound(id));
        }

        tx.remove(id);
        self.publish_on_commit(&mut tx, id, Operation::Delete);
        tx.commit()?;

        debug!("Deleted equipment id={}", id);
        Ok(())
    }

    fn publish_on_commit(&self, tx: &mut Transaction<'_>, id: EquipmentId, operation: Operation) {
        if let Some(publisher) = &self.publisher {
            tx.on_commit(publisher.commit_hook(id, operation));
        }
    }
}

/// Validate required fields and normalize the asset number
fn prepare(mut input: EquipmentInput) -> InventoryResult<EquipmentInput> {
    let required = [
        ("brand", &input.brand),
        ("model", &input.model),
        ("location", &input.location),
        ("responsible", &input.responsible),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(InventoryError::Validation(format!("{} is required", name)));
        }
    }

    if let Some(value) = input.acquisition_value {
        if value.is_nan() || value <= 0.0 {
            return Err(InventoryError::Validation(
                "acquisitionValue must be greater than zero".to_string(),
            ));
        }
    }

    input.asset_number = input
        .asset_number
        .as_deref()
        .map(normalize_asset_number)
        .filter(|s| !s.is_empty());

    Ok(input)
}
