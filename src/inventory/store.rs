//! Primary store
//!
//! The system of record for equipment. The index writer only ever sees the
//! [`PrimaryStore`] trait; [`MemoryStore`] is an in-process implementation
//! with transactions and post-commit hooks.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, trace};

use super::model::{Equipment, EquipmentId, EquipmentInput};

/// Read access to the system of record
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Read the current committed state of a record
    async fn read_by_id(&self, id: EquipmentId) -> Result<Option<Equipment>>;

    /// Ids of every committed record, ascending
    async fn list_ids(&self) -> Result<Vec<EquipmentId>>;
}

/// Callback run once a transaction has committed
pub type CommitHook = Box<dyn FnOnce() + Send + 'static>;

/// In-memory transactional store
pub struct MemoryStore {
    records: RwLock<BTreeMap<EquipmentId, Equipment>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a transaction. Nothing it stages is visible to other readers
    /// until [`Transaction::commit`].
    pub fn begin(&self) -> Transaction<'_> {
        Transaction {
            store: self,
            staged: BTreeMap::new(),
            hooks: Vec::new(),
        }
    }

    /// Committed record by id
    pub fn get(&self, id: EquipmentId) -> Option<Equipment> {
        self.records.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn allocate_id(&self) -> EquipmentId {
        // Identity values are not reused after a rollback
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrimaryStore for MemoryStore {
    async fn read_by_id(&self, id: EquipmentId) -> Result<Option<Equipment>> {
        Ok(self.get(id))
    }

    async fn list_ids(&self) -> Result<Vec<EquipmentId>> {
        Ok(self.records.read().keys().copied().collect())
    }
}

/// A unit of work against [`MemoryStore`].
///
/// Dropping a transaction without committing rolls it back: staged writes
/// are discarded and commit hooks never run.
pub struct Transaction<'a> {
    store: &'a MemoryStore,
    /// `None` marks a staged removal
    staged: BTreeMap<EquipmentId, Option<Equipment>>,
    hooks: Vec<CommitHook>,
}

impl Transaction<'_> {
    /// Read a record as seen from inside this transaction
    pub fn get(&self, id: EquipmentId) -> Option<Equipment> {
        match self.staged.get(&id) {
            Some(staged) => staged.clone(),
            None => self.store.get(id),
        }
    }

    /// Find a record by asset number as seen from inside this transaction
    pub fn find_by_asset_number(&self, asset_number: &str) -> Option<Equipment> {
        let staged_match = self
            .staged
            .values()
            .flatten()
            .find(|e| e.asset_number.as_deref() == Some(asset_number));
        if let Some(found) = staged_match {
            return Some(found.clone());
        }

        self.store
            .records
            .read()
            .values()
            .filter(|e| !self.staged.contains_key(&e.id))
            .find(|e| e.asset_number.as_deref() == Some(asset_number))
            .cloned()
    }

    /// Stage a new record and return it with its assigned id
    pub fn insert(&mut self, input: EquipmentInput) -> Equipment {
        let record = input.into_record(self.store.allocate_id());
        self.staged.insert(record.id, Some(record.clone()));
        record
    }

    /// Stage a full replacement of an existing record
    pub fn put(&mut self, record: Equipment) {
        self.staged.insert(record.id, Some(record));
    }

    /// Stage removal of a record
    pub fn remove(&mut self, id: EquipmentId) {
        self.staged.insert(id, None);
    }

    /// Register a callback to run after this transaction commits
    pub fn on_commit(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Apply staged writes atomically, then run commit hooks in
    /// registration order.
    pub fn commit(mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let hooks = std::mem::take(&mut self.hooks);

        {
            let mut records = self.store.records.write();
            for (id, write) in staged {
                match write {
                    Some(record) => {
                        records.insert(id, record);
                    }
                    None => {
                        records.remove(&id);
                    }
                }
            }
        }

        trace!("Transaction committed, running {} hooks", hooks.len());
        for hook in hooks {
            hook();
        }
        Ok(())
    }

    /// Discard staged writes and hooks
    pub fn rollback(self) {}
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.staged.is_empty() || !self.hooks.is_empty() {
            debug!(
                "Transaction rolled back ({} staged writes, {} hooks discarded)",
                self.staged.len(),
                self.hooks.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::model::{EquipmentStatus, EquipmentType};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn input(asset: &str) -> EquipmentInput {
        EquipmentInput {
            equipment_type: EquipmentType::Notebook,
            brand: "Dell".to_string(),
            model: "Latitude 5420".to_string(),
            asset_number: Some(asset.to_string()),
            status: EquipmentStatus::EmUso,
            location: "Matriz".to_string(),
            responsible: "Ana".to_string(),
            acquisition_date: None,
            acquisition_value: None,
        }
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = MemoryStore::new();
        let mut tx = store.begin();
        let record = tx.insert(input("INV-00001"));
        assert!(store.get(record.id).is_none(), "uncommitted insert leaked");
        tx.commit().unwrap();

        let read = store.read_by_id(record.id).await.unwrap();
        assert_eq!(read, Some(record));
        assert_eq!(store.list_ids().await.unwrap(), vec![1]);
    }

    #[test]
    fn hooks_run_only_after_commit() {
        let store = MemoryStore::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let mut tx = store.begin();
        tx.insert(input("INV-00001"));
        let counter = fired.clone();
        tx.on_commit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tx.commit().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rollback_discards_writes_and_hooks() {
        let store = MemoryStore::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let mut tx = store.begin();
        let record = tx.insert(input("INV-00001"));
        let counter = fired.clone();
        tx.on_commit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tx.rollback();

        assert!(store.get(record.id).is_none());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Dropping without commit behaves the same
        let mut tx = store.begin();
        let counter = fired.clone();
        tx.on_commit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        drop(tx);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn transaction_sees_its_own_staged_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin();
        let record = tx.insert(input("INV-00001"));
        tx.commit().unwrap();

        let mut tx = store.begin();
        tx.remove(record.id);
        assert!(tx.get(record.id).is_none());
        assert!(tx.find_by_asset_number("INV-00001").is_none());
        assert!(store.get(record.id).is_some());

        let staged = tx.insert(input("INV-00002"));
        assert_eq!(tx.find_by_asset_number("INV-00002"), Some(staged));
        tx.commit().unwrap();
        assert!(store.get(record.id).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn ids_are_not_reused_after_rollback() {
        let store = MemoryStore::new();
        let tx_id = {
            let mut tx = store.begin();
            tx.insert(input("INV-00001")).id
        };
        let mut tx = store.begin();
        let next = tx.insert(input("INV-00001"));
        assert!(next.id > tx_id);
    }
}
