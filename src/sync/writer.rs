//! Index writers
//!
//! Apply change events to the secondary index. The real writer re-reads the
//! primary store for every event and fully replaces (or removes) the
//! document keyed by the record id, so applying events in any order, any
//! number of times, converges on the store's current state. Failures are
//! logged and swallowed here and never reach the CRUD caller.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::inventory::{EquipmentId, PrimaryStore};
use crate::search::{EquipmentDoc, EquipmentIndex};

use super::event::{ChangeEvent, Operation};

/// Outcome of a bulk reindex
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub applied: usize,
    pub failed: usize,
    /// Documents removed because their record no longer exists
    pub purged: usize,
}

/// Applies change events to the secondary index
#[async_trait]
pub trait IndexWriter: Send + Sync {
    /// Bring the document for `record_id` in line with the primary store
    async fn upsert(&self, record_id: EquipmentId);

    /// Remove the document for `record_id`
    async fn delete(&self, record_id: EquipmentId);

    /// Upsert every record currently in the primary store and drop
    /// documents whose record is gone
    async fn reindex_all(&self) -> Result<ReindexReport>;

    /// Whether this writer touches the index at all
    fn is_enabled(&self) -> bool;

    async fn apply(&self, event: ChangeEvent) {
        match event.operation {
            Operation::Upsert => self.upsert(event.record_id).await,
            Operation::Delete => self.delete(event.record_id).await,
        }
    }
}

/// Keyed document storage the real writer writes into
pub trait DocumentSink: Send + Sync {
    /// Store `doc`, replacing any document with the same id
    fn put(&self, doc: &EquipmentDoc) -> Result<()>;

    /// Remove the document with `id`; a missing id is not an error
    fn remove(&self, id: EquipmentId) -> Result<()>;

    /// Ids of every stored document
    fn ids(&self) -> Result<Vec<EquipmentId>>;
}

impl DocumentSink for EquipmentIndex {
    fn put(&self, doc: &EquipmentDoc) -> Result<()> {
        EquipmentIndex::put(self, doc)
    }

    fn remove(&self, id: EquipmentId) -> Result<()> {
        EquipmentIndex::remove(self, id)
    }

    fn ids(&self) -> Result<Vec<EquipmentId>> {
        EquipmentIndex::ids(self)
    }
}

/// Writer backed by the search index
pub struct SearchIndexWriter {
    store: Arc<dyn PrimaryStore>,
    sink: Arc<dyn DocumentSink>,
    apply_timeout: Duration,
    /// Serializes read-then-write per record so a slower apply can never
    /// overwrite a newer read with an older one
    record_locks: DashMap<EquipmentId, Arc<Mutex<()>>>,
}

impl SearchIndexWriter {
    pub fn new(
        store: Arc<dyn PrimaryStore>,
        sink: Arc<dyn DocumentSink>,
        apply_timeout: Duration,
    ) -> Self {
        Self {
            store,
            sink,
            apply_timeout,
            record_locks: DashMap::new(),
        }
    }

    async fn apply_logged(&self, event: ChangeEvent) {
        match self.try_apply(event).await {
            Ok(()) => debug!("Applied {} to search index", event),
            Err(e) => warn!("Failed to apply {} to search index: {:#}", event, e),
        }
    }

    /// Apply one event under its record lock, bounded by the apply timeout
    async fn try_apply(&self, event: ChangeEvent) -> Result<()> {
        let lock = self.record_lock(event.record_id);
        let guard = lock.clone().lock_owned().await;

        let result =
            match tokio::time::timeout(self.apply_timeout, self.apply_locked(event, guard)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("timed out after {:?}", self.apply_timeout)),
            };

        drop(lock);
        self.release_lock(event.record_id);
        result
    }

    async fn apply_locked(&self, event: ChangeEvent, guard: OwnedMutexGuard<()>) -> Result<()> {
        let id = event.record_id;

        let doc = match event.operation {
            Operation::Upsert => {
                let record = self
                    .store
                    .read_by_id(id)
                    .await
                    .context("Failed to read record from primary store")?;
                if record.is_none() {
                    // The record is gone; a lingering document would be a ghost
                    debug!("Record id={} no longer exists, removing from index", id);
                }
                record.map(|r| EquipmentDoc::from(&r))
            }
            Operation::Delete => None,
        };

        let sink = self.sink.clone();
        tokio::task::spawn_blocking(move || {
            // Held until the write lands, even if the caller timed out
            let _guard = guard;
            match doc {
                Some(doc) => sink.put(&doc),
                None => sink.remove(id),
            }
        })
        .await
        .context("Index write task failed")?
    }

    fn record_lock(&self, id: EquipmentId) -> Arc<Mutex<()>> {
        self.record_locks.entry(id).or_default().clone()
    }

    fn release_lock(&self, id: EquipmentId) {
        self.record_locks
            .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[async_trait]
impl IndexWriter for SearchIndexWriter {
    async fn upsert(&self, record_id: EquipmentId) {
        self.apply_logged(ChangeEvent::upsert(record_id)).await;
    }

    async fn delete(&self, record_id: EquipmentId) {
        self.apply_logged(ChangeEvent::delete(record_id)).await;
    }

    async fn reindex_all(&self) -> Result<ReindexReport> {
        let ids = self
            .store
            .list_ids()
            .await
            .context("Failed to list records for reindex")?;
        let sink = self.sink.clone();
        let indexed = tokio::task::spawn_blocking(move || sink.ids())
            .await
            .context("Index scan task failed")?
            .context("Failed to list indexed documents for reindex")?;

        let live: HashSet<EquipmentId> = ids.iter().copied().collect();
        let orphans: Vec<EquipmentId> = indexed
            .into_iter()
            .filter(|id| !live.contains(id))
            .collect();
        info!(
            "Reindexing {} records, {} orphaned documents",
            ids.len(),
            orphans.len()
        );

        let mut report = ReindexReport::default();
        for id in ids {
            match self.try_apply(ChangeEvent::upsert(id)).await {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!("Reindex of id={} failed: {:#}", id, e);
                    report.failed += 1;
                }
            }
        }

        // An upsert re-reads the store under the record lock, so a record
        // created since the listing is indexed rather than dropped.
        for id in orphans {
            match self.try_apply(ChangeEvent::upsert(id)).await {
                Ok(()) => report.purged += 1,
                Err(e) => {
                    warn!("Purge of orphaned id={} failed: {:#}", id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Reindex finished: {} applied, {} purged, {} failed",
            report.applied, report.purged, report.failed
        );
        Ok(report)
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Writer used when indexing is turned off
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledIndexWriter;

#[async_trait]
impl IndexWriter for DisabledIndexWriter {
    async fn upsert(&self, _record_id: EquipmentId) {}

    async fn delete(&self, _record_id: EquipmentId) {}

    async fn reindex_all(&self) -> Result<ReindexReport> {
        Ok(ReindexReport::default())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
