//! End-to-end tests for the index synchronization pipeline
//!
//! These drive mutations through the CRUD service and check what the query
//! side eventually sees.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use invsearch::config::{Config, DispatchConfig};
use invsearch::inventory::{
    EquipmentId, EquipmentInput, EquipmentService, EquipmentStatus, EquipmentType, InventoryError,
    MemoryStore,
};
use invsearch::search::{EquipmentDoc, EquipmentIndex, QueryService, SearchFilters};
use invsearch::sync::{
    ChangePublisher, DispatchRuntime, DocumentSink, IndexWriter, Operation, SearchIndexWriter,
};
use invsearch::Pipeline;
use tokio::sync::broadcast;

const HEAP: usize = 20_000_000;

fn config(enabled: bool) -> Config {
    let mut config = Config::default();
    config.search.enabled = enabled;
    config.search.writer_heap_bytes = HEAP;
    config
}

fn input(asset: &str, brand: &str, model: &str, status: EquipmentStatus, value: f64) -> EquipmentInput {
    EquipmentInput {
        equipment_type: EquipmentType::Notebook,
        brand: brand.to_string(),
        model: model.to_string(),
        asset_number: Some(asset.to_string()),
        status,
        location: "Matriz".to_string(),
        responsible: "Carla Mendes".to_string(),
        acquisition_date: NaiveDate::from_ymd_opt(2023, 3, 15),
        acquisition_value: Some(value),
    }
}

fn dell(asset: &str) -> EquipmentInput {
    input(asset, "Dell", "Latitude 5420", EquipmentStatus::EmUso, 4500.0)
}

/// Every id in the store has a matching document and nothing else is indexed
fn assert_converged(pipeline: &Pipeline, ids: &[EquipmentId]) {
    for &id in ids {
        let expected = pipeline.store().get(id).map(|r| EquipmentDoc::from(&r));
        let actual = pipeline.query().get(id).unwrap();
        assert_eq!(actual, expected, "document for id={} diverged", id);
    }
    assert_eq!(pipeline.query().count(), pipeline.store().len() as u64);
}

#[tokio::test]
async fn start_rejects_invalid_config() {
    let mut zero_queue = config(true);
    zero_queue.dispatch.queue_capacity = 0;
    let err = Pipeline::start(zero_queue).err().unwrap();
    assert!(err.to_string().contains("queue_capacity"));

    let mut inverted_pool = config(true);
    inverted_pool.dispatch.min_workers = 4;
    inverted_pool.dispatch.max_workers = 2;
    assert!(Pipeline::start(inverted_pool).is_err());

    assert!(Pipeline::start(config(true)).is_ok());
}

#[tokio::test]
async fn inserted_record_becomes_searchable() {
    let pipeline = Pipeline::start(config(true)).unwrap();

    let record = pipeline.service().create(dell("INV-00001")).unwrap();
    pipeline.wait_idle().await;

    let query = pipeline.query();
    let hits = query.search_by_text("Dell", query.paginate(0, 10)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, record.id);
    assert_eq!(hits[0].document.asset_number.as_deref(), Some("INV-00001"));
}

#[tokio::test]
async fn update_then_delete_leaves_no_document() {
    let pipeline = Pipeline::start(config(true)).unwrap();
    let service = pipeline.service();

    let record = service.create(dell("INV-00001")).unwrap();
    pipeline.wait_idle().await;
    assert!(pipeline.query().get(record.id).unwrap().is_some());

    let mut changed = dell("INV-00001");
    changed.brand = "HP".to_string();
    service.update(record.id, changed).unwrap();
    service.delete(record.id).unwrap();
    pipeline.wait_idle().await;

    assert!(pipeline.query().get(record.id).unwrap().is_none());
}

#[tokio::test]
async fn reordered_update_and_delete_events_converge() {
    let store = Arc::new(MemoryStore::new());
    let mut tx = store.begin();
    let record = tx.insert(dell("INV-00001"));
    tx.commit().unwrap();

    let orders = [
        [Operation::Upsert, Operation::Delete],
        [Operation::Delete, Operation::Upsert],
    ];

    // Both events were published; by apply time the record is gone
    let mut tx = store.begin();
    tx.remove(record.id);
    tx.commit().unwrap();

    for order in orders {
        let index = Arc::new(EquipmentIndex::new_in_memory(HEAP).unwrap());
        index.put(&EquipmentDoc::from(&record)).unwrap();
        let writer = SearchIndexWriter::new(store.clone(), index.clone(), Duration::from_secs(5));

        for operation in order {
            match operation {
                Operation::Upsert => writer.upsert(record.id).await,
                Operation::Delete => writer.delete(record.id).await,
            }
        }
        assert!(index.get(record.id).unwrap().is_none(), "order {:?}", order);
    }
}

#[tokio::test]
async fn text_search_is_case_insensitive_and_fuzzy() {
    let pipeline = Pipeline::start(config(true)).unwrap();
    let record = pipeline.service().create(dell("INV-00001")).unwrap();
    pipeline.wait_idle().await;

    let query = pipeline.query();
    for text in ["DELL", "dell", "Dlel", "latitud"] {
        let hits = query.search_by_text(text, query.paginate(0, 10)).unwrap();
        assert_eq!(hits.len(), 1, "query {:?}", text);
        assert_eq!(hits[0].document.id, record.id);
    }
}

#[tokio::test]
async fn advanced_search_applies_only_filters() {
    let pipeline = Pipeline::start(config(true)).unwrap();
    let service = pipeline.service();

    let in_range = service
        .create(input("INV-00001", "Dell", "Latitude 5420", EquipmentStatus::EmUso, 4500.0))
        .unwrap();
    let too_expensive = service
        .create(input("INV-00002", "Dell", "Precision 7680", EquipmentStatus::EmUso, 12000.0))
        .unwrap();
    let wrong_status = service
        .create(input("INV-00003", "HP", "ProBook 440", EquipmentStatus::EmEstoque, 3900.0))
        .unwrap();
    let cheap = service
        .create(input("INV-00004", "Lenovo", "IdeaPad 3", EquipmentStatus::EmUso, 1000.0))
        .unwrap();
    pipeline.wait_idle().await;

    let filters = SearchFilters {
        status: Some("EM_USO".to_string()),
        min_value: Some(1000.0),
        max_value: Some(5000.0),
        ..SearchFilters::default()
    };
    let query = pipeline.query();
    let hits = query.search_advanced(&filters, query.paginate(0, 10)).unwrap();

    let ids: Vec<_> = hits.iter().map(|h| h.document.id).collect();
    assert_eq!(ids, vec![in_range.id, cheap.id]);
    assert!(!ids.contains(&too_expensive.id));
    assert!(!ids.contains(&wrong_status.id));
    assert!(hits.iter().all(|h| h.highlight.is_none()));
}

#[tokio::test]
async fn disabled_indexing_still_persists_writes() {
    let pipeline = Pipeline::start(config(false)).unwrap();
    assert!(!pipeline.indexing_enabled());
    assert!(!pipeline.service().publishes_changes());

    let record = pipeline.service().create(dell("INV-00001")).unwrap();
    pipeline.wait_idle().await;

    assert_eq!(pipeline.store().get(record.id), Some(record.clone()));
    assert_eq!(pipeline.pending(), 0);
    assert_eq!(pipeline.query().count(), 0);
    assert!(pipeline.query().get(record.id).unwrap().is_none());

    let report = pipeline.writer().reindex_all().await.unwrap();
    assert_eq!(report.applied, 0);
}

#[tokio::test]
async fn rejected_mutation_publishes_nothing() {
    let pipeline = Pipeline::start(config(true)).unwrap();
    let service = pipeline.service();

    service.create(dell("INV-00001")).unwrap();
    pipeline.wait_idle().await;

    let duplicate = service.create(dell("inv-1"));
    assert!(matches!(duplicate, Err(InventoryError::DuplicateAssetNumber(_))));
    assert_eq!(pipeline.pending(), 0);

    pipeline.wait_idle().await;
    assert_eq!(pipeline.query().count(), 1);
}

#[tokio::test]
async fn rolled_back_transaction_never_reaches_index() {
    let store = Arc::new(MemoryStore::new());
    let index = Arc::new(EquipmentIndex::new_in_memory(HEAP).unwrap());
    let writer = Arc::new(SearchIndexWriter::new(
        store.clone(),
        index.clone(),
        Duration::from_secs(5),
    ));
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let publisher = ChangePublisher::new(DispatchRuntime::start(
        writer,
        &DispatchConfig::default(),
        shutdown_rx,
    ));

    let mut tx = store.begin();
    let record = tx.insert(dell("INV-00001"));
    tx.on_commit(publisher.commit_hook(record.id, Operation::Upsert));
    tx.rollback();

    publisher.wait_idle().await;
    assert_eq!(publisher.pending(), 0);
    assert!(store.is_empty());
    assert_eq!(index.count(), 0);
}

/// Sink standing in for an unreachable index
struct UnreachableIndex {
    attempts: AtomicUsize,
}

impl DocumentSink for UnreachableIndex {
    fn put(&self, _doc: &EquipmentDoc) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("connection refused")
    }

    fn remove(&self, _id: EquipmentId) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("connection refused")
    }

    fn ids(&self) -> Result<Vec<EquipmentId>> {
        anyhow::bail!("connection refused")
    }
}

#[tokio::test]
async fn index_failures_never_fail_writes() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(UnreachableIndex {
        attempts: AtomicUsize::new(0),
    });
    let writer = Arc::new(SearchIndexWriter::new(
        store.clone(),
        sink.clone(),
        Duration::from_secs(5),
    ));
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let publisher = ChangePublisher::new(DispatchRuntime::start(
        writer,
        &DispatchConfig::default(),
        shutdown_rx,
    ));
    let service = EquipmentService::new(store.clone(), Some(publisher.clone()));

    let record = service.create(dell("INV-00001")).unwrap();
    service.delete(record.id).unwrap();
    publisher.wait_idle().await;

    assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
    assert!(store.get(record.id).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mutations_converge() {
    let pipeline = Arc::new(Pipeline::start(config(true)).unwrap());

    let mut handles = Vec::new();
    for task in 0..8u32 {
        let pipeline = pipeline.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let service = pipeline.service();
            let mut ids = Vec::new();
            for n in 0..5u32 {
                let asset = format!("INV-{:05}", task * 100 + n + 1);
                let record = service.create(dell(&asset)).unwrap();

                let mut changed = dell(&asset);
                changed.model = format!("Latitude {}", 5000 + n);
                changed.acquisition_value = Some(1000.0 + f64::from(n));
                service.update(record.id, changed).unwrap();

                if n % 2 == 0 {
                    service.delete(record.id).unwrap();
                }
                ids.push(record.id);
            }
            ids
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.extend(handle.await.unwrap());
    }
    pipeline.wait_idle().await;

    assert_eq!(pipeline.store().len(), 16);
    assert_converged(&pipeline, &ids);
}

#[tokio::test]
async fn reapplying_converged_state_is_idempotent() {
    let pipeline = Pipeline::start(config(true)).unwrap();
    let service = pipeline.service();

    let mut ids = Vec::new();
    for n in 1..=5 {
        ids.push(service.create(dell(&format!("INV-{:05}", n))).unwrap().id);
    }
    pipeline.wait_idle().await;

    let before: Vec<_> = ids
        .iter()
        .map(|&id| pipeline.query().get(id).unwrap())
        .collect();

    let report = pipeline.writer().reindex_all().await.unwrap();
    assert_eq!(report.applied, 5);
    assert_eq!(report.failed, 0);
    assert_eq!(report.purged, 0);

    let after: Vec<_> = ids
        .iter()
        .map(|&id| pipeline.query().get(id).unwrap())
        .collect();
    assert_eq!(before, after);
    assert_converged(&pipeline, &ids);
}

#[tokio::test]
async fn reindex_backfills_records_written_while_disabled() {
    let store = Arc::new(MemoryStore::new());
    let offline = EquipmentService::new(store.clone(), None);
    for n in 1..=3 {
        offline.create(dell(&format!("INV-{:05}", n))).unwrap();
    }

    let index = Arc::new(EquipmentIndex::new_in_memory(HEAP).unwrap());
    let writer = SearchIndexWriter::new(store, index.clone(), Duration::from_secs(5));
    let report = writer.reindex_all().await.unwrap();

    assert_eq!(report.applied, 3);
    let query = QueryService::new(index, 100);
    let hits = query.search_by_text("latitude", query.paginate(0, 10)).unwrap();
    assert_eq!(hits.len(), 3);
}
