//! Service lifecycle
//!
//! Wires the primary store, CRUD service, index writer, dispatch runtime and
//! query service together from configuration, and runs the HTTP API until
//! shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::http::{AppState, HttpServer};
use crate::inventory::{EquipmentInput, EquipmentService, MemoryStore};
use crate::search::{EquipmentIndex, QueryService};
use crate::sync::{
    ChangePublisher, DisabledIndexWriter, DispatchRuntime, IndexWriter, SearchIndexWriter,
};

/// All running components of the service
pub struct Pipeline {
    config: Config,
    store: Arc<MemoryStore>,
    service: Arc<EquipmentService>,
    query: Arc<QueryService>,
    writer: Arc<dyn IndexWriter>,
    publisher: Option<ChangePublisher>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Pipeline {
    /// Build every component. Must be called from within a tokio runtime.
    ///
    /// `search.enabled` picks the index writer here, once; it cannot change
    /// for the lifetime of the pipeline. Fails on an invalid configuration.
    pub fn start(config: Config) -> Result<Self> {
        config.validate()?;

        let index = Arc::new(match &config.search.index_path {
            Some(path) => EquipmentIndex::open(path, config.search.writer_heap_bytes)
                .with_context(|| format!("Failed to open index at {}", path.display()))?,
            None => EquipmentIndex::new_in_memory(config.search.writer_heap_bytes)
                .context("Failed to create in-memory index")?,
        });

        let store = Arc::new(MemoryStore::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(16);

        let (writer, publisher): (Arc<dyn IndexWriter>, Option<ChangePublisher>) =
            if config.search.enabled {
                let writer: Arc<dyn IndexWriter> = Arc::new(SearchIndexWriter::new(
                    store.clone(),
                    index.clone(),
                    config.dispatch.apply_timeout(),
                ));
                let runtime = DispatchRuntime::start(writer.clone(), &config.dispatch, shutdown_rx);
                (writer, Some(ChangePublisher::new(runtime)))
            } else {
                info!("Search indexing disabled; changes will not be published");
                (Arc::new(DisabledIndexWriter), None)
            };

        let service = Arc::new(EquipmentService::new(store.clone(), publisher.clone()));
        let query = Arc::new(QueryService::new(index, config.search.max_page_size));

        info!(
            "Pipeline started (indexing={}, index={})",
            config.search.enabled,
            config
                .search
                .index_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "in-memory".to_string())
        );

        Ok(Self {
            config,
            store,
            service,
            query,
            writer,
            publisher,
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn service(&self) -> &Arc<EquipmentService> {
        &self.service
    }

    pub fn query(&self) -> &Arc<QueryService> {
        &self.query
    }

    pub fn writer(&self) -> &Arc<dyn IndexWriter> {
        &self.writer
    }

    pub fn indexing_enabled(&self) -> bool {
        self.writer.is_enabled()
    }

    /// Events published but not yet applied
    pub fn pending(&self) -> usize {
        self.publisher.as_ref().map_or(0, ChangePublisher::pending)
    }

    /// Resolves once every published event has been applied
    pub async fn wait_idle(&self) {
        if let Some(publisher) = &self.publisher {
            publisher.wait_idle().await;
        }
    }

    /// Create each record through the CRUD service. Returns how many were
    /// created; rejected records are logged and skipped.
    pub fn seed(&self, records: Vec<EquipmentInput>) -> usize {
        let mut created = 0;
        for input in records {
            let label = format!("{} {}", input.brand, input.model);
            match self.service.create(input) {
                Ok(record) => {
                    created += 1;
                    debug!("Seeded equipment id={} ({})", record.id, label);
                }
                Err(e) => warn!("Skipping seed record {}: {}", label, e),
            }
        }
        info!("Seeded {} equipment records", created);
        created
    }

    /// State shared with the HTTP handlers
    pub fn app_state(&self) -> AppState {
        AppState {
            query: self.query.clone(),
            writer: self.writer.clone(),
            publisher: self.publisher.clone(),
        }
    }

    /// Serve the HTTP API until Ctrl-C or [`Pipeline::shutdown`]
    pub async fn run(&self) -> Result<()> {
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C, shutting down");
                    let _ = shutdown_tx.send(());
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        });

        let server = HttpServer::new(self.config.http.clone(), self.app_state());
        server.run(self.shutdown_tx.subscribe()).await?;

        info!("Pipeline stopped");
        Ok(())
    }

    /// Signal workers and the HTTP server to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
