//! Change publisher
//!
//! The CRUD side's only entry into the sync pipeline. Publishing enqueues an
//! event on the dispatch runtime and returns immediately; it never blocks or
//! fails the caller.

use tracing::debug;

use crate::inventory::EquipmentId;

use super::dispatch::DispatchRuntime;
use super::event::{ChangeEvent, Operation};

#[derive(Clone)]
pub struct ChangePublisher {
    runtime: DispatchRuntime,
}

impl ChangePublisher {
    pub fn new(runtime: DispatchRuntime) -> Self {
        Self { runtime }
    }

    /// Fire-and-forget. Call only once the mutation has committed.
    pub fn publish(&self, record_id: EquipmentId, operation: Operation) {
        let event = ChangeEvent {
            record_id,
            operation,
        };
        debug!("Publishing {}", event);
        self.runtime.dispatch(event);
    }

    /// Callback for [`crate::inventory::Transaction::on_commit`] that
    /// publishes the change once the transaction has committed
    pub fn commit_hook(
        &self,
        record_id: EquipmentId,
        operation: Operation,
    ) -> impl FnOnce() + Send + 'static {
        let publisher = self.clone();
        move || publisher.publish(record_id, operation)
    }

    /// Events published but not yet applied
    pub fn pending(&self) -> usize {
        self.runtime.pending()
    }

    pub async fn wait_idle(&self) {
        self.runtime.wait_idle().await;
    }
}
