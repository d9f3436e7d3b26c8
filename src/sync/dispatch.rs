//! Async dispatch runtime
//!
//! Elastic worker pool that applies change events off the CRUD path.
//! `min_workers` workers live for the lifetime of the runtime and share one
//! bounded queue. When the queue is full a surge worker is spawned (up to
//! `max_workers`) that runs the overflowing event immediately and then keeps
//! draining the queue until it has been idle for `keep_alive`. With the
//! queue full and the pool at its maximum, events are rejected.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;

use super::event::ChangeEvent;
use super::writer::IndexWriter;

/// Handle to the worker pool; cheap to clone
#[derive(Clone)]
pub struct DispatchRuntime {
    shared: Arc<Shared>,
}

struct Shared {
    writer: Arc<dyn IndexWriter>,
    queue_tx: mpsc::Sender<ChangeEvent>,
    queue_rx: Mutex<mpsc::Receiver<ChangeEvent>>,
    min_workers: usize,
    max_workers: usize,
    keep_alive: Duration,
    /// Workers currently alive, core and surge
    workers: AtomicUsize,
    /// Events queued or executing
    pending: AtomicUsize,
    idle: Notify,
    /// Set once on shutdown. Enqueues hold the read side so nothing can be
    /// queued after a worker has marked the runtime closed.
    closed: parking_lot::RwLock<bool>,
    /// Source of receivers for workers spawned after startup
    shutdown: parking_lot::Mutex<broadcast::Receiver<()>>,
    runtime: Handle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerKind {
    Core,
    Surge,
}

enum Next {
    Event(ChangeEvent),
    Idle,
    Stop,
}

impl DispatchRuntime {
    /// Start the core workers. Must be called from within a tokio runtime.
    pub fn start(
        writer: Arc<dyn IndexWriter>,
        config: &DispatchConfig,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity);

        let shared = Arc::new(Shared {
            writer,
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            keep_alive: config.keep_alive(),
            workers: AtomicUsize::new(config.min_workers),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            closed: parking_lot::RwLock::new(false),
            shutdown: parking_lot::Mutex::new(shutdown),
            runtime: Handle::current(),
        });

        for _ in 0..config.min_workers {
            let worker_shutdown = shared.subscribe();
            let worker_shared = shared.clone();
            shared.runtime.spawn(async move {
                run_worker(worker_shared, WorkerKind::Core, None, worker_shutdown).await;
            });
        }

        info!(
            "Dispatch runtime started (workers={}..={}, queue_capacity={})",
            config.min_workers, config.max_workers, config.queue_capacity
        );

        Self { shared }
    }

    /// Hand an event to the pool without waiting.
    ///
    /// Returns `false` when the event was rejected: the pool is saturated or
    /// has shut down.
    pub fn dispatch(&self, event: ChangeEvent) -> bool {
        let shared = &self.shared;

        if shared.shutdown_signalled() {
            shared.close();
        }

        let closed = shared.closed.read();
        if *closed {
            warn!("Dispatch runtime is shut down, dropping {}", event);
            return false;
        }

        shared.pending.fetch_add(1, Ordering::AcqRel);
        let sent = shared.queue_tx.try_send(event);
        drop(closed);

        match sent {
            Ok(()) => {
                debug!("Queued {}", event);
                true
            }
            Err(TrySendError::Full(event)) => {
                if shared.reserve_worker() {
                    let alive = shared.workers.load(Ordering::Acquire);
                    debug!("Queue full, starting surge worker ({} alive) for {}", alive, event);

                    let worker_shutdown = shared.subscribe();
                    let worker_shared = shared.clone();
                    shared.runtime.spawn(async move {
                        run_worker(worker_shared, WorkerKind::Surge, Some(event), worker_shutdown)
                            .await;
                    });
                    true
                } else {
                    shared.finish_one();
                    warn!(
                        "Dispatch queue full with {} workers busy, dropping {}",
                        shared.max_workers, event
                    );
                    false
                }
            }
            Err(TrySendError::Closed(event)) => {
                shared.finish_one();
                warn!("Dispatch queue closed, dropping {}", event);
                false
            }
        }
    }

    /// Number of events queued or executing
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Number of live workers
    pub fn workers(&self) -> usize {
        self.shared.workers.load(Ordering::Acquire)
    }

    /// Resolves once no event is queued or executing
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl Shared {
    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown.lock().resubscribe()
    }

    fn shutdown_signalled(&self) -> bool {
        !matches!(
            self.shutdown.lock().try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        )
    }

    /// Waits out any enqueue in flight; once this returns the queue only
    /// shrinks
    fn close(&self) {
        *self.closed.write() = true;
    }

    fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    /// Claim a surge slot if the pool is below its maximum
    fn reserve_worker(&self) -> bool {
        self.workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |alive| {
                (alive < self.max_workers).then_some(alive + 1)
            })
            .is_ok()
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Throw away everything still queued after shutdown
    async fn discard_queued(&self) {
        let mut rx = self.queue_rx.lock().await;
        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
            self.finish_one();
        }
        if dropped > 0 {
            debug!("Discarded {} queued events on shutdown", dropped);
        }
    }
}

async fn run_worker(
    shared: Arc<Shared>,
    kind: WorkerKind,
    first: Option<ChangeEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    if let Some(event) = first {
        shared.writer.apply(event).await;
        shared.finish_one();
    }

    loop {
        if shared.is_closed() {
            break;
        }

        let next = tokio::select! {
            event = async { shared.queue_rx.lock().await.recv().await } => match event {
                Some(event) => Next::Event(event),
                None => Next::Stop,
            },
            _ = shutdown.recv() => {
                shared.close();
                Next::Stop
            }
            _ = tokio::time::sleep(shared.keep_alive), if kind == WorkerKind::Surge => Next::Idle,
        };

        match next {
            Next::Event(event) => {
                shared.writer.apply(event).await;
                shared.finish_one();
            }
            Next::Idle => {
                // Never retire below the core size
                let retired = shared
                    .workers
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |alive| {
                        (alive > shared.min_workers).then(|| alive - 1)
                    })
                    .is_ok();
                if retired {
                    debug!("Surge worker idle for {:?}, retiring", shared.keep_alive);
                    return;
                }
            }
            Next::Stop => break,
        }
    }

    shared.workers.fetch_sub(1, Ordering::AcqRel);
    if shared.is_closed() {
        shared.discard_queued().await;
    }
    debug!("{:?} worker stopped", kind);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::EquipmentId;
    use crate::sync::writer::ReindexReport;
    use anyhow::Result;
    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    /// Records applied events, optionally blocking each apply on a gate
    struct RecordingWriter {
        applied: parking_lot::Mutex<Vec<ChangeEvent>>,
        gate: Option<Arc<Semaphore>>,
        started: mpsc::UnboundedSender<EquipmentId>,
    }

    impl RecordingWriter {
        fn new(gate: Option<Arc<Semaphore>>) -> (Arc<Self>, mpsc::UnboundedReceiver<EquipmentId>) {
            let (started, started_rx) = mpsc::unbounded_channel();
            let writer = Arc::new(Self {
                applied: parking_lot::Mutex::new(Vec::new()),
                gate,
                started,
            });
            (writer, started_rx)
        }

        async fn record(&self, event: ChangeEvent) {
            let _ = self.started.send(event.record_id);
            if let Some(gate) = &self.gate {
                let _permit = gate.acquire().await.unwrap();
            }
            self.applied.lock().push(event);
        }
    }

    #[async_trait]
    impl IndexWriter for RecordingWriter {
        async fn upsert(&self, record_id: EquipmentId) {
            self.record(ChangeEvent::upsert(record_id)).await;
        }

        async fn delete(&self, record_id: EquipmentId) {
            self.record(ChangeEvent::delete(record_id)).await;
        }

        async fn reindex_all(&self) -> Result<ReindexReport> {
            Ok(ReindexReport::default())
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    fn config(min: usize, max: usize, capacity: usize, keep_alive_secs: u64) -> DispatchConfig {
        DispatchConfig {
            min_workers: min,
            max_workers: max,
            queue_capacity: capacity,
            keep_alive_secs,
            ..DispatchConfig::default()
        }
    }

    #[tokio::test]
    async fn applies_every_dispatched_event() {
        let (writer, _started) = RecordingWriter::new(None);
        let (_tx, rx) = broadcast::channel(1);
        let runtime = DispatchRuntime::start(writer.clone(), &config(2, 4, 100, 60), rx);

        for id in 1..=20 {
            assert!(runtime.dispatch(ChangeEvent::upsert(id)));
        }
        runtime.wait_idle().await;

        assert_eq!(runtime.pending(), 0);
        let mut ids: Vec<_> = writer.applied.lock().iter().map(|e| e.record_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_nothing_pending() {
        let (writer, _started) = RecordingWriter::new(None);
        let (_tx, rx) = broadcast::channel(1);
        let runtime = DispatchRuntime::start(writer, &config(1, 1, 10, 60), rx);
        runtime.wait_idle().await;
        assert_eq!(runtime.pending(), 0);
    }

    #[tokio::test]
    async fn surges_then_rejects_when_saturated() {
        let gate = Arc::new(Semaphore::new(0));
        let (writer, mut started) = RecordingWriter::new(Some(gate.clone()));
        let (_tx, rx) = broadcast::channel(1);
        let runtime = DispatchRuntime::start(writer.clone(), &config(1, 2, 1, 60), rx);

        // The core worker picks up the first event and blocks
        assert!(runtime.dispatch(ChangeEvent::upsert(1)));
        assert_eq!(started.recv().await, Some(1));

        // Fills the queue
        assert!(runtime.dispatch(ChangeEvent::upsert(2)));

        // Queue full: a surge worker runs this one directly
        assert!(runtime.dispatch(ChangeEvent::upsert(3)));
        assert_eq!(started.recv().await, Some(3));
        assert_eq!(runtime.workers(), 2);

        // Queue full and pool at maximum
        assert!(!runtime.dispatch(ChangeEvent::delete(4)));
        assert_eq!(runtime.pending(), 3);

        gate.add_permits(10);
        runtime.wait_idle().await;

        let mut ids: Vec<_> = writer.applied.lock().iter().map(|e| e.record_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn surge_workers_retire_after_keep_alive() {
        let gate = Arc::new(Semaphore::new(0));
        let (writer, mut started) = RecordingWriter::new(Some(gate.clone()));
        let (_tx, rx) = broadcast::channel(1);
        let runtime = DispatchRuntime::start(writer, &config(1, 2, 1, 0), rx);

        runtime.dispatch(ChangeEvent::upsert(1));
        started.recv().await;
        runtime.dispatch(ChangeEvent::upsert(2));
        runtime.dispatch(ChangeEvent::upsert(3));
        assert_eq!(runtime.workers(), 2);

        gate.add_permits(10);
        runtime.wait_idle().await;

        for _ in 0..100 {
            if runtime.workers() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(runtime.workers(), 1);
    }

    #[tokio::test]
    async fn rejects_after_shutdown() {
        let (writer, _started) = RecordingWriter::new(None);
        let (tx, rx) = broadcast::channel(1);
        let runtime = DispatchRuntime::start(writer.clone(), &config(2, 4, 10, 60), rx);

        tx.send(()).unwrap();
        assert!(!runtime.dispatch(ChangeEvent::upsert(1)));
        assert_eq!(runtime.pending(), 0);
        assert!(writer.applied.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shutdown_while_dispatching_leaves_nothing_pending() {
        for _ in 0..20 {
            let (writer, _started) = RecordingWriter::new(None);
            let (tx, rx) = broadcast::channel(1);
            let runtime = DispatchRuntime::start(writer, &config(2, 2, 1000, 60), rx);

            let producer = {
                let runtime = runtime.clone();
                tokio::spawn(async move {
                    for id in 0..200 {
                        runtime.dispatch(ChangeEvent::upsert(id));
                        tokio::task::yield_now().await;
                    }
                })
            };
            tokio::task::yield_now().await;
            tx.send(()).unwrap();
            producer.await.unwrap();

            tokio::time::timeout(Duration::from_secs(5), runtime.wait_idle())
                .await
                .expect("queued events were neither applied nor discarded");
            assert_eq!(runtime.pending(), 0);
            assert!(!runtime.dispatch(ChangeEvent::upsert(999)));
        }
    }
}
