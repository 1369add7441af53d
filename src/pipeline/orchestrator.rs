//! Pipeline orchestration: ingestion, id assignment, lifecycle.
//!
//! The orchestrator owns the ingestion entry point, tags each submitted
//! payload with a fresh monotonically increasing id, and drives the
//! assembler and distributor through their lifecycle. Graceful shutdown is
//! the drain-then-close sequence, made exclusive by acquiring the full
//! counting-semaphore capacity so two concurrent `close` calls can never
//! interleave or double-close the entry point.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::observe::{self, ObserverHandle};
use crate::pipeline::assembler::{AssemblerCommand, BatchAssembler};
use crate::pipeline::batch::{Batch, TaggedItem};
use crate::pipeline::distributor::BatchDistributor;
use crate::pipeline::metrics::{Metrics, MetricsSnapshot};
use crate::pipeline::semaphore::CountingSemaphore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;

/// Lifecycle states of a pipeline instance.
///
/// `Created → Started → Draining → Stopped`; no transition leaves `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Started,
    Draining,
    Stopped,
}

/// The batch pipeline.
///
/// ```text
/// submit(item) ──▶ [ingest queue] ──▶ Assembler ──▶ [routing queue]
///                                                        │
///                                   workers (N) ◀────────┘
///                                        │
/// request_supply() ◀── supply rendezvous ┘
/// ```
///
/// Batches reach the supply in the order workers claim them, which is NOT
/// necessarily flush order when several workers are idle at once; callers
/// needing strict ordering must sequence on item ids.
pub struct Pipeline<T> {
    config: PipelineConfig,
    state: Mutex<PipelineState>,
    id_counter: AtomicU64,
    /// One-shot ingestion entry point; taken exactly once at close.
    ingest_tx: Mutex<Option<mpsc::Sender<TaggedItem<T>>>>,
    control_tx: mpsc::Sender<AssemblerCommand>,
    /// Assembler waiting to be spawned by `start`.
    assembler: Mutex<Option<BatchAssembler<T>>>,
    distributor: BatchDistributor<T>,
    semaphore: CountingSemaphore,
    metrics: Arc<Metrics>,
    observer: ObserverHandle,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Build a pipeline from a validated configuration with the default
    /// `tracing` observer.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::with_observer(config, observe::default_observer())
    }

    /// Build a pipeline with a custom observation sink.
    pub fn with_observer(
        config: PipelineConfig,
        observer: ObserverHandle,
    ) -> Result<Self, PipelineError> {
        config.validate().map_err(PipelineError::InvalidConfig)?;

        let metrics = Metrics::new();
        let distributor = BatchDistributor::new(&config, metrics.clone(), observer.clone());

        let (ingest_tx, items_rx) = mpsc::channel(config.ingest_buffer);
        let (control_tx, control_rx) = mpsc::channel(4);

        let assembler = BatchAssembler::new(
            &config,
            items_rx,
            control_rx,
            distributor.router(),
            metrics.clone(),
            observer.clone(),
        );

        let semaphore = CountingSemaphore::new(config.max_items);

        Ok(Self {
            config,
            state: Mutex::new(PipelineState::Created),
            id_counter: AtomicU64::new(0),
            ingest_tx: Mutex::new(Some(ingest_tx)),
            control_tx,
            assembler: Mutex::new(Some(assembler)),
            distributor,
            semaphore,
            metrics,
            observer,
        })
    }

    /// Start the distributor (its routing point must exist before the
    /// assembler can flush into it), then the assembler.
    pub fn start(&self) -> Result<(), PipelineError> {
        {
            let mut state = self.state.lock().expect("state lock poisoned");
            match *state {
                PipelineState::Created => *state = PipelineState::Started,
                PipelineState::Started => return Err(PipelineError::AlreadyStarted),
                PipelineState::Draining | PipelineState::Stopped => {
                    return Err(PipelineError::Closed)
                }
            }
        }

        self.distributor.start();
        let assembler = self
            .assembler
            .lock()
            .expect("assembler lock poisoned")
            .take();
        if let Some(assembler) = assembler {
            assembler.spawn();
        }

        self.observer.info(
            "pipeline_started",
            &[
                ("max_items", self.config.max_items.to_string()),
                ("max_wait_ms", self.config.max_wait_ms.to_string()),
                ("workers", self.config.worker_pool_size.to_string()),
            ],
        );
        Ok(())
    }

    /// Submit one payload. Tags it with a fresh id and forwards it toward
    /// the assembler; awaits bounded ingest-queue capacity under burst.
    /// Returns the assigned id.
    pub async fn submit(&self, payload: T) -> Result<u64, PipelineError> {
        if self.state() == PipelineState::Created {
            return Err(PipelineError::NotStarted);
        }

        let sender = {
            let guard = self.ingest_tx.lock().expect("ingest lock poisoned");
            guard.clone()
        };
        let sender = sender.ok_or(PipelineError::Closed)?;

        let id = self.id_counter.fetch_add(1, Ordering::Relaxed) + 1;
        sender
            .send(TaggedItem::new(id, payload))
            .await
            .map_err(|_| PipelineError::Closed)?;
        self.metrics.add_item_submitted();
        Ok(id)
    }

    /// Claim one completed batch; suspends until one is available.
    pub async fn request_supply(&self) -> Result<Batch<T>, PipelineError> {
        self.distributor.request_supply().await
    }

    /// Claim one completed batch, giving up after `timeout`.
    pub async fn request_supply_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Batch<T>, PipelineError> {
        self.distributor.request_supply_timeout(timeout).await
    }

    /// Stop the assembler: close the entry point, force-flush any partial
    /// window, terminate its task.
    pub async fn stop_producer(&self) {
        self.take_ingest_sender();
        let _ = self.control_tx.send(AssemblerCommand::Stop).await;
    }

    /// Stop the distributor immediately: no further batches are claimed,
    /// undeliverable ones are reported abandoned.
    pub fn stop_consumer(&self) {
        self.distributor.quit();
    }

    /// Signal both stages to stop.
    pub async fn stop(&self) {
        self.stop_producer().await;
        self.stop_consumer();
    }

    /// Full graceful shutdown: close the entry point, drain the assembler,
    /// wait for the drain to complete, then stop both stages cooperatively.
    /// The whole region holds the semaphore's full capacity, so concurrent
    /// `close` calls serialize and the second reports already-closed.
    ///
    /// Queued batches stay claimable through `request_supply` until every
    /// one is delivered; only then does the supply report closed. With no
    /// supply consumer running, `close` can block once the drained batches no
    /// longer fit the routing queue and worker pool; keep pulling until
    /// `request_supply` reports closed.
    pub async fn close(&self) -> Result<(), PipelineError> {
        let _exclusive = self.semaphore.acquire_all().await;

        let was_started = {
            let mut state = self.state.lock().expect("state lock poisoned");
            match *state {
                PipelineState::Stopped => return Err(PipelineError::AlreadyClosed),
                PipelineState::Created => {
                    *state = PipelineState::Stopped;
                    false
                }
                PipelineState::Started | PipelineState::Draining => {
                    *state = PipelineState::Draining;
                    true
                }
            }
        };

        // Reject new submissions from here on; the one-shot take means the
        // ingest queue cannot be double-closed.
        self.take_ingest_sender();

        if !was_started {
            return Ok(());
        }

        self.observer.warn("close", &[]);

        let (done_tx, done_rx) = oneshot::channel();
        if self
            .control_tx
            .send(AssemblerCommand::Drain(done_tx))
            .await
            .is_ok()
        {
            match done_rx.await {
                Ok(remaining) => {
                    self.observer.warn(
                        "drain_complete",
                        &[("remaining_items", remaining.to_string())],
                    );
                }
                Err(_) => {
                    self.observer.warn("drain_signal_lost", &[]);
                }
            }
        }

        let _ = self.control_tx.send(AssemblerCommand::Stop).await;
        self.distributor.stop();

        let mut state = self.state.lock().expect("state lock poisoned");
        *state = PipelineState::Stopped;
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Snapshot of this instance's counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The resolved configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn take_ingest_sender(&self) {
        let mut guard = self.ingest_tx.lock().expect("ingest lock poisoned");
        guard.take();
    }
}
