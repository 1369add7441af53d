//! Batch assembly: accumulate tagged items and flush on count or time.
//!
//! The assembler is a single loop task holding one in-progress window and a
//! timer armed on the window's first item. Two triggers race to flush:
//!
//! - count trigger: fires the instant the window reaches `max_items`
//! - time trigger: fires when `max_wait` elapses since the first item
//!
//! The count trigger is checked synchronously on insertion, so a window that
//! reached capacity never waits on a simultaneously expired timer. A window
//! with zero items never arms the timer; an idle pipeline emits no empty
//! batches.

use crate::config::PipelineConfig;
use crate::observe::ObserverHandle;
use crate::pipeline::batch::{Batch, FlushReason, TaggedItem};
use crate::pipeline::distributor::BatchRouter;
use crate::pipeline::metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Control messages for the assembler loop.
#[derive(Debug)]
pub(crate) enum AssemblerCommand {
    /// Stop accepting items, force-flush any partial window, terminate.
    Stop,
    /// Report then force-flush remaining un-batched items; reply with the
    /// remaining count once the flush has entered the routing queue.
    Drain(oneshot::Sender<usize>),
}

/// The accumulation stage.
pub(crate) struct BatchAssembler<T> {
    items_rx: mpsc::Receiver<TaggedItem<T>>,
    control_rx: mpsc::Receiver<AssemblerCommand>,
    router: BatchRouter<T>,
    max_items: usize,
    max_wait: Duration,
    metrics: Arc<Metrics>,
    observer: ObserverHandle,
}

impl<T: Send + 'static> BatchAssembler<T> {
    pub(crate) fn new(
        config: &PipelineConfig,
        items_rx: mpsc::Receiver<TaggedItem<T>>,
        control_rx: mpsc::Receiver<AssemblerCommand>,
        router: BatchRouter<T>,
        metrics: Arc<Metrics>,
        observer: ObserverHandle,
    ) -> Self {
        Self {
            items_rx,
            control_rx,
            router,
            max_items: config.max_items,
            max_wait: config.max_wait(),
            metrics,
            observer,
        }
    }

    /// Spawn the accumulation loop.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut window: Vec<TaggedItem<T>> = Vec::with_capacity(self.max_items);
        let mut deadline: Option<Instant> = None;
        let mut items_open = true;
        let mut last_id: u64 = 0;

        loop {
            tokio::select! {
                biased;

                cmd = self.control_rx.recv() => {
                    match cmd {
                        Some(AssemblerCommand::Drain(done)) => {
                            self.drain_input(&mut window, &mut last_id).await;
                            items_open = false;
                            deadline = None;
                            let remaining = window.len();
                            self.observer.warn(
                                "assembler_drain",
                                &[("remaining_items", remaining.to_string())],
                            );
                            if !window.is_empty() {
                                self.flush(&mut window, FlushReason::Forced).await;
                            }
                            let _ = done.send(remaining);
                        }
                        Some(AssemblerCommand::Stop) | None => {
                            self.drain_input(&mut window, &mut last_id).await;
                            if !window.is_empty() {
                                self.flush(&mut window, FlushReason::Forced).await;
                            }
                            break;
                        }
                    }
                }

                item = self.items_rx.recv(), if items_open => {
                    match item {
                        Some(item) => {
                            debug_assert!(item.id > last_id, "ids must be strictly increasing");
                            last_id = item.id;
                            if window.is_empty() {
                                deadline = Some(Instant::now() + self.max_wait);
                            }
                            window.push(item);
                            if window.len() >= self.max_items {
                                deadline = None;
                                self.flush(&mut window, FlushReason::Count).await;
                            }
                        }
                        None => {
                            // Entry point closed; the partial window is
                            // released by Stop/Drain or by the timer.
                            items_open = false;
                        }
                    }
                }

                _ = maybe_sleep(deadline), if deadline.is_some() => {
                    deadline = None;
                    self.flush(&mut window, FlushReason::Time).await;
                }
            }
        }

        self.observer.debug("assembler_stopped", &[]);
    }

    /// Close the item channel and pull everything already queued into the
    /// window, flushing full batches along the way. Items sent before the
    /// entry point closed are never stranded in the queue.
    async fn drain_input(&mut self, window: &mut Vec<TaggedItem<T>>, last_id: &mut u64) {
        self.items_rx.close();
        while let Some(item) = self.items_rx.recv().await {
            debug_assert!(item.id > *last_id, "ids must be strictly increasing");
            *last_id = item.id;
            window.push(item);
            if window.len() >= self.max_items {
                self.flush(window, FlushReason::Count).await;
            }
        }
    }

    async fn flush(&self, window: &mut Vec<TaggedItem<T>>, reason: FlushReason) {
        let items = std::mem::replace(window, Vec::with_capacity(self.max_items));
        debug_assert!(!items.is_empty(), "empty windows are never flushed");
        debug_assert!(items.len() <= self.max_items, "batch exceeds max_items");

        match reason {
            FlushReason::Count => self.metrics.add_count_flush(),
            FlushReason::Time => self.metrics.add_time_flush(),
            FlushReason::Forced => self.metrics.add_forced_flush(),
        }

        let batch = Batch::seal(items, reason);
        self.observer.info(
            "batch_flush",
            &[
                ("size", batch.len().to_string()),
                ("reason", reason.to_string()),
            ],
        );

        if let Err(batch) = self.router.accept(batch).await {
            // Routing queue closed underneath us; only possible on immediate
            // consumer shutdown.
            self.metrics.add_batch_abandoned();
            self.observer.warn(
                "flush_after_routing_closed",
                &[("ids", format!("{:?}", batch.ids()))],
            );
        }
    }
}

/// Sleep until the deadline, or forever when no window is open. The caller
/// guards this arm with `deadline.is_some()`.
async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(d) => sleep_until(d).await,
        None => std::future::pending().await,
    }
}
