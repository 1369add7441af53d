//! Batch distribution: worker pool and pull-based supply hand-off.
//!
//! Completed batches land on a bounded routing queue shared by a fixed pool
//! of workers. Each worker claims one batch, then waits for a pull caller:
//! `request_supply` sends a request carrying a one-shot reply slot onto a
//! shared request queue, and the worker answers through it. The one-shot
//! reply guarantees at-most-one delivery per batch; pull callers race fairly
//! in request-queue order. A caller that gives up (timeout) drops its reply
//! slot, and the worker re-offers the batch to the next request.
//!
//! Shutdown:
//! - cooperative: the routing queue is closed; workers deliver what is
//!   already queued, then exit. A supervisor joins the workers and closes the
//!   request queue, so late pull callers observe closed-supply instead of
//!   hanging.
//! - quit: a cancellation watch additionally stops idle workers from
//!   claiming more batches. A worker holding an undeliverable batch reports
//!   it abandoned rather than parking. Batches left on the routing queue are
//!   drained and reported abandoned too.
//!
//! A worker parked on the request queue during cooperative shutdown, with no
//! pull caller ever arriving, stays parked: pull-caller absence is a
//! caller-side liveness failure, not a pipeline fault.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::observe::ObserverHandle;
use crate::pipeline::batch::Batch;
use crate::pipeline::metrics::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};

/// A pull caller's claim on one batch.
struct SupplyRequest<T> {
    reply: oneshot::Sender<Batch<T>>,
}

/// Flush-side handle to the routing queue, handed to the assembler as its
/// flush target.
pub(crate) struct BatchRouter<T> {
    tx: async_channel::Sender<Batch<T>>,
}

impl<T> BatchRouter<T> {
    pub(crate) fn new(tx: async_channel::Sender<Batch<T>>) -> Self {
        Self { tx }
    }

    /// Hand a completed batch to the routing queue. Awaits queue capacity;
    /// bounded backpressure toward the producer side. Returns the batch when
    /// the queue has closed underneath the producer.
    pub(crate) async fn accept(&self, batch: Batch<T>) -> Result<(), Batch<T>> {
        self.tx.send(batch).await.map_err(|err| err.into_inner())
    }
}

/// The distribution stage.
pub(crate) struct BatchDistributor<T> {
    routing_tx: async_channel::Sender<Batch<T>>,
    routing_rx: async_channel::Receiver<Batch<T>>,
    supply_tx: async_channel::Sender<SupplyRequest<T>>,
    supply_rx: async_channel::Receiver<SupplyRequest<T>>,
    cancel_tx: watch::Sender<bool>,
    worker_pool_size: usize,
    metrics: Arc<Metrics>,
    observer: ObserverHandle,
}

impl<T: Send + 'static> BatchDistributor<T> {
    pub(crate) fn new(
        config: &PipelineConfig,
        metrics: Arc<Metrics>,
        observer: ObserverHandle,
    ) -> Self {
        let (routing_tx, routing_rx) = async_channel::bounded(config.flush_buffer);
        // Requests are small; give concurrent pull callers room to queue.
        let (supply_tx, supply_rx) = async_channel::bounded(config.flush_buffer.max(16) * 4);
        let (cancel_tx, _) = watch::channel(false);

        Self {
            routing_tx,
            routing_rx,
            supply_tx,
            supply_rx,
            cancel_tx,
            worker_pool_size: config.worker_pool_size,
            metrics,
            observer,
        }
    }

    /// Flush-side handle feeding the routing queue.
    pub(crate) fn router(&self) -> BatchRouter<T> {
        BatchRouter::new(self.routing_tx.clone())
    }

    /// Spin up the worker pool plus a supervisor that closes the supply side
    /// once every worker has exited.
    pub(crate) fn start(&self) {
        let mut handles = Vec::with_capacity(self.worker_pool_size);
        for idx in 0..self.worker_pool_size {
            handles.push(tokio::spawn(worker(
                idx,
                self.routing_rx.clone(),
                self.supply_rx.clone(),
                self.cancel_tx.subscribe(),
                self.metrics.clone(),
                self.observer.clone(),
            )));
        }
        self.observer.debug(
            "workers_started",
            &[("pool_size", self.worker_pool_size.to_string())],
        );

        let supply_tx = self.supply_tx.clone();
        let supply_rx = self.supply_rx.clone();
        let routing_rx = self.routing_rx.clone();
        let metrics = self.metrics.clone();
        let observer = self.observer.clone();
        tokio::spawn(async move {
            let _ = futures::future::join_all(handles).await;
            supply_tx.close();

            // Wake pull callers whose requests will never be answered.
            while supply_rx.try_recv().is_ok() {}

            // Report batches left behind by an immediate shutdown.
            while let Ok(batch) = routing_rx.try_recv() {
                metrics.add_batch_abandoned();
                observer.warn(
                    "batch_abandoned",
                    &[("ids", format!("{:?}", batch.ids()))],
                );
            }

            observer.debug("distributor_stopped", &[]);
        });
    }

    /// Claim one batch; suspends until a worker has one ready. Exactly one
    /// caller receives any given batch.
    pub(crate) async fn request_supply(&self) -> Result<Batch<T>, PipelineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.supply_tx
            .send(SupplyRequest { reply: reply_tx })
            .await
            .map_err(|_| PipelineError::SupplyClosed)?;
        reply_rx.await.map_err(|_| PipelineError::SupplyClosed)
    }

    /// Claim one batch, giving up after `timeout`. Expiry is a recoverable
    /// no-batch-available condition; the abandoned claim is re-offered to the
    /// next caller.
    pub(crate) async fn request_supply_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Batch<T>, PipelineError> {
        match tokio::time::timeout(timeout, self.request_supply()).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::SupplyTimeout),
        }
    }

    /// Cooperative shutdown: stop pulling new batches, let workers drain what
    /// is already queued, then exit after delivery.
    pub(crate) fn stop(&self) {
        self.routing_tx.close();
    }

    /// Immediate shutdown: close the routing queue and stop idle workers
    /// from claiming anything further.
    pub(crate) fn quit(&self) {
        self.routing_tx.close();
        let _ = self.cancel_tx.send(true);
    }
}

/// One worker: claim a batch from the routing queue, deliver it through the
/// supply rendezvous, repeat. Exits cleanly when the routing queue closes.
async fn worker<T: Send + 'static>(
    idx: usize,
    routing_rx: async_channel::Receiver<Batch<T>>,
    supply_rx: async_channel::Receiver<SupplyRequest<T>>,
    mut cancel_rx: watch::Receiver<bool>,
    metrics: Arc<Metrics>,
    observer: ObserverHandle,
) {
    let mut quit = false;
    'claim: loop {
        let claimed = tokio::select! {
            biased;
            // Err means the cancel source is gone; either way stop claiming.
            _ = cancel_rx.changed() => break 'claim,
            batch = routing_rx.recv() => match batch {
                Ok(batch) => batch,
                // Routing queue closed: normal shutdown, not a fault.
                Err(_) => break 'claim,
            },
        };

        let mut batch = claimed;
        loop {
            if quit || *cancel_rx.borrow() {
                // Immediate shutdown: one last non-blocking hand-off attempt,
                // then report the batch instead of parking.
                match supply_rx.try_recv() {
                    Ok(request) => {
                        if let Err(returned) = request.reply.send(batch) {
                            batch = returned;
                            continue;
                        }
                        metrics.add_batch_delivered();
                    }
                    Err(_) => {
                        metrics.add_batch_abandoned();
                        observer.warn(
                            "batch_abandoned",
                            &[
                                ("worker", idx.to_string()),
                                ("ids", format!("{:?}", batch.ids())),
                            ],
                        );
                    }
                }
                break 'claim;
            }

            tokio::select! {
                biased;
                changed = cancel_rx.changed() => {
                    if changed.is_err() {
                        quit = true;
                    }
                    continue;
                }
                request = supply_rx.recv() => match request {
                    Ok(request) => match request.reply.send(batch) {
                        Ok(()) => {
                            metrics.add_batch_delivered();
                            observer.debug("batch_delivered", &[("worker", idx.to_string())]);
                            break;
                        }
                        Err(returned) => {
                            // Pull caller gave up; re-offer to the next one.
                            batch = returned;
                        }
                    },
                    Err(_) => {
                        // Supply side closed while a batch is in hand.
                        metrics.add_batch_abandoned();
                        observer.warn(
                            "batch_abandoned",
                            &[
                                ("worker", idx.to_string()),
                                ("ids", format!("{:?}", batch.ids())),
                            ],
                        );
                        break 'claim;
                    }
                },
            }
        }
    }

    observer.debug("worker_exit", &[("worker", idx.to_string())]);
}
