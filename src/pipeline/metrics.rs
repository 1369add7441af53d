//! Throughput counters for one pipeline instance.
//!
//! Counters are plain atomics owned by the pipeline, never process-wide
//! state, so multiple pipelines coexist without sharing. A [`MetricsSnapshot`]
//! freezes the counters for reporting or serialization.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Counters for the pipeline.
#[derive(Debug)]
pub struct Metrics {
    /// Items accepted through the ingestion entry point
    pub items_submitted: AtomicU64,

    /// Batches flushed because the window reached `max_items`
    pub count_flushes: AtomicU64,

    /// Batches flushed because `max_wait` elapsed
    pub time_flushes: AtomicU64,

    /// Partial batches force-flushed during shutdown
    pub forced_flushes: AtomicU64,

    /// Batches handed to a supply caller
    pub batches_delivered: AtomicU64,

    /// Batches abandoned on immediate shutdown with no supply caller
    pub batches_abandoned: AtomicU64,

    /// Start time
    start_time: Instant,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            items_submitted: AtomicU64::new(0),
            count_flushes: AtomicU64::new(0),
            time_flushes: AtomicU64::new(0),
            forced_flushes: AtomicU64::new(0),
            batches_delivered: AtomicU64::new(0),
            batches_abandoned: AtomicU64::new(0),
            start_time: Instant::now(),
        })
    }

    /// Record an accepted item.
    pub fn add_item_submitted(&self) {
        self.items_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a count-triggered flush.
    pub fn add_count_flush(&self) {
        self.count_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a time-triggered flush.
    pub fn add_time_flush(&self) {
        self.time_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a forced shutdown flush.
    pub fn add_forced_flush(&self) {
        self.forced_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch delivered to a supply caller.
    pub fn add_batch_delivered(&self) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch abandoned during immediate shutdown.
    pub fn add_batch_abandoned(&self) {
        self.batches_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Total batches flushed across all trigger kinds.
    pub fn batches_flushed(&self) -> u64 {
        self.count_flushes.load(Ordering::Relaxed)
            + self.time_flushes.load(Ordering::Relaxed)
            + self.forced_flushes.load(Ordering::Relaxed)
    }

    /// Elapsed time since the pipeline was created.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Items per second through the ingestion entry point.
    pub fn items_per_second(&self) -> f64 {
        let items = self.items_submitted.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            items as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get a snapshot of current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            items_submitted: self.items_submitted.load(Ordering::Relaxed),
            count_flushes: self.count_flushes.load(Ordering::Relaxed),
            time_flushes: self.time_flushes.load(Ordering::Relaxed),
            forced_flushes: self.forced_flushes.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            batches_abandoned: self.batches_abandoned.load(Ordering::Relaxed),
            elapsed_secs: self.elapsed().as_secs_f64(),
            items_per_second: self.items_per_second(),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub items_submitted: u64,
    pub count_flushes: u64,
    pub time_flushes: u64,
    pub forced_flushes: u64,
    pub batches_delivered: u64,
    pub batches_abandoned: u64,
    pub elapsed_secs: f64,
    pub items_per_second: f64,
}

impl MetricsSnapshot {
    /// Total batches flushed across all trigger kinds.
    pub fn batches_flushed(&self) -> u64 {
        self.count_flushes + self.time_flushes + self.forced_flushes
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Items: {} | Batches: {} flushed ({} count, {} time, {} forced), \
             {} delivered, {} abandoned | Rate: {:.1} items/s | Elapsed: {:.1}s",
            self.items_submitted,
            self.batches_flushed(),
            self.count_flushes,
            self.time_flushes,
            self.forced_flushes,
            self.batches_delivered,
            self.batches_abandoned,
            self.items_per_second,
            self.elapsed_secs,
        )
    }
}
