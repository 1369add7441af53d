//! Counting semaphore guarding the drain-then-close shutdown region.
//!
//! The orchestrator acquires the full capacity while it drains the assembler
//! and stops both stages, so two concurrent `close` calls cannot interleave
//! and the ingestion entry point is closed exactly once. Permits are RAII
//! guards; release happens on drop, which makes an unbalanced release
//! impossible rather than merely detected.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded permit counter with RAII acquisition.
#[derive(Debug, Clone)]
pub struct CountingSemaphore {
    inner: Arc<Semaphore>,
    capacity: usize,
}

/// A held permit (or the whole capacity). Dropping it releases.
#[derive(Debug)]
pub struct Permit {
    _permit: OwnedSemaphorePermit,
}

impl CountingSemaphore {
    /// Create a semaphore with the given capacity. Capacity is fixed for the
    /// semaphore's lifetime.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "semaphore capacity must be positive");
        Self {
            inner: Arc::new(Semaphore::new(capacity.max(1))),
            capacity: capacity.max(1),
        }
    }

    /// Acquire one permit, waiting until one is available.
    pub async fn acquire(&self) -> Permit {
        let permit = self
            .inner
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");
        Permit { _permit: permit }
    }

    /// Acquire the full capacity, making the holder exclusive with every
    /// other acquirer. Used to serialize the drain-then-close region.
    pub async fn acquire_all(&self) -> Permit {
        let permit = self
            .inner
            .clone()
            .acquire_many_owned(self.capacity as u32)
            .await
            .expect("semaphore is never closed");
        Permit { _permit: permit }
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        self.inner.available_permits()
    }

    /// Total capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
