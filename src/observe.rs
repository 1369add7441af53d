//! Structured observation sink for pipeline stages.
//!
//! Every stage reports batch sizes, shutdown progress and remaining-item
//! counts through an [`Observer`]. The default sink forwards to `tracing`;
//! embedding applications can inject their own, and a no-op sink is available
//! when no observation is wanted. The sink never influences pipeline
//! behavior.

use std::sync::Arc;

/// Key/value fields attached to an observation.
pub type Fields<'a> = &'a [(&'a str, String)];

/// Structured-observation sink accepted by every pipeline stage.
pub trait Observer: Send + Sync {
    /// Report routine progress (batch flushed, worker started, ...).
    fn info(&self, event: &str, fields: Fields);

    /// Report shutdown-path conditions (remaining items, abandoned batches).
    fn warn(&self, event: &str, fields: Fields);

    /// Report fine-grained scheduling detail.
    fn debug(&self, event: &str, fields: Fields);
}

/// Default sink forwarding observations to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

fn render(fields: Fields) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Observer for TracingObserver {
    fn info(&self, event: &str, fields: Fields) {
        tracing::info!("{} {}", event, render(fields));
    }

    fn warn(&self, event: &str, fields: Fields) {
        tracing::warn!("{} {}", event, render(fields));
    }

    fn debug(&self, event: &str, fields: Fields) {
        tracing::debug!("{} {}", event, render(fields));
    }
}

/// Sink that discards all observations.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn info(&self, _event: &str, _fields: Fields) {}
    fn warn(&self, _event: &str, _fields: Fields) {}
    fn debug(&self, _event: &str, _fields: Fields) {}
}

/// Shared handle to an observer, cloned into each stage.
pub type ObserverHandle = Arc<dyn Observer>;

/// Build the default observer handle.
pub fn default_observer() -> ObserverHandle {
    Arc::new(TracingObserver)
}
