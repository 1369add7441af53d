//! Pipeline stages: assembly, distribution, orchestration.

mod assembler;
mod batch;
mod distributor;
mod metrics;
mod orchestrator;
mod semaphore;

#[cfg(test)]
mod pipeline_tests;

pub use batch::{Batch, FlushReason, TaggedItem};
pub use metrics::{Metrics, MetricsSnapshot};
pub use orchestrator::{Pipeline, PipelineState};
pub use semaphore::{CountingSemaphore, Permit};
