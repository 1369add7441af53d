//! Batch-assembly and distribution pipeline.
//!
//! Decouples producers of high-frequency discrete events from consumers that
//! prefer aggregates: items are submitted one at a time, grouped into bounded
//! batches under a count/time policy, and fanned out through a fixed-size
//! worker pool to a pull-based supply hand-off.
//!
//! ```text
//! ┌──────────┐    ┌─────────────┐    ┌──────────────┐    ┌─────────┐
//! │ submit() │───▶│  Assembler  │───▶│ Worker pool  │───▶│ Supply  │
//! │ (tagged) │    │ count/time  │    │   (N tasks)  │    │ (pull)  │
//! └──────────┘    └─────────────┘    └──────────────┘    └─────────┘
//!                       │                   │
//!                  ingest queue        routing queue
//! ```
//!
//! All stages communicate through bounded queues; backpressure is a bounded
//! await on `submit`, never silent drop. Graceful shutdown drains the
//! assembler's partial window before stopping the stages, so no item is lost
//! once `submit` has returned.
//!
//! # Usage
//!
//! ```no_run
//! use batchpipe::{Pipeline, PipelineConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::new()
//!         .with_max_items(100)
//!         .with_max_wait(Duration::from_secs(5));
//!     let pipeline: Pipeline<String> = Pipeline::new(config)?;
//!     pipeline.start()?;
//!
//!     pipeline.submit("event".to_string()).await?;
//!
//!     let batch = pipeline.request_supply().await?;
//!     for item in batch.items() {
//!         println!("{}: {}", item.id, item.payload);
//!     }
//!
//!     pipeline.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! Graceful-shutdown integration: wire your process-signal handling (e.g.
//! `tokio::signal::ctrl_c`) to `Pipeline::close`; the library itself never
//! installs signal handlers or exits the process.

pub mod config;
pub mod error;
pub mod observe;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use observe::{NoopObserver, Observer, ObserverHandle, TracingObserver};
pub use pipeline::{
    Batch, CountingSemaphore, FlushReason, Metrics, MetricsSnapshot, Pipeline, PipelineState,
    TaggedItem,
};
