//! Pipeline error types.

use thiserror::Error;

/// Errors surfaced by the pipeline.
///
/// Configuration errors are reported synchronously at construction. Runtime
/// conditions (`SupplyTimeout`, backpressure) are recoverable; backpressure is
/// expressed as bounded awaiting on `submit`, never as an error variant.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Pipeline already started")]
    AlreadyStarted,

    #[error("Pipeline not started")]
    NotStarted,

    #[error("Pipeline closed")]
    Closed,

    #[error("Pipeline already closed")]
    AlreadyClosed,

    #[error("Supply closed")]
    SupplyClosed,

    #[error("No batch available within the requested timeout")]
    SupplyTimeout,
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
