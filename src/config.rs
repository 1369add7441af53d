//! Configuration for the batch pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Resolved configuration for a pipeline instance.
///
/// All fields have documented defaults, so a zero-config pipeline is
/// `PipelineConfig::default()`. Construction-time validation lives in
/// [`PipelineConfig::validate`]; `Pipeline::new` calls it before anything
/// starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum items per batch; a window flushes the instant it reaches this.
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Maximum wait from the first item of a window to its flush, in
    /// milliseconds.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Number of concurrent workers draining completed batches.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Capacity of the bounded ingestion queue between `submit` callers and
    /// the assembler. Sized to the expected burst; a full queue means bounded
    /// delay on `submit`, never a drop.
    #[serde(default = "default_ingest_buffer")]
    pub ingest_buffer: usize,

    /// Capacity of the routing queue holding completed batches awaiting a
    /// worker.
    #[serde(default = "default_flush_buffer")]
    pub flush_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            max_wait_ms: default_max_wait_ms(),
            worker_pool_size: default_worker_pool_size(),
            ingest_buffer: default_ingest_buffer(),
            flush_buffer: default_flush_buffer(),
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum items per batch.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    /// Set the maximum wait from a window's first item to its flush.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait_ms = max_wait.as_millis() as u64;
        self
    }

    /// Set the worker pool size.
    pub fn with_worker_pool_size(mut self, workers: usize) -> Self {
        self.worker_pool_size = workers;
        self
    }

    /// Set the ingestion queue capacity.
    pub fn with_ingest_buffer(mut self, capacity: usize) -> Self {
        self.ingest_buffer = capacity;
        self
    }

    /// Set the routing queue capacity.
    pub fn with_flush_buffer(mut self, capacity: usize) -> Self {
        self.flush_buffer = capacity;
        self
    }

    /// The maximum wait as a [`Duration`].
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: PipelineConfig = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => {
                // YAML is a superset of JSON
                serde_yaml::from_str(&contents)?
            }
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_items == 0 {
            return Err("max_items must be > 0".to_string());
        }
        if self.max_wait_ms == 0 {
            return Err("max_wait must be > 0".to_string());
        }
        if self.worker_pool_size == 0 {
            return Err("worker_pool_size must be > 0".to_string());
        }
        if self.ingest_buffer == 0 {
            return Err("ingest_buffer must be > 0".to_string());
        }
        if self.flush_buffer == 0 {
            return Err("flush_buffer must be > 0".to_string());
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_max_items() -> usize {
    100
}
fn default_max_wait_ms() -> u64 {
    30_000
}
fn default_worker_pool_size() -> usize {
    10
}
fn default_ingest_buffer() -> usize {
    64
}
fn default_flush_buffer() -> usize {
    16
}
