//! Pipeline configuration
//!
//! The surface the delivery core consumes: batch size, maximum write delay,
//! and where the durable queue keeps its log.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Which queue backing the pipeline runs on
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    /// On-disk write-ahead log; survives crashes, replays undelivered batches
    #[default]
    Durable,
    /// In-memory only; for sinks that are themselves the durable store
    Volatile,
}

/// Delivery pipeline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Records per batch before the count trigger seals it
    pub batch_size: u64,

    /// Maximum milliseconds a partial batch may wait before flushing
    pub max_write_delay_ms: u64,

    /// Queue backing
    pub queue_mode: QueueMode,

    /// Directory for the durable queue's log (durable mode only)
    pub queue_path: Option<PathBuf>,

    /// Deliver a non-empty partial batch on graceful shutdown
    pub flush_on_shutdown: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_write_delay_ms: 400,
            queue_mode: QueueMode::Durable,
            queue_path: None,
            flush_on_shutdown: true,
        }
    }
}

impl PipelineConfig {
    /// Maximum write delay as a `Duration`
    pub fn max_write_delay(&self) -> Duration {
        Duration::from_millis(self.max_write_delay_ms)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("pipeline.batch_size must be positive"));
        }
        if self.max_write_delay_ms == 0 {
            return Err(ConfigError::invalid(
                "pipeline.max_write_delay_ms must be positive",
            ));
        }
        if self.queue_mode == QueueMode::Durable && self.queue_path.is_none() {
            return Err(ConfigError::invalid(
                "pipeline.queue_path is required when queue_mode is \"durable\"",
            ));
        }
        Ok(())
    }
}
