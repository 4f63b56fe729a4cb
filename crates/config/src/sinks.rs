//! Sink configuration
//!
//! An agent delivers to exactly one sink. The section is externally tagged:
//!
//! ```toml
//! [sink.file]
//! path = "logs/events.bin"
//! ```

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Which sink the pipeline delivers to
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkConfig {
    /// Human-readable lines on stdout
    Stdout(StdoutSinkConfig),
    /// Length-prefixed binary log file
    File(FileSinkConfig),
    /// Discard everything (throughput testing)
    Null,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::Stdout(StdoutSinkConfig::default())
    }
}

impl SinkConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        if let Self::File(file) = self {
            if file.path.as_os_str().is_empty() {
                return Err(ConfigError::invalid("sink.file.path must not be empty"));
            }
        }
        Ok(())
    }
}

/// Stdout sink settings
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct StdoutSinkConfig {
    /// Print a summary header before each batch
    pub batch_headers: bool,
}

/// File sink settings
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileSinkConfig {
    /// File the sink appends to; parent directories are created on open
    pub path: PathBuf,
}
