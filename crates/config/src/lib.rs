//! Tracepipe Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! Minimal config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use tracepipe_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[pipeline]\nqueue_path = \"data/queue\"").unwrap();
//! ```
//!
//! # Example Minimal Config
//!
//! ```toml
//! [pipeline]
//! queue_path = "/var/lib/tracepipe/queue"
//!
//! [sink.file]
//! path = "logs/events.bin"
//! ```

mod error;
mod logging;
mod pipeline;
mod sinks;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use pipeline::{PipelineConfig, QueueMode};
pub use sinks::{FileSinkConfig, SinkConfig, StdoutSinkConfig};

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Delivery pipeline settings (batch size, flush delay, queue storage)
    pub pipeline: PipelineConfig,

    /// Internal logging behavior
    pub logging: LogConfig,

    /// The sink this agent delivers to
    pub sink: SinkConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        contents.parse()
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.sink.validate()?;
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
