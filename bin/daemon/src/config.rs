//! Centralized daemon configuration.
//!
//! This module provides strongly-typed configuration for the daemon,
//! loaded via the `config` crate from environment variables.

use serde::Deserialize;

/// Daemon configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    /// Time-based trigger scanner configuration.
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Execution pipeline configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Scanner-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Interval between scan passes, in seconds.
    #[serde(default = "default_scan_interval_seconds")]
    pub interval_seconds: u64,
}

/// Execution-pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Capacity of the dispatch queue feeding the execution worker.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_scan_interval_seconds() -> u64 {
    300
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_scan_interval_seconds(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl DaemonConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
