//! Configuration management for parsync.
//!
//! Settings come from an optional TOML file, then `PARSYNC_*` environment
//! variables (`PARSYNC_SYNC__JOBS=8`), then command-line options.

use crate::executor::job::{EstimateTuning, LOW_PERCENT_THRESHOLD, TOTAL_TOLERANCE};
use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "PARSYNC";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub rsync: RsyncConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of parallel rsync processes
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Below this byte percentage, file counts are used to estimate a job's size
    #[serde(default = "default_low_percent_threshold")]
    pub low_percent_threshold: f64,

    /// Relative change needed before a job's estimated size is replaced
    #[serde(default = "default_total_tolerance")]
    pub total_tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsyncConfig {
    /// Program to run
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the rsync arguments (e.g. when `program` is a wrapper)
    #[serde(default)]
    pub program_args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_jobs() -> usize {
    6
}

fn default_low_percent_threshold() -> f64 {
    LOW_PERCENT_THRESHOLD
}

fn default_total_tolerance() -> f64 {
    TOTAL_TOLERANCE
}

fn default_program() -> String {
    "rsync".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            low_percent_threshold: default_low_percent_threshold(),
            total_tolerance: default_total_tolerance(),
        }
    }
}

impl Default for RsyncConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            program_args: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config: Config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text, without environment overrides
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.jobs == 0 {
            return Err(SyncError::Config("sync.jobs must be at least 1".to_string()));
        }
        if !(0.0..=100.0).contains(&self.sync.low_percent_threshold) {
            return Err(SyncError::Config(
                "sync.low_percent_threshold must be between 0 and 100".to_string(),
            ));
        }
        if !(self.sync.total_tolerance > 0.0 && self.sync.total_tolerance < 1.0) {
            return Err(SyncError::Config(
                "sync.total_tolerance must be between 0 and 1".to_string(),
            ));
        }
        if self.rsync.program.is_empty() {
            return Err(SyncError::Config("rsync.program must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn estimate_tuning(&self) -> EstimateTuning {
        EstimateTuning {
            low_percent_threshold: self.sync.low_percent_threshold,
            total_tolerance: self.sync.total_tolerance,
        }
    }
}
