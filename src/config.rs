//! Configuration management for Warden.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, WardenError};

/// Prefix for environment overrides, e.g. `WARDEN__CHAT__REQUESTS_PER_MINUTE`.
const ENV_PREFIX: &str = "WARDEN";
const ENV_SEPARATOR: &str = "__";

/// Main configuration for the Warden service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Limiter guarding the chat front door
    #[serde(default)]
    pub chat: LimiterConfig,

    /// Limiter guarding the HTTP API front door
    #[serde(default)]
    pub api: LimiterConfig,

    /// Background eviction settings shared by both limiters
    #[serde(default)]
    pub janitor: JanitorConfig,
}

/// Ceilings for one limiter instance.
///
/// Values are signed so that a non-positive setting reaches the limiter,
/// which substitutes its defaults (or rejects it, with the strict constructor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Admissions allowed within any trailing minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: i64,

    /// Admissions allowed within any trailing hour
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: i64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            requests_per_hour: default_requests_per_hour(),
        }
    }
}

pub(crate) fn default_requests_per_minute() -> i64 {
    10
}

pub(crate) fn default_requests_per_hour() -> i64 {
    100
}

/// Janitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JanitorConfig {
    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Seconds without access after which an identity is evicted
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            stale_after_secs: default_stale_after(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    600
}

fn default_stale_after() -> u64 {
    24 * 60 * 60
}

impl JanitorConfig {
    /// Interval between sweeps, never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl WardenConfig {
    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| WardenError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from an optional YAML file, then apply
    /// `WARDEN__`-prefixed environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}
