//! Configuration types for fairdl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Concurrency caps for admission control
///
/// Groups the per-user and global limits on simultaneously active tasks.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum tasks a single user may have in `Downloading`/`Uploading` at
    /// once (default: 2)
    #[serde(default = "default_max_active_per_user")]
    pub max_active_per_user: usize,

    /// Maximum active tasks across all users (default: 5)
    #[serde(default = "default_max_active_global")]
    pub max_active_global: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_active_per_user: default_max_active_per_user(),
            max_active_global: default_max_active_global(),
        }
    }
}

/// Progress reporting behavior
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum interval between emitted progress updates per task
    /// (default: 2s). Samples arriving faster than this are suppressed to
    /// bound notification traffic.
    #[serde(default = "default_min_update_interval")]
    pub min_update_interval: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            min_update_interval: default_min_update_interval(),
        }
    }
}

/// Delivery routing policy for finished downloads
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Largest artifact delivered directly to the chat surface; anything
    /// bigger is routed to the alternate storage collaborator
    /// (default: 2 GiB, the chat platform's upload ceiling)
    #[serde(default = "default_direct_limit_bytes")]
    pub direct_limit_bytes: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            direct_limit_bytes: default_direct_limit_bytes(),
        }
    }
}

/// Main configuration for [`MediaScheduler`](crate::scheduler::MediaScheduler)
///
/// Fields are organized into logical sub-configs:
/// - [`limits`](LimitsConfig) — per-user and global concurrency caps
/// - [`progress`](ProgressConfig) — update throttling
/// - [`delivery`](DeliveryConfig) — direct vs. alternate-storage routing
///
/// All sub-config fields are flattened for serialization, so the JSON/TOML
/// format stays flat (no nesting).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Concurrency caps
    #[serde(flatten)]
    pub limits: LimitsConfig,

    /// Progress reporting behavior
    #[serde(flatten)]
    pub progress: ProgressConfig,

    /// Delivery routing policy
    #[serde(flatten)]
    pub delivery: DeliveryConfig,

    /// Buffer size of the lifecycle event broadcast channel (default: 256)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: LimitsConfig::default(),
            progress: ProgressConfig::default(),
            delivery: DeliveryConfig::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Config {
    /// Validate the configuration, returning the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_active_per_user == 0 {
            return Err(Error::Config {
                message: "max_active_per_user must be at least 1".to_string(),
                key: Some("max_active_per_user".to_string()),
            });
        }
        if self.limits.max_active_global == 0 {
            return Err(Error::Config {
                message: "max_active_global must be at least 1".to_string(),
                key: Some("max_active_global".to_string()),
            });
        }
        if self.limits.max_active_global < self.limits.max_active_per_user {
            return Err(Error::Config {
                message: format!(
                    "max_active_global ({}) must not be below max_active_per_user ({})",
                    self.limits.max_active_global, self.limits.max_active_per_user
                ),
                key: Some("max_active_global".to_string()),
            });
        }
        if self.progress.min_update_interval.is_zero() {
            return Err(Error::Config {
                message: "min_update_interval must be non-zero".to_string(),
                key: Some("min_update_interval".to_string()),
            });
        }
        if self.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be at least 1".to_string(),
                key: Some("event_buffer".to_string()),
            });
        }
        Ok(())
    }
}

fn default_max_active_per_user() -> usize {
    2
}

fn default_max_active_global() -> usize {
    5
}

fn default_min_update_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_direct_limit_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

fn default_event_buffer() -> usize {
    256
}
