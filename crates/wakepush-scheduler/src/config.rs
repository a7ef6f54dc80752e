//! Configuration types for the scheduler.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{Result, SchedulerError};
use crate::slot::{KeySpace, CLUSTER_SLOT_COUNT};

const ENV_PREFIX: &str = "WAKEPUSH_";

/// Scheduler configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    /// Valkey configuration.
    pub valkey: ValkeyConfig,
    /// Scheduling configuration.
    pub schedule: ScheduleConfig,
    /// Sweep configuration.
    pub sweep: SweepConfig,
}

impl WakeConfig {
    /// Load configuration from the default sources.
    ///
    /// Sources, later overriding earlier:
    /// 1. Default values
    /// 2. `wakepush.toml` in the current directory (if present)
    /// 3. Environment variables with `WAKEPUSH_` prefix, nested with `__`
    pub fn load() -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file("wakepush.toml"))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Load configuration from a specific TOML file, then the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_figment(Figment::new().merge(Toml::string(content)))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| SchedulerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        self.schedule.key_space()?;
        if self.sweep.batch_limit == 0 {
            return Err(SchedulerError::Config(
                "sweep.batch_limit must be greater than zero".to_owned(),
            ));
        }
        if self.sweep.workers == 0 {
            return Err(SchedulerError::Config(
                "sweep.workers must be greater than zero".to_owned(),
            ));
        }
        if self.sweep.tick_interval.is_zero() {
            return Err(SchedulerError::Config(
                "sweep.tick_interval_ms must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Valkey configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValkeyConfig {
    /// Connection URL for a standalone instance.
    pub url: String,
    /// Seed node URLs. When non-empty the store connects in cluster mode and
    /// `url` is ignored.
    pub cluster_urls: Vec<String>,
    /// Prefix for every key the scheduler writes.
    pub key_prefix: String,
    /// Maximum pool connections.
    pub max_connections: usize,
}

impl Default for ValkeyConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_owned(),
            cluster_urls: Vec::new(),
            key_prefix: "wakepush".to_owned(),
            max_connections: 10,
        }
    }
}

/// Scheduling configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Number of slots in the key space.
    pub slot_count: u16,
    /// Delay between scheduling and the first wake-up.
    #[serde(rename = "initial_delay_ms", with = "serde_duration_millis")]
    pub initial_delay: Duration,
    /// Delay before the next wake-up after a successful delivery.
    #[serde(rename = "recur_interval_ms", with = "serde_duration_millis")]
    pub recur_interval: Duration,
    /// Devices not seen for this long are dropped instead of woken.
    #[serde(rename = "stale_device_threshold_ms", with = "serde_duration_millis")]
    pub stale_device_threshold: Duration,
}

impl ScheduleConfig {
    /// Key space described by `slot_count`.
    pub fn key_space(&self) -> Result<KeySpace> {
        KeySpace::new(self.slot_count)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slot_count: CLUSTER_SLOT_COUNT,
            initial_delay: Duration::from_secs(30),
            recur_interval: Duration::from_secs(60),
            stale_device_threshold: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Sweep configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Maximum entries popped per slot visit.
    pub batch_limit: usize,
    /// Time between slot visits, per sweeper.
    #[serde(rename = "tick_interval_ms", with = "serde_duration_millis")]
    pub tick_interval: Duration,
    /// Number of sweepers in this process.
    pub workers: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            batch_limit: 100,
            tick_interval: Duration::from_millis(10),
            workers: 1,
        }
    }
}

/// Serde helper for Duration as milliseconds.
mod serde_duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
