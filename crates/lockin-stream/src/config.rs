//! Stream Configuration
//!
//! Every field has a default, so an empty configuration is valid. Values are
//! layered: defaults, then an optional TOML file, then `LOCKIN_*` environment
//! variables (`__` separates nested keys, e.g. `LOCKIN_PACING__MIN_SLEEP_US`).

use crate::rate_limit::RateLimitConfig;
use crate::StreamError;
use config::{Config, Environment, File};
use lockin_hw::FIFO_CAPACITY_SAMPLES;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default ring capacity: 4 MiB of 32-byte samples
pub const DEFAULT_RING_CAPACITY: usize = 131_072;

/// Default base name of the configuration file (any extension `config` understands)
pub const DEFAULT_CONFIG_NAME: &str = "lockin";

/// Configuration of the streaming device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Ring slots, a power of two
    pub ring_capacity: usize,
    /// Samples the hardware FIFO holds
    pub fifo_capacity: usize,
    /// FIFO fill level (percent) above which the worker warns of imminent loss
    pub fifo_warn_percent: u8,
    /// Weight of history in the moving-average time step
    pub moving_average_factor: u64,
    /// Adaptive sleep bounds
    pub pacing: PacingConfig,
    /// Worker thread scheduling
    pub realtime: RealtimeConfig,
    /// Time to let the converters settle after power-up
    pub resume_settle_ms: u64,
    /// Name of the acquisition thread
    pub thread_name: String,
    /// Throttle for warnings raised on the acquisition thread
    pub warn_limit: RateLimitConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            fifo_capacity: FIFO_CAPACITY_SAMPLES,
            fifo_warn_percent: 75,
            moving_average_factor: 20,
            pacing: PacingConfig::default(),
            realtime: RealtimeConfig::default(),
            resume_settle_ms: 10,
            thread_name: "lockin0".to_string(),
            warn_limit: RateLimitConfig::default(),
        }
    }
}

/// Bounds of the acquisition thread's sleep between drains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Shortest sleep ever requested
    pub min_sleep_us: u64,
    /// Floor of the upper sleep bound
    pub min_sleep_ceiling_us: u64,
    /// Width of the sleep window below the upper bound
    pub slack_us: u64,
    /// Sleep used when the target cannot be computed
    pub fallback_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_sleep_us: 2_000,
            min_sleep_ceiling_us: 3_000,
            slack_us: 10_000,
            fallback_ms: 250,
        }
    }
}

impl PacingConfig {
    pub fn min_sleep(&self) -> Duration {
        Duration::from_micros(self.min_sleep_us)
    }

    pub fn min_sleep_ceiling(&self) -> Duration {
        Duration::from_micros(self.min_sleep_ceiling_us)
    }

    pub fn slack(&self) -> Duration {
        Duration::from_micros(self.slack_us)
    }

    pub fn fallback(&self) -> Duration {
        Duration::from_millis(self.fallback_ms)
    }
}

/// Scheduling class of the acquisition thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Request `SCHED_FIFO` at all
    pub enabled: bool,
    /// `SCHED_FIFO` priority (1..=99)
    pub priority: i32,
    /// Nice value applied after the scheduler change
    pub nice: i32,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 99,
            nice: -20,
        }
    }
}

impl StreamConfig {
    /// Load from `path` (required) or from `lockin.*` in the working directory
    /// (optional), then apply `LOCKIN_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, StreamError> {
        Self::load_with_env(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix("LOCKIN")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, StreamError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        let config: StreamConfig = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the streaming loop cannot work with
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.ring_capacity < 2 || !self.ring_capacity.is_power_of_two() {
            return Err(StreamError::Config(format!(
                "ring_capacity must be a power of two greater than one (got {})",
                self.ring_capacity
            )));
        }
        if self.fifo_capacity == 0 {
            return Err(StreamError::Config("fifo_capacity must be positive".into()));
        }
        if self.fifo_warn_percent == 0 || self.fifo_warn_percent > 100 {
            return Err(StreamError::Config(format!(
                "fifo_warn_percent must be in 1..=100 (got {})",
                self.fifo_warn_percent
            )));
        }
        if self.moving_average_factor == 0 {
            return Err(StreamError::Config(
                "moving_average_factor must be positive".into(),
            ));
        }
        if self.pacing.min_sleep_us > self.pacing.min_sleep_ceiling_us {
            return Err(StreamError::Config(format!(
                "pacing.min_sleep_us ({}) exceeds pacing.min_sleep_ceiling_us ({})",
                self.pacing.min_sleep_us, self.pacing.min_sleep_ceiling_us
            )));
        }
        if self.realtime.enabled && !(1..=99).contains(&self.realtime.priority) {
            return Err(StreamError::Config(format!(
                "realtime.priority must be in 1..=99 (got {})",
                self.realtime.priority
            )));
        }
        if self.thread_name.is_empty() {
            return Err(StreamError::Config("thread_name must not be empty".into()));
        }
        Ok(())
    }

    /// FIFO fill level (in samples) above which the worker warns
    pub fn fifo_warn_threshold(&self) -> usize {
        self.fifo_capacity * usize::from(self.fifo_warn_percent) / 100
    }

    pub fn resume_settle(&self) -> Duration {
        Duration::from_millis(self.resume_settle_ms)
    }
}
