//! Configuration structures for the pulse generator.
//!
//! Supports TOML deserialization with defaults matching the classic
//! 100 ms / GPIO 4 square-wave setup; CLI flags override file values.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Nanoseconds per second.
pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Top-level generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    /// Toggle period in nanoseconds.
    pub period_ns: u64,

    /// GPIO pin driven by the generator.
    pub gpio_pin: u32,

    /// Window the report cadence is derived from. The cadence is computed
    /// once at startup from the initial period and is not recomputed when
    /// the period is retuned at runtime.
    #[serde(with = "humantime_serde")]
    pub report_window: Duration,

    /// Delay before the first toggle, letting the system settle.
    #[serde(with = "humantime_serde")]
    pub settle_time: Duration,

    /// Real-time scheduling configuration.
    pub realtime: RealtimeConfig,

    /// Control channel configuration.
    pub control: ControlConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            period_ns: 100_000_000,
            gpio_pin: 4,
            report_window: Duration::from_secs(2),
            settle_time: Duration::from_secs(1),
            realtime: RealtimeConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

impl PulseConfig {
    /// Report cadence in cycles: the report window divided by the initial
    /// period, clamped to at least one cycle.
    #[must_use]
    pub fn report_every(&self) -> u64 {
        if self.period_ns == 0 {
            return 1;
        }
        ((self.report_window.as_nanos() as u64) / self.period_ns).max(1)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Real-time scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Enable real-time scheduling (requires privileges).
    pub enabled: bool,

    /// Scheduler policy: "fifo" or "rr" (round-robin).
    pub policy: SchedPolicy,

    /// Scheduler priority (1-99 for RT policies). Both activities run at
    /// the same priority.
    pub priority: u8,

    /// Lock all memory pages (mlockall).
    pub lock_memory: bool,

    /// Pre-fault stack size in bytes.
    pub prefault_stack_size: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: SchedPolicy::Fifo,
            priority: 99,
            lock_memory: true,
            prefault_stack_size: 1024 * 1024, // 1 MiB
        }
    }
}

/// Scheduler policy for real-time threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    /// SCHED_FIFO: First-in-first-out real-time.
    #[default]
    Fifo,
    /// SCHED_RR: Round-robin real-time.
    Rr,
    /// SCHED_OTHER: Normal time-sharing (non-RT).
    Other,
}

/// Control channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Logical XDDP port the endpoint binds to.
    pub port: i16,

    /// Kernel-side buffer pool in bytes, sized to absorb bursts without
    /// blocking the sender.
    pub pool_size: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            port: 0,
            pool_size: 16 * 1024,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
