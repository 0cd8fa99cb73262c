//! Configuration structures for the frequency monitor.
//!
//! Supports TOML deserialization with defaults matching the reference
//! deployment (8 ms debounce, 1000-sample history, pigpio on GPIO 17/27,
//! websocket publishing on port 8765).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level monitor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Measurement engine settings.
    pub engine: EngineConfig,

    /// Edge source settings.
    pub source: SourceConfig,

    /// Real-time settings for the edge thread.
    pub realtime: RealtimeConfig,

    /// Publisher settings.
    pub publish: PublishConfig,
}

/// Frequency estimation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Edge count over the span of the history buffer, drift corrected.
    #[default]
    Span,
    /// Moving sum of per-second edge counts over a fixed window.
    CountWindow,
}

/// Measurement engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum spacing between accepted measured edges, in microseconds.
    pub debounce_us: u32,

    /// Capacity of the measured-edge history.
    pub history_capacity: usize,

    /// Estimation algorithm.
    pub algorithm: Algorithm,

    /// Number of reference intervals averaged by [`Algorithm::CountWindow`].
    pub count_window: usize,

    /// Measured edges per signal period (2.0: one edge per half cycle).
    pub edges_per_cycle: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_us: 8_000,
            history_capacity: 1_000,
            algorithm: Algorithm::Span,
            count_window: 10,
            edges_per_cycle: 2.0,
        }
    }
}

/// Supported edge source drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceDriver {
    /// pigpio daemon over its socket interface.
    #[default]
    Pigpio,
    /// Synthetic edges for testing and demos.
    Simulated,
}

/// GPIO pull resistor setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Pull {
    /// No pull resistor.
    Off,
    /// Pull down to ground.
    Down,
    /// Pull up to supply.
    #[default]
    Up,
}

/// Edge source configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source driver type.
    pub driver: SourceDriver,

    /// pigpio-specific configuration.
    pub pigpio: PigpioConfig,

    /// Simulator configuration.
    pub simulated: SimulatedConfig,
}

/// pigpio daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PigpioConfig {
    /// Daemon address (host:port).
    pub address: String,

    /// Broadcom GPIO number of the 1 Hz reference input.
    pub reference_gpio: u8,

    /// Broadcom GPIO number of the measured input.
    pub measured_gpio: u8,

    /// Pull resistor applied to both inputs.
    pub pull: Pull,

    /// Connection timeout.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for PigpioConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:8888"),
            reference_gpio: 17,
            measured_gpio: 27,
            pull: Pull::Up,
            connect_timeout: Duration::from_secs(2),
        }
    }
}

/// Simulated source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Frequency of the simulated signal in Hz.
    pub signal_hz: f64,

    /// Reference clock error in parts per million (positive = slow).
    pub reference_drift_ppm: f64,

    /// Measured edges generated per signal period.
    pub edges_per_cycle: f64,

    /// Emit a bounce edge 1 ms after every Nth measured edge (0 = never).
    pub bounce_every: u32,

    /// Initial tick value, useful for exercising counter wraparound.
    pub start_tick: u32,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            signal_hz: 50.0,
            reference_drift_ppm: 0.0,
            edges_per_cycle: 2.0,
            bounce_every: 0,
            start_tick: 0,
        }
    }
}

/// Real-time scheduling configuration for the edge thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Enable real-time scheduling (requires privileges).
    pub enabled: bool,

    /// SCHED_FIFO priority (1-99).
    pub priority: u8,

    /// CPU affinity for the edge thread.
    pub cpu_affinity: CpuAffinity,

    /// Lock all memory pages (mlockall).
    pub lock_memory: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            priority: 80,
            cpu_affinity: CpuAffinity::None,
            lock_memory: false,
        }
    }
}

/// CPU affinity specification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CpuAffinity {
    /// No affinity set (OS chooses).
    #[default]
    None,
    /// Pin to a single CPU core.
    Single(usize),
    /// Pin to a set of CPU cores.
    Set(Vec<usize>),
}

impl Serialize for CpuAffinity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            CpuAffinity::None => serializer.serialize_none(),
            CpuAffinity::Single(cpu) => serializer.serialize_u64(*cpu as u64),
            CpuAffinity::Set(cpus) => cpus.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CpuAffinity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct CpuAffinityVisitor;

        impl<'de> Visitor<'de> for CpuAffinityVisitor {
            type Value = CpuAffinity;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("null, an integer, or an array of integers")
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(CpuAffinity::None)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(CpuAffinity::None)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(CpuAffinity::Single(value as usize))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value < 0 {
                    return Err(de::Error::custom("CPU index cannot be negative"));
                }
                Ok(CpuAffinity::Single(value as usize))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut cpus = Vec::new();
                while let Some(cpu) = seq.next_element::<usize>()? {
                    cpus.push(cpu);
                }
                Ok(CpuAffinity::Set(cpus))
            }
        }

        deserializer.deserialize_any(CpuAffinityVisitor)
    }
}

/// Publisher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Address the HTTP/WebSocket server binds to.
    pub bind_addr: SocketAddr,

    /// Cadence of the periodic websocket push.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Decimal places of the published frequency.
    pub precision: u32,

    /// Enable permissive CORS headers.
    pub enable_cors: bool,

    /// Capacity of the per-estimate broadcast channel.
    pub channel_capacity: usize,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8765)),
            interval: Duration::from_secs(1),
            precision: 2,
            enable_cors: true,
            channel_capacity: 64,
        }
    }
}

impl MonitorConfig {
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

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        if engine.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "engine.history_capacity must be at least 1".into(),
            ));
        }
        if engine.history_capacity < 2 {
            tracing::warn!(
                capacity = engine.history_capacity,
                "History capacity below 2, the span algorithm will never produce an estimate"
            );
        }
        if engine.count_window == 0 {
            return Err(ConfigError::Invalid(
                "engine.count_window must be at least 1".into(),
            ));
        }
        if !(engine.edges_per_cycle.is_finite() && engine.edges_per_cycle > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "engine.edges_per_cycle must be positive, got {}",
                engine.edges_per_cycle
            )));
        }
        if self.publish.precision > 9 {
            return Err(ConfigError::Invalid(format!(
                "publish.precision must be at most 9, got {}",
                self.publish.precision
            )));
        }
        if self.publish.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "publish.interval must be non-zero".into(),
            ));
        }
        if self.publish.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "publish.channel_capacity must be at least 1".into(),
            ));
        }
        let pigpio = &self.source.pigpio;
        if pigpio.reference_gpio == pigpio.measured_gpio {
            return Err(ConfigError::Invalid(format!(
                "reference and measured inputs share GPIO {}",
                pigpio.reference_gpio
            )));
        }
        if pigpio.reference_gpio > 31 || pigpio.measured_gpio > 31 {
            return Err(ConfigError::Invalid(
                "only bank 1 GPIOs (0-31) can be monitored".into(),
            ));
        }
        let sim = &self.source.simulated;
        if !(sim.signal_hz.is_finite() && sim.signal_hz > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "source.simulated.signal_hz must be positive, got {}",
                sim.signal_hz
            )));
        }
        if !(sim.edges_per_cycle.is_finite() && sim.edges_per_cycle > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "source.simulated.edges_per_cycle must be positive, got {}",
                sim.edges_per_cycle
            )));
        }
        if sim.reference_drift_ppm <= -1_000_000.0 {
            return Err(ConfigError::Invalid(
                "source.simulated.reference_drift_ppm must be above -1e6".into(),
            ));
        }
        Ok(())
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

    /// A value is out of its allowed range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
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
