//! Tunables for the PurC HVML execution runtime.
//!
//! `RuntimeConfig` carries every magic number the scheduler and instance
//! need as named, documented, overridable fields instead of constants
//! buried in the scheduling loop.

mod error;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use error::{ConfigError, ConfigResult};

/// Top-level runtime configuration, loadable from a TOML file or used as-is
/// via [`RuntimeConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub scheduler: SchedulerConfig,
    pub heap: HeapConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            heap: HeapConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Loads and validates a configuration from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::io(path, e.to_string()))?;
        let config: Self =
            toml::from_str(&text).map_err(|e| ConfigError::parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates field invariants that serde's `Deserialize` can't express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scheduler.time_slice_ms == 0 {
            return Err(ConfigError::invalid("scheduler.time_slice_ms must be > 0"));
        }
        if self.heap.move_buffer_capacity == 0 {
            return Err(ConfigError::invalid(
                "heap.move_buffer_capacity must be > 0",
            ));
        }
        Ok(())
    }
}

/// Timing tunables for the per-instance scheduler loop described in
/// the runtime's scheduling algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How long the scheduler sleeps between ticks when no coroutine is
    /// ready and no event is pending.
    pub tick_sleep_ms: u64,
    /// Minimum gap between two broadcast `idle` events to the same
    /// coroutine set.
    pub idle_event_timeout_ms: u64,
    /// Maximum wall-clock time a single `execute_one_step` pass for one
    /// coroutine may run before the scheduler forces a yield.
    pub time_slice_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_sleep_ms: 10,
            idle_event_timeout_ms: 100,
            time_slice_ms: 5,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_sleep(&self) -> Duration {
        Duration::from_millis(self.tick_sleep_ms)
    }

    pub fn idle_event_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_event_timeout_ms)
    }

    pub fn time_slice(&self) -> Duration {
        Duration::from_millis(self.time_slice_ms)
    }
}

/// Tunables for a single instance's heap: move-buffer sizing and related
/// cross-instance messaging limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeapConfig {
    /// Maximum number of in-flight messages a move-buffer holds before
    /// a cross-instance post returns `MoveBufferFull`.
    pub move_buffer_capacity: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            move_buffer_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.tick_sleep(), Duration::from_millis(10));
        assert_eq!(
            config.scheduler.idle_event_timeout(),
            Duration::from_millis(100)
        );
        assert_eq!(config.scheduler.time_slice(), Duration::from_millis(5));
        assert_eq!(config.heap.move_buffer_capacity, 64);
    }

    #[test]
    fn rejects_zero_time_slice() {
        let mut config = RuntimeConfig::default();
        config.scheduler.time_slice_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = RuntimeConfig::default();
        let text = toml::to_string(&config).expect("serialize");
        let back: RuntimeConfig = toml::from_str(&text).expect("deserialize");
        assert_eq!(config, back);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let text = "[scheduler]\ntick_sleep_ms = 20\n";
        let config: RuntimeConfig = toml::from_str(text).expect("deserialize");
        assert_eq!(config.scheduler.tick_sleep_ms, 20);
        assert_eq!(config.scheduler.time_slice_ms, 5);
        assert_eq!(config.heap.move_buffer_capacity, 64);
    }
}
