//! # Kernel Configuration
//!
//! Tunables for the execution kernel: partition thread cap, chunk defaults,
//! transaction timeout, event channel capacity and the polling interval used
//! by `wait_for`.
//!
//! Every field has a default, so an empty configuration is valid. Values are
//! layered by [`ConfigManager`]: defaults, then `base.toml`, then
//! `{environment}.toml`, then `BATCH_KERNEL_*` environment variables.
//!
//! ```rust,no_run
//! use batch_kernel::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_directory_with_env(
//!     Some("config".into()),
//!     "production",
//! )?;
//! println!("{}", manager.config().max_partition_threads);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    /// Upper bound on concurrently executing partitions of a single step
    pub max_partition_threads: usize,

    /// Item count used by chunk steps that do not declare one
    pub default_item_count: u32,

    pub transaction: TransactionConfig,

    pub events: EventsConfig,

    pub wait: WaitConfig,
}

/// Transaction boundary settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TransactionConfig {
    /// Timeout applied to each chunk transaction unless the checkpoint
    /// algorithm supplies its own
    pub default_timeout_seconds: u64,
}

/// Lifecycle event channel settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

/// Completion waiting settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WaitConfig {
    /// Interval at which waiters re-check the repository for a terminal status
    pub poll_interval_ms: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_partition_threads: defaults::MAX_PARTITION_THREADS,
            default_item_count: defaults::ITEM_COUNT,
            transaction: TransactionConfig::default(),
            events: EventsConfig::default(),
            wait: WaitConfig::default(),
        }
    }
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            default_timeout_seconds: defaults::TRANSACTION_TIMEOUT_SECONDS,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::WAIT_POLL_INTERVAL_MS,
        }
    }
}

impl KernelConfig {
    /// Reject values the kernel cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_partition_threads == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_partition_threads",
                self.max_partition_threads,
                "must be greater than zero",
            ));
        }
        if self.default_item_count == 0 {
            return Err(ConfigurationError::invalid_value(
                "default_item_count",
                self.default_item_count,
                "must be greater than zero",
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                self.events.channel_capacity,
                "must be greater than zero",
            ));
        }
        if self.wait.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "wait.poll_interval_ms",
                self.wait.poll_interval_ms,
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_secs(self.transaction.default_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_item_count, 10);
        assert_eq!(config.transaction_timeout(), Duration::from_secs(180));
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_thread_cap_rejected() {
        let config = KernelConfig {
            max_partition_threads: 0,
            ..KernelConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: KernelConfig =
            serde_json::from_str(r#"{"wait": {"poll_interval_ms": 25}}"#).unwrap();
        assert_eq!(config.wait.poll_interval_ms, 25);
        assert_eq!(config.max_partition_threads, defaults::MAX_PARTITION_THREADS);
    }
}
