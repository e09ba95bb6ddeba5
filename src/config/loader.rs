//! Configuration Loader
//!
//! Environment-aware configuration loading. Layers an optional base file, an
//! optional per-environment file and `BATCH_KERNEL_*` environment variables
//! over the compiled-in defaults.

use super::error::{ConfigResult, ConfigurationError};
use super::KernelConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix for environment variable overrides, e.g.
/// `BATCH_KERNEL_MAX_PARTITION_THREADS=4` or `BATCH_KERNEL_WAIT__POLL_INTERVAL_MS=50`
pub const ENV_PREFIX: &str = "BATCH_KERNEL";

/// Loaded configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: KernelConfig,
    environment: String,
    config_directory: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection and no files
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(None, &environment)
    }

    /// Load configuration from a single file plus environment overrides
    pub fn load_from_file(path: &Path) -> ConfigResult<Arc<ConfigManager>> {
        if !path.exists() {
            return Err(ConfigurationError::config_file_not_found(vec![
                path.to_path_buf()
            ]));
        }

        let builder = config::Config::builder()
            .add_source(config::File::from(path.to_path_buf()).required(true))
            .add_source(Self::environment_source());

        let config = Self::finish(builder, &path.display().to_string())?;
        let environment = Self::detect_environment();

        info!(
            environment = %environment,
            file = %path.display(),
            "🔧 CONFIG: Loaded kernel configuration from file"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            config_directory: path.parent().map(Path::to_path_buf),
        }))
    }

    /// Load configuration from a directory with explicit environment
    ///
    /// Reads `base.toml` and `{environment}.toml` from the directory when
    /// present. Useful for testing without modifying global environment
    /// variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let mut builder = config::Config::builder();

        if let Some(dir) = &config_dir {
            if !dir.is_dir() {
                return Err(ConfigurationError::config_file_not_found(vec![dir.clone()]));
            }

            let base = dir.join("base.toml");
            let overrides = dir.join(format!("{environment}.toml"));
            debug!(
                base = %base.display(),
                overrides = %overrides.display(),
                "Loading configuration directory"
            );

            builder = builder
                .add_source(config::File::from(base).required(false))
                .add_source(config::File::from(overrides).required(false));
        }

        let source_name = config_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "defaults".to_string());
        let config = Self::finish(builder.add_source(Self::environment_source()), &source_name)?;

        info!(
            environment = %environment,
            source = %source_name,
            max_partition_threads = config.max_partition_threads,
            "🔧 CONFIG: Loaded kernel configuration"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: config_dir,
        }))
    }

    /// Wrap an already-built configuration
    pub fn from_config(config: KernelConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: None,
        }))
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("BATCH_KERNEL_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> Option<&Path> {
        self.config_directory.as_deref()
    }

    fn environment_source() -> config::Environment {
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        source_name: &str,
    ) -> ConfigResult<KernelConfig> {
        let config: KernelConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigurationError::load_error(source_name, e))?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_directory_is_reported() {
        let result =
            ConfigManager::load_from_directory_with_env(Some(PathBuf::from("/nonexistent/kernel")), "test");
        assert!(matches!(
            result,
            Err(ConfigurationError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_environment_file_overrides_base() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("base.toml"),
            "max_partition_threads = 8\ndefault_item_count = 5\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("test.toml"),
            "max_partition_threads = 2\n[wait]\npoll_interval_ms = 20\n",
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();

        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().max_partition_threads, 2);
        assert_eq!(manager.config().default_item_count, 5);
        assert_eq!(manager.config().wait.poll_interval_ms, 20);
        assert_eq!(manager.config_directory(), Some(dir.path()));
    }

    #[test]
    fn test_empty_directory_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        assert_eq!(manager.config(), &KernelConfig::default());
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("kernel.toml");
        fs::write(&file, "default_item_count = 0\n").unwrap();

        assert!(matches!(
            ConfigManager::load_from_file(&file),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }
}
