// Configuration File Support
//
// TOML configuration for quota-guard with environment variable overrides.
// Configuration files are loaded from the XDG config directory:
// ~/.config/quota-guard/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LoggingConfig;
use crate::rate_limit::RateLimitConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Quota and pacing configuration
    pub rate_limit: RateLimitConfig,

    /// Quota store configuration
    pub store: StoreConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Which quota store backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    File,
}

/// Quota store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend type (memory, file)
    pub backend: StoreBackend,

    /// JSON file path for the file backend
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "quota-guard", "quota-guard") {
        proj_dirs.data_dir().join("quotas.json")
    } else {
        PathBuf::from("quotas.json")
    }
}

/// Metrics server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Port `serve-metrics` listens on when none is given
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { port: 9090 }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// If the config file does not exist, returns default configuration
    /// (with environment overrides applied).
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the resulting configuration is invalid.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/quota-guard/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "quota-guard", "quota-guard") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            // Fallback if XDG dirs cannot be determined
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config").join("quota-guard").join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - QUOTA_GUARD_LOG_LEVEL, QUOTA_GUARD_LOG_FORMAT
    /// - QUOTA_GUARD_STORE_BACKEND, QUOTA_GUARD_STORE_PATH
    /// - QUOTA_GUARD_METRICS_PORT
    /// - QUOTA_GUARD_DEFAULT_STRATEGY, QUOTA_GUARD_DEFAULT_QUOTA_LIMIT,
    ///   QUOTA_GUARD_RESET_INTERVAL_SECS, QUOTA_GUARD_PACING_ENABLED,
    ///   QUOTA_GUARD_REQUEST_TIMEOUT_SECS
    fn apply_env_overrides(mut self) -> Self {
        self.logging = self.logging.with_env_overrides();
        self.rate_limit = self.rate_limit.with_env_overrides();

        if let Ok(backend) = std::env::var("QUOTA_GUARD_STORE_BACKEND") {
            match backend.to_lowercase().as_str() {
                "memory" => self.store.backend = StoreBackend::Memory,
                "file" => self.store.backend = StoreBackend::File,
                other => tracing::warn!("Ignoring unknown store backend: {}", other),
            }
        }
        if let Ok(path) = std::env::var("QUOTA_GUARD_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }

        if let Ok(port) = std::env::var("QUOTA_GUARD_METRICS_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.metrics.port = port;
            }
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.rate_limit.validate()?;

        if self.store.backend == StoreBackend::File && self.store.path.as_os_str().is_empty() {
            anyhow::bail!("File store backend requires a path");
        }

        if self.metrics.port == 0 {
            anyhow::bail!("Metrics port must be > 0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::Strategy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, crate::logging::LogLevel::Info);
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.metrics.port, 9090);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load_from_path("/nonexistent/quota-guard.toml").unwrap();
        assert_eq!(config.metrics.port, MetricsConfig::default().port);
    }

    #[test]
    fn test_load_from_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[logging]
level = "debug"
format = "json"

[rate_limit]
default_strategy = "conservative"
pacing_enabled = false

[rate_limit.platforms.google_ads]
quota_limit = 500
reset_interval_secs = 60

[store]
backend = "memory"

[metrics]
port = 9100
"#
        )
        .unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert_eq!(config.logging.level, crate::logging::LogLevel::Debug);
        assert_eq!(config.rate_limit.default_strategy, Strategy::Conservative);
        assert!(!config.rate_limit.pacing_enabled);
        assert_eq!(config.rate_limit.quota_for("google_ads").quota_limit, 500);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.metrics.port, 9100);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[rate_limit\nbroken").unwrap();
        assert!(Config::load_from_path(file.path()).is_err());
    }

    #[test]
    fn test_validation_rejects_zero_metrics_port() {
        let mut config = Config::default();
        config.metrics.port = 0;
        assert!(config.validate().is_err());
    }
}
