//! Configuration loading and types

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use molfleet_client::http::DEFAULT_API_PREFIX;
use molfleet_core::RolloutConfig;

/// Top-level configuration for the molfleet CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator connection settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Confirmation and reload timing
    #[serde(default)]
    pub rollout: RolloutConfig,
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

/// Coordinator connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the coordinator node
    #[serde(default = "default_url")]
    pub url: String,
    /// Path prefix of the API
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_prefix: default_api_prefix(),
        }
    }
}

fn default_url() -> String {
    "http://127.0.0.1:8888".to_string()
}

fn default_api_prefix() -> String {
    DEFAULT_API_PREFIX.to_string()
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("failed to read {}: {e}", path.display()))?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> eyre::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load from an explicit path, the default paths, or use defaults
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be parsed
    pub fn resolve(explicit: Option<&Path>) -> eyre::Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(path) = std::env::var("MOLFLEET_CONFIG") {
            return Self::load(Path::new(&path));
        }

        let paths = [
            Some(PathBuf::from("molfleet.toml")),
            Some(PathBuf::from("/etc/molfleet/molfleet.toml")),
            dirs::config_dir().map(|p| p.join("molfleet/molfleet.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading config");
                return Self::load(&path);
            }
        }

        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.server.url, "http://127.0.0.1:8888");
        assert_eq!(config.server.api_prefix, "/api/v1");
        assert_eq!(config.rollout, RolloutConfig::default());
        assert!(!config.log.json);
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [server]
            url = "http://192.168.0.10:8888"

            [rollout]
            initial_delay_ms = 8000
            max_attempts = 6

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.url, "http://192.168.0.10:8888");
        assert_eq!(config.server.api_prefix, "/api/v1");
        assert_eq!(config.rollout.initial_delay_ms, 8000);
        assert_eq!(config.rollout.retry_delay_ms, 3000);
        assert_eq!(config.rollout.max_attempts, 6);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        assert!(Config::resolve(Some(Path::new("/nonexistent/molfleet.toml"))).is_err());
    }
}
