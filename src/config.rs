//! Configuration management
//!
//! Runtime settings are loaded from a TOML file: HTTP timeouts, the
//! detection budget, the catalog location, and logging. Every field has a
//! default so a missing file just means defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Detection budget and catalog location
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Request timeout in seconds for authenticated fetches
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Timeout in seconds for opportunistic pre-filter probes
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    /// Maximum authentication attempts per detection call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wall-clock budget in seconds per detection call
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_secs: u64,

    /// Directory holding index.json and the profile descriptor files
    #[serde(default = "default_catalog_dir")]
    pub catalog_dir: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_elapsed_secs: default_max_elapsed(),
            catalog_dir: default_catalog_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_probe_timeout() -> u64 {
    3
}

fn default_max_attempts() -> u32 {
    10
}

fn default_max_elapsed() -> u64 {
    60
}

fn default_catalog_dir() -> String {
    "profiles".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the first file found, or defaults if none
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        let mut config_paths = Vec::new();
        if let Some(path) = explicit {
            config_paths.push(PathBuf::from(path));
        }
        config_paths.push(PathBuf::from("config.toml"));
        config_paths.push(PathBuf::from("/etc/modemprobe/config.toml"));
        if let Some(home) = dirs::home_dir() {
            config_paths.push(home.join(".config/modemprobe/config.toml"));
        }

        for path in &config_paths {
            if path.exists() {
                tracing::debug!("Loading config from: {}", path.display());
                let contents = std::fs::read_to_string(path)
                    .context("Failed to read config file")?;

                let config: Config = toml::from_str(&contents)
                    .context("Failed to parse config file")?;

                return Ok(config);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_detection_budget() {
        let config = Config::default();
        assert_eq!(config.detection.max_attempts, 10);
        assert_eq!(config.detection.max_elapsed_secs, 60);
        assert_eq!(config.http.probe_timeout, 3);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [detection]
            max_attempts = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.detection.max_attempts, 4);
        assert_eq!(config.detection.max_elapsed_secs, 60);
        assert_eq!(config.http.timeout, 10);
        assert_eq!(config.logging.level, "info");
    }
}
