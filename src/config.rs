//! Application Configuration
//!
//! Hierarchical configuration loading from:
//! - sacks.toml (default configuration)
//! - sacks.local.toml (git-ignored local overrides)
//! - Environment variables (SACKS_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # sacks.toml
//! config_dir = "/etc/sacks/supplier-formats"
//!
//! [logging]
//! level = "info"
//! format = "text"
//!
//! [processing]
//! supported_extensions = ["xlsx", "xls", "csv"]
//! max_parallel_files = 4
//!
//! [store]
//! path = "/var/lib/sacks/catalog.json"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! SACKS_CONFIG_DIR=/custom/path
//! SACKS_LOGGING__LEVEL=debug
//! ```

use crate::error::ProcessingError;
use crate::formats::MAIN_DOCUMENT;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How many directory levels above the executable the default discovery
/// climbs looking for the main supplier-formats document.
const DISCOVERY_DEPTH: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Directory holding supplier-formats.json and the per-supplier
    /// documents. Falls back to discovery near the executable.
    #[serde(default)]
    pub config_dir: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// Catalog store selection for the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Path of the JSON catalog file. When unset, runs use a transient
    /// in-memory catalog.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Extension allow-list (lower-case, without dot)
    #[serde(default = "default_extensions")]
    pub supported_extensions: Vec<String>,

    /// Upper bound on files processed concurrently
    #[serde(default = "default_parallel_files")]
    pub max_parallel_files: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["xlsx".to_string(), "xls".to_string(), "csv".to_string()]
}

fn default_parallel_files() -> usize {
    4
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        ProcessingConfig {
            supported_extensions: default_extensions(),
            max_parallel_files: default_parallel_files(),
        }
    }
}

impl AppConfig {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. sacks.toml (base configuration)
    /// 2. sacks.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (SACKS_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("sacks.toml"))
            .merge(Toml::file("sacks.local.toml"))
            .merge(Env::prefixed("SACKS_").split("__"))
            .extract()
    }

    /// Resolve the supplier-formats directory: explicit setting first
    /// (which covers `SACKS_CONFIG_DIR`), then discovery by climbing from
    /// the executable.
    pub fn resolve_config_dir(&self) -> Result<PathBuf, ProcessingError> {
        if let Some(dir) = &self.config_dir {
            return Ok(dir.clone());
        }
        discover_config_dir().ok_or_else(|| ProcessingError::Config {
            file: MAIN_DOCUMENT.to_string(),
            message: format!(
                "no configuration directory: set SACKS_CONFIG_DIR or place {MAIN_DOCUMENT} near the binary"
            ),
        })
    }
}

fn discover_config_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let mut dir = exe.parent()?.to_path_buf();
    for _ in 0..=DISCOVERY_DEPTH {
        if dir.join(MAIN_DOCUMENT).is_file() {
            return Some(dir);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert_eq!(
            config.processing.supported_extensions,
            vec!["xlsx", "xls", "csv"]
        );
        assert_eq!(config.processing.max_parallel_files, 4);
        assert!(config.config_dir.is_none());
    }

    #[test]
    fn config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[logging]"));
        assert!(toml_str.contains("[processing]"));
    }

    #[test]
    fn explicit_dir_wins_over_discovery() {
        let config = AppConfig {
            config_dir: Some(PathBuf::from("/explicit")),
            ..AppConfig::default()
        };
        assert_eq!(
            config.resolve_config_dir().unwrap(),
            PathBuf::from("/explicit")
        );
    }
}
