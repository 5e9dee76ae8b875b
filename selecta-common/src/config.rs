//! Configuration loading and config file resolution
//!
//! Bootstrap configuration is read from a single TOML file. Resolution order
//! for the file path:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`SELECTA_CONFIG`)
//! 3. OS-dependent default (`<config dir>/selecta/<module>.toml`)
//!
//! A missing file is not an error: defaults are used and the returned
//! `ConfigSource` says so, to be logged once tracing is initialized.
//! A file that exists but cannot be parsed is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SELECTA_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Classifier configuration (optional)
    #[serde(default)]
    pub classifier: ClassifierSettings,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Classifier settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Explicit bundle descriptor to load
    #[serde(default)]
    pub bundle_path: Option<PathBuf>,

    /// Directory scanned for the newest bundle when `bundle_path` is unset
    #[serde(default)]
    pub bundle_dir: Option<PathBuf>,

    /// Batch worker count (unset = derived from CPU count)
    #[serde(default)]
    pub worker_count: Option<usize>,
}

impl TomlConfig {
    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level '{}' (expected one of {})",
                self.logging.level,
                LEVELS.join(", ")
            )));
        }

        if self.classifier.worker_count == Some(0) {
            return Err(Error::Config(
                "classifier.worker_count must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Resolve the configuration file path for a module
///
/// # Arguments
/// * `cli_arg` - Path given on the command line, if any
/// * `module_name` - Module name used for the default file name (`<module>.toml`)
pub fn resolve_config_path(cli_arg: Option<&Path>, module_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: OS-dependent default
    default_config_path(module_name)
}

/// Get the OS-dependent default config file path
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("selecta").join(format!("{}.toml", module_name)))
}

/// Where the loaded configuration came from
///
/// Loading never logs: the subscriber is configured from the result, so the
/// caller reports the source with [`ConfigSource::log`] once tracing is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// File not found, built-in defaults in use
    Missing(PathBuf),
    /// No config directory on this platform, built-in defaults in use
    NoConfigDir,
}

impl ConfigSource {
    /// Report the source through `tracing`
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Configuration loaded from {}", path.display()),
            ConfigSource::Missing(path) => warn!(
                "Config file not found: {} (using built-in defaults)",
                path.display()
            ),
            ConfigSource::NoConfigDir => {
                warn!("Could not determine config directory (using built-in defaults)")
            }
        }
    }
}

/// Configuration plus its source
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    pub source: ConfigSource,
}

/// Load TOML configuration from `path`
///
/// Missing file → defaults (`ConfigSource::Missing`). Unreadable or malformed
/// file → error.
pub fn load_toml_config(path: &Path) -> Result<LoadedConfig> {
    if !path.exists() {
        return Ok(LoadedConfig {
            config: TomlConfig::default(),
            source: ConfigSource::Missing(path.to_path_buf()),
        });
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;

    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    config.validate()?;

    Ok(LoadedConfig {
        config,
        source: ConfigSource::File(path.to_path_buf()),
    })
}

/// Resolve and load configuration in one step
///
/// Falls back to defaults when no path can be resolved at all.
pub fn load_config(cli_arg: Option<&Path>, module_name: &str) -> Result<LoadedConfig> {
    match resolve_config_path(cli_arg, module_name) {
        Some(path) => load_toml_config(&path),
        None => Ok(LoadedConfig {
            config: TomlConfig::default(),
            source: ConfigSource::NoConfigDir,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_logging_level() {
        let config = TomlConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
        assert!(config.classifier.worker_count.is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("[classifier]\nworker_count = 3\n").unwrap();
        assert_eq!(config.classifier.worker_count, Some(3));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = TomlConfig::default();
        config.classifier.worker_count = Some(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unknown_level() {
        let mut config = TomlConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cli_arg_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/explicit.toml")), "selecta-ai");
        assert_eq!(path, Some(PathBuf::from("/tmp/explicit.toml")));
    }
}
