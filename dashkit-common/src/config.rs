//! Configuration loading and config file resolution
//!
//! Bootstrap configuration is a small TOML file. Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `DASHKIT_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/dashkit/config.toml` on Linux)
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is never fatal: a warning is logged and the compiled
//! defaults are used. Only an explicitly requested file that cannot be read or
//! parsed is an error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "DASHKIT_CONFIG";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// TPCreator limits (optional)
    #[serde(default)]
    pub tpcreator: TpcConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            logging: LoggingConfig::default(),
            tpcreator: TpcConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
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

/// Limits applied by the TPCreator
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TpcConfig {
    /// Maximum number of layout_by_report rows scanned per report instance
    #[serde(default = "default_max_tpcreators_per_report")]
    pub max_tpcreators_per_report: usize,

    /// Maximum number of tiles derived from a single master tile
    #[serde(default = "default_max_tpcreated")]
    pub max_tpcreated: usize,

    /// Attempts made by the optimistic layout commit before giving up
    #[serde(default = "default_max_tpcreate_tries")]
    pub max_tpcreate_tries: usize,
}

impl Default for TpcConfig {
    fn default() -> Self {
        Self {
            max_tpcreators_per_report: default_max_tpcreators_per_report(),
            max_tpcreated: default_max_tpcreated(),
            max_tpcreate_tries: default_max_tpcreate_tries(),
        }
    }
}

impl TpcConfig {
    /// Reject limits that would make the TPCreator a silent no-op
    pub fn validate(&self) -> Result<()> {
        if self.max_tpcreators_per_report == 0 {
            return Err(Error::Config(
                "tpcreator.max_tpcreators_per_report must be at least 1".to_string(),
            ));
        }
        if self.max_tpcreated == 0 {
            return Err(Error::Config(
                "tpcreator.max_tpcreated must be at least 1".to_string(),
            ));
        }
        if self.max_tpcreate_tries == 0 {
            return Err(Error::Config(
                "tpcreator.max_tpcreate_tries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("dashkit").join("dashkit.db"))
        .unwrap_or_else(|| PathBuf::from("./dashkit_data/dashkit.db"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_tpcreators_per_report() -> usize {
    500
}

fn default_max_tpcreated() -> usize {
    100
}

fn default_max_tpcreate_tries() -> usize {
    10
}

/// Resolve which config file to read, if any
///
/// Returns `None` when neither the CLI nor the environment name a file and the
/// platform default does not exist.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    let user_config = dirs::config_dir().map(|d| d.join("dashkit").join("config.toml"));
    match user_config {
        Some(path) if path.exists() => Some(path),
        _ => None,
    }
}

/// Load bootstrap configuration following the resolution priority
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        warn!("No config file found, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        if cli_arg.is_some() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        warn!(
            "Config file {} does not exist, using compiled defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let config = load_config_file(&path)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Parse a specific TOML config file
pub fn load_config_file(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))?;
    config.tpcreator.validate()?;
    Ok(config)
}
