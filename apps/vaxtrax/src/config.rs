//! # Configuration
//!
//! Optional TOML file, by default `vaxtrax.toml` in the working directory:
//!
//! ```toml
//! [thresholds]
//! unsafe_above = -15.0
//! at_risk_above = -17.0
//! risk_band = 2.0
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [storage]
//! database = "vaxtrax.db"
//! backend = "redb"
//! ```
//!
//! Every key is optional. Command-line flags take precedence over the file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use vaxtrax_core::{ThresholdConfig, VaxtraxError};

/// Default config file looked up when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "vaxtrax.toml";

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "VAXTRAX_CONFIG";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

/// Where batches are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Volatile in-process registry.
    Memory,
    /// redb database file.
    #[default]
    Redb,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory => f.write_str("memory"),
            Backend::Redb => f.write_str("redb"),
        }
    }
}

impl FromStr for Backend {
    type Err = VaxtraxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "redb" => Ok(Backend::Redb),
            other => Err(VaxtraxError::Validation(format!(
                "unknown backend {other:?}, expected memory or redb"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
    pub backend: Backend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("vaxtrax.db"),
            backend: Backend::Redb,
        }
    }
}

/// Whole application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub thresholds: ThresholdConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

// =============================================================================
// LOADING
// =============================================================================

impl AppConfig {
    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> Result<Self, VaxtraxError> {
        let config: AppConfig = toml::from_str(text)
            .map_err(|e| VaxtraxError::Validation(format!("invalid config: {}", e)))?;
        config.thresholds.validate()?;
        Ok(config)
    }

    /// Load configuration.
    ///
    /// An explicit path (flag or `VAXTRAX_CONFIG`) must exist. The default
    /// file is optional; without it the built-in defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self, VaxtraxError> {
        let from_env = std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from);
        let path = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => path,
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                    return Ok(Self::default());
                }
                default
            }
        };

        let metadata = std::fs::metadata(&path).map_err(|e| {
            VaxtraxError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(VaxtraxError::Validation(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(&path)
            .map_err(|e| VaxtraxError::IoError(format!("Read config: {}", e)))?;
        let config = Self::from_toml(&text)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

// =============================================================================
// TESTS
// =============================================================================
