//! Configuration file support for flashmd.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (FLASHMD_*)
//! 3. Local config file (./flashmd.toml)
//! 4. Global config file (~/.config/flashmd/config.toml)
//!
//! ```toml
//! [connection]
//! serial = "/dev/ttyACM0"
//!
//! [dump]
//! verbose = false
//! no_trim = false
//! ```

use crate::CliError;
use directories::ProjectDirs;
use log::{debug, warn};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = "flashmd.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub serial: Option<String>,
}

/// Defaults for dump operations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DumpConfig {
    /// Show every firmware message.
    #[serde(default)]
    pub verbose: bool,
    /// Never trim ROM dumps.
    #[serde(default)]
    pub no_trim: bool,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Dump defaults.
    #[serde(default)]
    pub dump: DumpConfig,
}

impl Config {
    /// Load configuration from the global and local files.
    ///
    /// Unreadable or malformed files are reported and skipped.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_lenient(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_lenient(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a file named with `--config`.
    ///
    /// Unlike the implicit files, a missing or malformed file is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        let content = fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config = Self::parse(&content)
            .map_err(|e| CliError::Config(format!("invalid config {}: {e}", path.display())))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    fn load_lenient(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Ignoring config file {}: TOML parse error: {e}", path.display());
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {e}", path.display());
                None
            },
        }
    }

    /// Path of the global config file.
    pub fn global_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "flashmd").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Merge another configuration into this one; set values in `other` win.
    pub fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        self.dump.verbose |= other.dump.verbose;
        self.dump.no_trim |= other.dump.no_trim;
    }
}
