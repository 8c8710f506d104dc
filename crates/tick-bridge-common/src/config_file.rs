//! Configuration file structures for the tick-bridge.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: Top-level configuration file structure
//! - [`DriverSection`]: Tick driver settings

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{BridgeConfig, RootMode};

/// Top-level configuration file structure.
///
/// This structure represents a complete TOML configuration file that can be
/// loaded at startup.
///
/// # Example
///
/// ```toml
/// [bridge.engine]
/// optimize = true
///
/// [bridge.module]
/// initial_memory_pages = 256
/// table_elements = 0
///
/// [bridge.module.exports]
/// run = "run"
/// state_offset = "state_offset"
/// state_len = "state_len"
///
/// [bridge]
/// capabilities = "reference_bridge"
///
/// [driver]
/// root_mode = "per_tick"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Bridge configuration (engine, module, capabilities, handles).
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Tick driver configuration.
    #[serde(default)]
    pub driver: DriverSection,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Tick driver configuration from a config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DriverSection {
    /// Root handle registration policy.
    #[serde(default)]
    pub root_mode: RootMode,
}

/// Errors from loading configuration files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path of the file that failed to load.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },
}
