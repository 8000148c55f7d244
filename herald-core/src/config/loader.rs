//! Configuration Loading for Herald Core.
//!
//! This module provides the [`ConfigLoader`] struct, which is responsible for
//! loading, parsing, and validating the [`BrokerConfig`] for the Herald
//! broker. It handles locating the configuration file, deserializing it from
//! TOML, applying default values, and performing validation checks on the
//! loaded configuration.
//!
//! # Usage
//!
//! The primary way to use this module is through the static
//! `ConfigLoader::load()` method:
//!
//! ```rust,ignore
//! use herald_core::config::ConfigLoader;
//!
//! match ConfigLoader::load() {
//!     Ok(config) => {
//!         println!("Logging level: {}", config.logging.level);
//!     }
//!     Err(e) => {
//!         herald_core::logging::init_minimal_logging();
//!         tracing::error!("Configuration loading failed: {}", e);
//!     }
//! }
//! ```
//!
//! ## Configuration File Location
//!
//! `ConfigLoader::load()` attempts to load `config.toml` from the
//! application-specific configuration directory, as determined by
//! `herald_core::utils::paths::get_app_config_dir()`. If the file is not
//! found, a default configuration is used. `ConfigLoader::load_from_path()`
//! loads an explicitly named file and treats a missing file as an error.
//!
//! ## Validation
//!
//! After loading (or generating defaults), the configuration undergoes
//! validation via `validate_config`. This includes:
//! - Normalizing and validating log levels and formats.
//! - Resolving relative log file paths against the application's state
//!   directory and creating missing parent directories.
//! - Resolving relative data directories against the application's data
//!   directory.
//! - Rejecting an empty device id when distributed sync is enabled.

use std::fs;
use std::path::Path;

use crate::config::BrokerConfig;
use crate::error::{ConfigError, CoreError};
use crate::utils::fs as herald_fs;
use crate::utils::paths::{get_app_config_dir, get_app_data_dir, get_app_state_dir};

/// `ConfigLoader` provides static methods to load and validate [`BrokerConfig`].
///
/// This is an empty struct used as a namespace for configuration loading
/// logic. The main entry points are `load()` and `load_from_path()`.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads and validates the broker configuration from the default location.
    ///
    /// Reads `config.toml` from the application configuration directory. A
    /// missing file yields the default configuration; any other read failure
    /// is a [`ConfigError::ReadError`]. The result is validated before it is
    /// returned.
    pub fn load() -> Result<BrokerConfig, CoreError> {
        let config_dir = get_app_config_dir()?;
        let config_path = config_dir.join("config.toml");

        let mut config: BrokerConfig = match fs::read_to_string(&config_path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| CoreError::Config(ConfigError::ParseError(e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BrokerConfig::default(),
            Err(e) => {
                return Err(CoreError::Config(ConfigError::ReadError {
                    path: config_path,
                    source: e,
                }));
            }
        };

        Self::validate_config(&mut config)?;
        Ok(config)
    }

    /// Loads and validates the broker configuration from an explicit path.
    ///
    /// Unlike [`ConfigLoader::load`], a missing file is an error here: the
    /// caller named the file, so silently substituting defaults would hide a
    /// misconfigured deployment.
    pub fn load_from_path(path: &Path) -> Result<BrokerConfig, CoreError> {
        let content = fs::read_to_string(path).map_err(|e| {
            CoreError::Config(ConfigError::ReadError {
                path: path.to_path_buf(),
                source: e,
            })
        })?;

        let mut config: BrokerConfig = toml::from_str(&content)
            .map_err(|e| CoreError::Config(ConfigError::ParseError(e)))?;

        Self::validate_config(&mut config)?;
        Ok(config)
    }

    /// Validates the loaded `BrokerConfig` and performs necessary adjustments.
    ///
    /// Validation steps include:
    /// - Normalizing and validating the logging level (one of "trace",
    ///   "debug", "info", "warn", "error") and format ("text" or "json").
    /// - Resolving the log file path: a relative path is made absolute
    ///   against the application's state directory, and missing parent
    ///   directories are created.
    /// - Resolving a relative storage data directory against the
    ///   application's data directory and creating it if missing.
    /// - Trimming the distributed device id and rejecting an empty id while
    ///   distributed sync is enabled.
    fn validate_config(config: &mut BrokerConfig) -> Result<(), CoreError> {
        // Validate logging level
        let level_lower = config.logging.level.to_lowercase();
        match level_lower.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {
                config.logging.level = level_lower; // Normalize
            }
            _ => {
                return Err(CoreError::Config(ConfigError::ValidationError(format!(
                    "Invalid log level: '{}'. Must be one of trace, debug, info, warn, error.",
                    config.logging.level
                ))));
            }
        }

        // Validate logging format
        let format_lower = config.logging.format.to_lowercase();
        match format_lower.as_str() {
            "text" | "json" => {
                config.logging.format = format_lower; // Normalize
            }
            _ => {
                return Err(CoreError::Config(ConfigError::ValidationError(format!(
                    "Invalid log format: '{}'. Must be one of text, json.",
                    config.logging.format
                ))));
            }
        }

        // Handle log file path
        if let Some(configured_path) = &config.logging.file_path {
            let absolute_path = if configured_path.is_absolute() {
                configured_path.clone()
            } else {
                let state_dir = get_app_state_dir()?;
                state_dir.join(configured_path)
            };
            if let Some(parent_dir) = absolute_path.parent() {
                if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
                    herald_fs::ensure_dir_exists(parent_dir)?;
                }
            }
            config.logging.file_path = Some(absolute_path);
        }

        // Handle storage data directory
        if let Some(configured_dir) = &config.storage.data_dir {
            let absolute_dir = if configured_dir.is_absolute() {
                configured_dir.clone()
            } else {
                let data_dir = get_app_data_dir()?;
                data_dir.join(configured_dir)
            };
            herald_fs::ensure_dir_exists(&absolute_dir)?;
            config.storage.data_dir = Some(absolute_dir);
        }

        // Validate distributed sync settings
        config.distributed.device_id = config.distributed.device_id.trim().to_string();
        if config.distributed.enabled && config.distributed.device_id.is_empty() {
            return Err(CoreError::Config(ConfigError::ValidationError(
                "distributed.device_id must not be empty while distributed sync is enabled."
                    .to_string(),
            )));
        }

        Ok(())
    }
}
