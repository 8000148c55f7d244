//! Default configuration values for Herald Core.
//!
//! These functions are used by `serde`'s `default` attribute in the
//! configuration structures to provide sensible default values when they are
//! not specified in the configuration file.

use crate::config::{DistributedConfig, LoggingConfig, StorageConfig};
use std::path::PathBuf;

/// Returns the default `LoggingConfig`.
///
/// Used by `BrokerConfig` if the `logging` section is missing from `config.toml`.
pub(super) fn default_logging_config() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        file_path: default_log_file_path(),
        format: default_log_format(),
    }
}

/// Returns the default log level string (`"info"`).
pub(super) fn default_log_level() -> String {
    "info".to_string()
}

/// Returns the default log file path (`None`).
pub(super) fn default_log_file_path() -> Option<PathBuf> {
    None // No log file by default
}

/// Returns the default log format string (`"text"`).
pub(super) fn default_log_format() -> String {
    "text".to_string()
}

/// Returns the default `StorageConfig`.
///
/// Used by `BrokerConfig` if the `storage` section is missing.
pub(super) fn default_storage_config() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
    }
}

/// Returns the default data directory (`None`).
///
/// `None` means the platform data directory is resolved at startup.
pub(super) fn default_data_dir() -> Option<PathBuf> {
    None
}

/// Returns the default `DistributedConfig`.
///
/// Used by `BrokerConfig` if the `distributed` section is missing.
pub(super) fn default_distributed_config() -> DistributedConfig {
    DistributedConfig {
        enabled: default_bool_false(),
        device_id: default_device_id(),
        supports_display: default_bool_true(),
    }
}

/// Returns the default local device identifier (`"local"`).
pub(super) fn default_device_id() -> String {
    "local".to_string()
}

/// Returns a default boolean value of `false`.
pub(super) fn default_bool_false() -> bool {
    false
}

/// Returns a default boolean value of `true`.
pub(super) fn default_bool_true() -> bool {
    true
}
