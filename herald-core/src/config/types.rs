//! Configuration Data Structures for Herald Core.
//!
//! This module defines the structures used to represent the configuration of
//! the Herald notification broker. These structs are typically populated by
//! deserializing a TOML configuration file.
//!
//! # Key Structs
//! - [`BrokerConfig`]: The root configuration structure.
//! - [`LoggingConfig`]: Configuration specific to the logging subsystem.
//! - [`StorageConfig`]: Configuration for durable preference storage.
//! - [`DistributedConfig`]: Configuration for cross-device synchronization.
//!
//! These structs utilize `serde` for deserialization and apply default values
//! for fields not present in the configuration source, referencing functions
//! from the [`super::defaults`] module. Unknown fields are tolerated so older
//! brokers can read configuration written for newer ones.

use super::defaults;
use serde::Deserialize;
use std::path::PathBuf;

/// Configuration settings for the logging subsystem.
///
/// Defines parameters such as the log level, optional log file path, and log
/// format. These settings are used by the `herald_core::logging` module to
/// initialize the global logger.
///
/// # Examples
///
/// ```
/// use herald_core::config::LoggingConfig;
/// use std::path::PathBuf;
///
/// let default_log_config = LoggingConfig::default();
/// assert_eq!(default_log_config.level, "info");
/// assert_eq!(default_log_config.file_path, None);
/// assert_eq!(default_log_config.format, "text");
///
/// let toml_str = r#"
/// level = "debug"
/// file_path = "/var/log/herald.log"
/// format = "json"
/// "#;
/// let log_config: LoggingConfig = toml::from_str(toml_str).unwrap();
/// assert_eq!(log_config.level, "debug");
/// assert_eq!(log_config.file_path, Some(PathBuf::from("/var/log/herald.log")));
/// assert_eq!(log_config.format, "json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// The minimum log level to record.
    /// Valid values (case-insensitive): "trace", "debug", "info", "warn", "error".
    #[serde(default = "defaults::default_log_level")]
    pub level: String,
    /// Optional path to a file where logs should be written.
    /// If `None`, file logging is disabled.
    /// Relative paths are resolved against the application's state directory.
    #[serde(default = "defaults::default_log_file_path")]
    pub file_path: Option<PathBuf>,
    /// The format for log messages.
    /// Valid values (case-insensitive): "text", "json".
    #[serde(default = "defaults::default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::default_log_level(),
            file_path: defaults::default_log_file_path(),
            format: defaults::default_log_format(),
        }
    }
}

/// Configuration for the durable preference store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the persisted preference records.
    /// If `None`, the platform data directory is used.
    #[serde(default = "defaults::default_data_dir")]
    pub data_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::default_data_dir(),
        }
    }
}

/// Configuration for cross-device notification mirroring.
///
/// When `enabled` is false the broker operates purely device-local and the
/// remaining fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DistributedConfig {
    /// Whether cross-device mirroring is active.
    #[serde(default = "defaults::default_bool_false")]
    pub enabled: bool,
    /// Identifier of this device inside the replicated store.
    /// Must be non-empty when `enabled` is true.
    #[serde(default = "defaults::default_device_id")]
    pub device_id: String,
    /// Whether this device can render mirrored notifications.
    #[serde(default = "defaults::default_bool_true")]
    pub supports_display: bool,
}

impl Default for DistributedConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::default_bool_false(),
            device_id: defaults::default_device_id(),
            supports_display: defaults::default_bool_true(),
        }
    }
}

/// Root configuration structure for the Herald notification broker.
///
/// Aggregates all broker configuration sections. It is designed to be
/// deserialized from a TOML file and uses default values for missing sections
/// or fields.
///
/// # Examples
///
/// ```
/// use herald_core::config::BrokerConfig;
///
/// let config = BrokerConfig::default();
/// assert_eq!(config.logging.level, "info");
/// assert!(!config.distributed.enabled);
///
/// let toml_str = r#"
/// [logging]
/// level = "warn"
/// format = "json"
///
/// [distributed]
/// enabled = true
/// device_id = "phone-01"
/// "#;
/// let loaded: BrokerConfig = toml::from_str(toml_str).unwrap();
/// assert_eq!(loaded.logging.level, "warn");
/// assert!(loaded.distributed.enabled);
/// assert_eq!(loaded.distributed.device_id, "phone-01");
/// assert!(loaded.distributed.supports_display); // Default
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerConfig {
    /// Configuration for the logging subsystem.
    #[serde(default = "defaults::default_logging_config")]
    pub logging: LoggingConfig,
    /// Configuration for durable preference storage.
    #[serde(default = "defaults::default_storage_config")]
    pub storage: StorageConfig,
    /// Configuration for cross-device synchronization.
    #[serde(default = "defaults::default_distributed_config")]
    pub distributed: DistributedConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            logging: defaults::default_logging_config(),
            storage: defaults::default_storage_config(),
            distributed: defaults::default_distributed_config(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_logging_config_default_values() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.file_path, None);
        assert_eq!(config.format, "text");
    }

    #[test]
    fn test_broker_config_default_values() {
        let config = BrokerConfig::default();
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.storage, StorageConfig::default());
        assert_eq!(config.distributed, DistributedConfig::default());
    }

    #[test]
    fn test_logging_config_deserialize_empty() {
        let config: LoggingConfig = toml::from_str("").unwrap();
        assert_eq!(config, LoggingConfig::default());
    }

    #[test]
    fn test_logging_config_deserialize_partial() {
        let config: LoggingConfig = toml::from_str(r#"level = "debug""#).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.file_path, None);
        assert_eq!(config.format, "text");

        let config_with_path: LoggingConfig =
            toml::from_str(r#"file_path = "/var/log/herald.log""#).unwrap();
        assert_eq!(
            config_with_path.file_path,
            Some(PathBuf::from("/var/log/herald.log"))
        );
    }

    #[test]
    fn test_broker_config_deserialize_empty() {
        let config: BrokerConfig = toml::from_str("").unwrap();
        assert_eq!(config, BrokerConfig::default());
    }

    #[test]
    fn test_broker_config_deserialize_sections() {
        let toml_str = r#"
            [logging]
            level = "warn"
            file_path = "/var/log/herald/broker.log"
            format = "json"

            [storage]
            data_dir = "/var/lib/herald"

            [distributed]
            enabled = true
            device_id = "tablet-7"
            supports_display = false
        "#;
        let config: BrokerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.level, "warn");
        assert_eq!(
            config.logging.file_path,
            Some(PathBuf::from("/var/log/herald/broker.log"))
        );
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/var/lib/herald")));
        assert!(config.distributed.enabled);
        assert_eq!(config.distributed.device_id, "tablet-7");
        assert!(!config.distributed.supports_display);
    }

    #[test]
    fn test_broker_config_tolerates_unknown_fields() {
        let toml_str = r#"
            future_section_marker = 1

            [logging]
            level = "error"
        "#;
        let config: BrokerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.level, "error");
    }
}
