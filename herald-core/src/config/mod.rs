//! Configuration Management for Herald Core.
//!
//! This module provides the structures and mechanisms for handling
//! configuration within the Herald foundation library. It defines how
//! configuration is structured, loaded, validated, and accessed.
//!
//! ## Key Components:
//!
//! - **Submodules**:
//!   - [`types`]: Contains the configuration struct definitions like
//!     [`BrokerConfig`] and [`LoggingConfig`]. These structs define the
//!     schema of the configuration.
//!   - [`defaults`]: Provides functions that return default values for
//!     configuration settings. These are used when a configuration file is
//!     missing or incomplete.
//!   - [`loader`]: Implements the logic for loading configuration data from
//!     a TOML file. The central piece is the [`ConfigLoader`] struct.
//!
//! ## Configuration Loading Process:
//!
//! 1. The `ConfigLoader::load()` method is called.
//! 2. It attempts to find and read `config.toml` from the
//!    application-specific configuration directory (determined by
//!    `utils::paths`).
//! 3. If the file is not found, a default [`BrokerConfig`] is generated.
//! 4. If the file is found, its TOML content is parsed into `BrokerConfig`.
//!    Parsing errors are mapped to [`crate::error::ConfigError::ParseError`].
//! 5. The resulting `BrokerConfig` (either loaded or default) undergoes
//!    validation (normalizing log levels, resolving relative paths).
//!    Validation errors are mapped to
//!    [`crate::error::ConfigError::ValidationError`].

pub mod defaults;
pub mod loader;
pub mod types;

pub use loader::ConfigLoader;
pub use types::{BrokerConfig, DistributedConfig, LoggingConfig, StorageConfig};
