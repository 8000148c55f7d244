//! # Herald Core Library (`herald-core`)
//!
//! `herald-core` is the foundational library for Herald, a device-local
//! notification broker. It provides the core data types, configuration,
//! logging, and storage plumbing the broker crate is built on.
//!
//! ## Purpose
//!
//! The primary purpose of this crate is to offer a stable, well-tested
//! toolkit for the broker's ambient concerns. This includes:
//!
//! - **Error Handling**: A unified error system through the [`CoreError`]
//!   enum and its associated specific error types like [`ConfigError`].
//! - **Core Data Types**: Validated identity types for publishing bundles
//!   ([`BundleIdentity`]) and sync peers ([`DeviceId`]).
//! - **Configuration Management**: Utilities for loading, parsing, and
//!   validating broker configuration, primarily through [`ConfigLoader`]
//!   and [`BrokerConfig`].
//! - **Logging**: A logging framework built on top of the `tracing` crate,
//!   configurable for console and file output in text or JSON format.
//! - **Storage**: The [`KeyValueStore`] abstraction over durable record
//!   storage with file-backed and in-memory implementations.
//! - **Utility Functions**: Helpers for filesystem operations (`utils::fs`)
//!   and platform path resolution (`utils::paths`).
//!
//! ## Usage
//!
//! Add `herald-core` as a dependency in your `Cargo.toml`. Key components
//! are re-exported at the crate root for ease of use.
//!
//! ```rust,ignore
//! use herald_core::config::ConfigLoader;
//! use herald_core::error::CoreError;
//! use herald_core::logging::init_logging;
//!
//! fn main() -> Result<(), CoreError> {
//!     let config = ConfigLoader::load()?;
//!     init_logging(&config.logging, false)?;
//!     tracing::info!("Herald core initialized successfully.");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod storage;
pub mod types;
pub mod utils;

// Re-export key types for convenience
pub use config::{BrokerConfig, ConfigLoader, DistributedConfig, LoggingConfig, StorageConfig};
pub use error::{ConfigError, CoreError};
pub use logging::{init_logging, init_minimal_logging};
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use types::{BundleIdentity, DeviceId};
pub use utils::{ensure_dir_exists, read_to_string, write_string_to_file};
