//! Application-Specific Path Resolution.
//!
//! Utility functions for resolving the standard directories Herald stores its
//! configuration and durable state in, following the XDG Base Directory
//! Specification via the `directories-next` crate.
//!
//! All functions return `Result<PathBuf, CoreError>`, yielding
//! [`CoreError::Config(ConfigError::DirectoryUnavailable)`] when a base
//! directory cannot be determined (e.g. the HOME directory is not set).

use crate::error::{ConfigError, CoreError};
use directories_next::ProjectDirs;
use std::path::PathBuf;

const QUALIFIER: &str = "org";
const ORGANIZATION: &str = "Herald";
const APPLICATION: &str = "Herald";

fn project_dirs() -> Result<ProjectDirs, CoreError> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION).ok_or_else(|| {
        CoreError::Config(ConfigError::DirectoryUnavailable {
            dir_type: "Project".to_string(),
        })
    })
}

/// Returns the application-specific configuration directory.
///
/// On Linux this typically resolves to `~/.config/herald`.
pub fn get_app_config_dir() -> Result<PathBuf, CoreError> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Returns the application-specific data directory, used for durable broker
/// state such as the preferences store.
///
/// On Linux this typically resolves to `~/.local/share/herald`.
pub fn get_app_data_dir() -> Result<PathBuf, CoreError> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Returns the application-specific state directory, used for log files.
///
/// On Linux this resolves under `$XDG_STATE_HOME` when set, falling back to
/// `~/.local/state/Herald/Herald`.
pub fn get_app_state_dir() -> Result<PathBuf, CoreError> {
    let base = directories_next::BaseDirs::new().ok_or_else(|| {
        CoreError::Config(ConfigError::DirectoryUnavailable {
            dir_type: "State Base".to_string(),
        })
    })?;

    #[cfg(target_os = "linux")]
    let state_base = match std::env::var("XDG_STATE_HOME") {
        Ok(state_home) if !state_home.is_empty() => PathBuf::from(state_home),
        _ => base.home_dir().join(".local/state"),
    };
    #[cfg(not(target_os = "linux"))]
    let state_base = base.data_local_dir().to_path_buf();

    Ok(state_base.join(ORGANIZATION).join(APPLICATION))
}
