//! Logging System for Herald Core.
//!
//! A configurable logging framework built on the `tracing` ecosystem. It
//! supports console output and optional daily-rolling file logging with a
//! text or JSON format, driven by [`LoggingConfig`].

use crate::config::LoggingConfig;
use crate::error::CoreError;
use crate::utils;

use once_cell::sync::Lazy;
use std::io::stdout;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Initializes a minimal logging setup, directing messages to `stderr`.
///
/// Intended for tests and early startup before configuration is loaded. It
/// filters based on the `RUST_LOG` environment variable, defaulting to the
/// "info" level. Errors during initialization (e.g. a global subscriber is
/// already set) are ignored.
pub fn init_minimal_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    let _ = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .try_init();
}

/// Creates a file logging layer.
///
/// Ensures the parent directory for the log file exists, sets up a daily
/// rolling appender, and configures the log format (text or JSON).
fn create_file_layer(
    log_path: &Path,
    format: &str,
) -> Result<(Box<dyn Layer<Registry> + Send + Sync + 'static>, WorkerGuard), CoreError> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            utils::fs::ensure_dir_exists(parent)?;
        }
    }

    let file_appender = tracing_appender::rolling::daily(
        log_path.parent().unwrap_or_else(|| Path::new(".")),
        log_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("herald.log")),
    );

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    match format.to_lowercase().as_str() {
        "json" => {
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking_writer)
                .with_ansi(false);
            Ok((Box::new(layer), guard))
        }
        _ => {
            let layer = fmt::layer()
                .with_writer(non_blocking_writer)
                .with_ansi(false);
            Ok((Box::new(layer), guard))
        }
    }
}

/// Holds the `WorkerGuard` for the non-blocking file writer for the lifetime
/// of the process so buffered log lines get flushed.
static LOG_WORKER_GUARD: Lazy<Mutex<Option<WorkerGuard>>> = Lazy::new(|| Mutex::new(None));

/// Initializes the global logging system from the provided [`LoggingConfig`].
///
/// Configures a console layer and, when `config.file_path` is set, a file
/// layer. With `is_reload` set, a failure to replace the global subscriber is
/// downgraded to a console message instead of an error.
///
/// # Errors
///
/// Returns [`CoreError::LoggingInitialization`] if the configured level is
/// invalid or the global subscriber cannot be installed on initial setup.
pub fn init_logging(config: &LoggingConfig, is_reload: bool) -> Result<(), CoreError> {
    let level_filter_str = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE.to_string(),
        "debug" => Level::DEBUG.to_string(),
        "info" => Level::INFO.to_string(),
        "warn" => Level::WARN.to_string(),
        "error" => Level::ERROR.to_string(),
        invalid_level => {
            return Err(CoreError::LoggingInitialization(format!(
                "Invalid log level in config: {}",
                invalid_level
            )));
        }
    };

    let stdout_filter = EnvFilter::new(level_filter_str.clone());
    let stdout_layer = match config.format.to_lowercase().as_str() {
        "json" => fmt::layer()
            .json()
            .with_writer(stdout)
            .with_ansi(false)
            .with_filter(stdout_filter)
            .boxed(),
        _ => fmt::layer()
            .with_writer(stdout)
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_filter(stdout_filter)
            .boxed(),
    };

    let mut new_file_guard: Option<WorkerGuard> = None;
    let file_layer_opt: Option<Box<dyn Layer<Registry> + Send + Sync + 'static>> =
        if let Some(log_path) = &config.file_path {
            let file_filter = EnvFilter::new(level_filter_str);
            let (base_file_layer, guard) = create_file_layer(log_path, &config.format)?;
            new_file_guard = Some(guard);
            Some(base_file_layer.with_filter(file_filter).boxed())
        } else {
            None
        };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync + 'static>> = Vec::new();
    layers.push(stdout_layer);
    if let Some(file_layer) = file_layer_opt {
        layers.push(file_layer);
    }

    let result = Registry::default().with(layers).try_init();

    // Swap the guard even when try_init failed on reload; the old guard must
    // be dropped so its writer flushes.
    match LOG_WORKER_GUARD.lock() {
        Ok(mut guard_slot) => {
            *guard_slot = new_file_guard;
        }
        Err(e) => {
            eprintln!(
                "[ERROR] Failed to lock LOG_WORKER_GUARD to update: {}. Log flushing may be affected.",
                e
            );
        }
    }

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            if !is_reload {
                Err(CoreError::LoggingInitialization(format!(
                    "Failed to set global tracing subscriber. Was it already initialized? Error: {}",
                    e
                )))
            } else {
                eprintln!(
                    "[INFO] Re-initializing logging configuration attempted. Previous logger may persist. Error: {}",
                    e
                );
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;
    use tempfile::TempDir;

    /// Best-effort reset so `try_init` behaves like a first attempt. `tracing`
    /// has no public reset API, so this cannot fully isolate tests.
    fn ensure_clean_logger_state() {
        let _ = tracing::subscriber::set_global_default(
            tracing::subscriber::NoSubscriber::default(),
        );
    }

    #[test]
    fn init_minimal_logging_runs_without_panic() {
        ensure_clean_logger_state();
        init_minimal_logging();
        // Must be callable repeatedly; errors are swallowed.
        init_minimal_logging();
        tracing::info!("minimal logging smoke message");
    }

    #[test]
    fn create_file_layer_text_format() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("herald_text.log");

        let result = create_file_layer(&log_path, "text");
        assert!(result.is_ok(), "create_file_layer failed for text format: {:?}", result.err());
    }

    #[test]
    fn create_file_layer_json_format() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("herald_json.log");

        let result = create_file_layer(&log_path, "json");
        assert!(result.is_ok(), "create_file_layer failed for json format: {:?}", result.err());
    }

    #[test]
    fn create_file_layer_ensures_parent_dir_exists() {
        let temp_dir = TempDir::new().unwrap();
        let nested_log_path = temp_dir.path().join("logs/nested/herald.log");

        assert!(!nested_log_path.parent().unwrap().exists());
        create_file_layer(&nested_log_path, "text").expect("create_file_layer failed");
        assert!(nested_log_path.parent().unwrap().exists(), "Parent directory was not created");
    }

    #[test]
    fn init_logging_invalid_level_returns_error() {
        ensure_clean_logger_state();
        let config = LoggingConfig {
            level: "superverbose".to_string(),
            file_path: None,
            format: "text".to_string(),
        };
        let result = init_logging(&config, false);
        match result {
            Err(CoreError::LoggingInitialization(msg)) => {
                assert!(msg.contains("Invalid log level in config: superverbose"));
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn init_logging_reload_true_does_not_error_if_already_set() {
        ensure_clean_logger_state();
        let config1 = LoggingConfig {
            level: "info".to_string(),
            file_path: None,
            format: "text".to_string(),
        };
        let _ = init_logging(&config1, false);

        let config2 = LoggingConfig {
            level: "debug".to_string(),
            file_path: None,
            format: "text".to_string(),
        };
        let result = init_logging(&config2, true);
        assert!(result.is_ok(), "Reloading logging should not error, got: {:?}", result.err());
    }
}
