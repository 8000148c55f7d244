//! Utility modules for the Herald core layer.

pub mod fs;
pub mod paths;

pub use fs::{ensure_dir_exists, read_to_string, write_string_to_file};
