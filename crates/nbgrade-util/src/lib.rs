#![deny(clippy::print_stdout, clippy::print_stderr, clippy::unwrap_used)]

//! Contains various helpful utilities to be used throughout the nbgrade project.

pub mod deserialize;
pub mod error;
pub mod file_util;

pub use error::FileError;

pub type JsonError = serde_path_to_error::Error<serde_json::Error>;
pub type YamlError = serde_path_to_error::Error<serde_yaml::Error>;
