//! Error types for the fwmigrate CLI

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use fwmigrate_dummy::DummyError;

/// Errors raised by the command-line host
#[derive(Debug, Error)]
pub enum CliError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Reading the config file failed
    #[error("Failed to read config file '{}': {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The config file is not valid TOML or has unknown keys
    #[error("Failed to parse config file '{}': {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A required setting was given neither on the command line nor in the config
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    /// A setting has an unusable value
    #[error("Invalid setting '{name}': {message}")]
    InvalidSetting { name: &'static str, message: String },

    /// Refusing to overwrite an existing file
    #[error("'{}' already exists (use --force to overwrite)", .0.display())]
    AlreadyExists(PathBuf),

    /// Flash image handling failed
    #[error(transparent)]
    Image(#[from] DummyError),

    /// The HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The engine reported a fatal error
    #[error("{0}")]
    Engine(#[from] fwmigrate_core::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
