//! Error types for image file handling

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors when loading or saving an emulated flash image
#[derive(Debug, Error)]
pub enum DummyError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Reading the image file failed
    #[error("Failed to read flash image '{}': {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing the image file failed
    #[error("Failed to write flash image '{}': {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The image does not match the configured flash size
    #[error("Flash image is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// The flash size cannot be addressed or erased in whole units
    #[error("Invalid flash size {0:#x}: must be a non-zero multiple of the erase unit below 4 GiB")]
    InvalidSize(usize),
}

/// Result type for image file operations
pub type Result<T> = std::result::Result<T, DummyError>;
