//! Error types for firmware file parsing and caching.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for firmware operations.
pub type Result<T> = std::result::Result<T, FirmwareError>;

/// Errors that can occur while loading firmware containers.
#[derive(Debug, Error)]
pub enum FirmwareError {
    /// File not found or not readable.
    #[error("firmware file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
    },

    /// Required section header never appeared.
    #[error("malformed firmware file: missing '{section}' section")]
    MissingSection {
        /// Section header, including the `@` delimiters.
        section: &'static str,
    },

    /// File content does not match the format.
    #[error("malformed firmware file: {reason}")]
    Malformed {
        /// Reason for failure.
        reason: String,
    },

    /// Symbol defined in both the global and the per-channel table.
    #[error("symbol '{name}' defined as both global and per-channel")]
    DuplicateSymbol {
        /// Offending symbol name.
        name: String,
    },

    /// I/O error.
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl FirmwareError {
    /// Create a malformed-file error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
