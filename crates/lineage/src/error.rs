//! Error types for Lineage operations.
//!
//! Errors come in two flavors:
//!
//! - **`Error`**: setup and boundary failures that are returned to the caller
//!   (bad arguments, missing root, malformed snapshot, bad patterns)
//! - **`ScanError`**: per-file problems collected during a scan. They never
//!   abort the scan; one unreadable template must not stop a full-tree walk.
//!
//! `ScanErrorKind` separates input problems (the file itself is at fault)
//! from environment problems (the filesystem refused us).

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Lineage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Lineage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing root directory or language argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The root directory does not exist
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// A snapshot handed to `load` has a structurally invalid entry
    #[error("invalid snapshot entry {}: {reason}", path.display())]
    InvalidSnapshot {
        /// The offending key or dependency path
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// An exclusion pattern failed to compile
    #[error("invalid exclusion pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid_snapshot(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A file-level problem encountered while scanning.
///
/// Collected in [`ScanStats::errors`](crate::ScanStats) and logged; the scan
/// carries on with the remaining files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    /// Path to the file or directory that failed
    pub path: PathBuf,
    /// Category of the error
    pub kind: ScanErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            self.path.display(),
            self.message,
            self.kind
        )
    }
}

impl std::error::Error for ScanError {}

/// Categorization of scan errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanErrorKind {
    // === Input problems ===
    /// File content is not valid UTF-8
    Encoding,

    /// File vanished between discovery and read
    Missing,

    // === Environment problems ===
    /// Access was denied
    Permission,

    /// Any other I/O failure
    Io,
}

impl std::fmt::Display for ScanErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encoding => write!(f, "encoding error"),
            Self::Missing => write!(f, "file missing"),
            Self::Permission => write!(f, "permission denied"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl ScanErrorKind {
    /// Returns `true` if the file itself is at fault.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Encoding | Self::Missing)
    }
}

impl ScanError {
    /// Create a new scan error.
    #[must_use]
    pub fn new(path: PathBuf, kind: ScanErrorKind, message: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            message: message.into(),
        }
    }

    /// Create an encoding error for a file.
    #[must_use]
    pub fn encoding(path: PathBuf) -> Self {
        Self::new(path, ScanErrorKind::Encoding, "file is not valid UTF-8")
    }

    /// Classify an I/O error for a file.
    #[must_use]
    pub fn from_io(path: PathBuf, error: &std::io::Error) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::NotFound => ScanErrorKind::Missing,
            std::io::ErrorKind::PermissionDenied => ScanErrorKind::Permission,
            std::io::ErrorKind::InvalidData => ScanErrorKind::Encoding,
            _ => ScanErrorKind::Io,
        };
        Self::new(path, kind, error.to_string())
    }
}
