//! Error types for mirrorsync.
//!
//! This module provides the [`Error`] enum containing all possible errors
//! that can occur during a sync pass, and the [`Result`] type alias.
//!
//! # Error Categories
//!
//! | Category | Errors | Effect on a pass |
//! |----------|--------|------------------|
//! | Configuration | [`Error::Config`] | fatal before any pass begins |
//! | Validation | [`Error::Validation`] | fatal, loop returns to idle |
//! | Per-file | [`Error::Permission`], [`Error::FileOperation`] | isolated, siblings continue |
//! | Control | [`Error::Interrupted`] | pass ends cleanly, never reported |
//! | Lifecycle | [`Error::Thread`] | surfaces to the caller of start/stop |

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for mirrorsync operations.
///
/// This is a type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while mirroring.
///
/// All errors include relevant path information to aid debugging.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Invalid configuration values (non-positive intervals, empty pattern lists)
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Bad or missing paths, target nested under source, unwritable target
    #[error("validation failed: {0}")]
    Validation(String),

    /// Filesystem access denied on a specific file
    ///
    /// Reported distinctly from generic I/O failures so a notification can
    /// carry the file size alongside the paths.
    #[error("permission denied for {path}: {source}")]
    Permission {
        /// The file the access check failed on
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Generic copy failure on a specific file
    #[error("file operation failed for {path}: {source}")]
    FileOperation {
        /// The file the operation failed on
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Cooperative cancellation observed at a checkpoint
    ///
    /// This is expected, not exceptional: it ends the current pass cleanly
    /// and is never relayed through a notification sink. It carries partial
    /// statistics so the caller knows what completed before the stop.
    #[error("sync interrupted ({files_copied} files copied, {bytes_copied} bytes)")]
    Interrupted {
        /// Number of files fully copied before the interrupt
        files_copied: u64,
        /// Total bytes copied before the interrupt
        bytes_copied: u64,
    },

    /// Worker or loop thread failed to start, or failed to stop in time
    #[error("thread management failure: {0}")]
    Thread(String),

    /// IO error outside any per-file copy (scanning, probing)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error is the cooperative-cancellation signal rather than
    /// a real failure. Interrupts are never reported as errors.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Error::Interrupted { .. })
    }

    /// Short category label used in notification detail maps.
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "configuration",
            Error::Validation(_) => "validation",
            Error::Permission { .. } => "permission",
            Error::FileOperation { .. } => "copy",
            Error::Interrupted { .. } => "interrupt",
            Error::Thread(_) => "thread",
            Error::Io(_) => "io",
        }
    }
}

/// Classify an I/O error hit while copying `path`.
///
/// Permission denials get their own variant; everything else is a generic
/// file operation failure.
pub(crate) fn classify_io(path: &Path, source: io::Error) -> Error {
    if source.kind() == io::ErrorKind::PermissionDenied {
        Error::Permission {
            path: path.to_path_buf(),
            source,
        }
    } else {
        Error::FileOperation {
            path: path.to_path_buf(),
            source,
        }
    }
}
