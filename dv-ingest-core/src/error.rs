//! Error types for the ingest pipeline.
//!
//! Every failure is an [`IngestError`]. Callers decide what to do with it through
//! [`IngestError::kind`]: configuration errors are surfaced to the submitter, remote and
//! resource errors fail the current deposit, rejections reject it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::contract::RemoteError;

/// Result type alias
pub type Result<T> = std::result::Result<T, IngestError>;

/// Coarse classification of an [`IngestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Remote,
    Rejection,
    Resource,
}

/// Top-level error type for dv-ingest
#[derive(Error, Debug)]
pub enum IngestError {
    /// Invalid submission or settings; the job never starts.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A repository call failed.
    #[error("Remote call '{operation}' failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },

    /// A file referenced by an instruction is not present in the remote dataset.
    #[error("File '{path}' not found in dataset {pid}")]
    MissingRemoteFile { pid: String, path: String },

    /// The deposit did not pass acceptance validation.
    #[error("Deposit rejected: {0}")]
    Rejected(String),

    /// An instruction document could not be read or decoded.
    #[error("Invalid instruction file '{path}': {reason}")]
    Instructions { path: PathBuf, reason: String },

    /// Filesystem failure.
    #[error("I/O error during {operation} on '{path}': {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failure while writing an upload archive.
    #[error("Failed to write archive '{path}': {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    /// Blocking work handed to the runtime's blocking pool panicked or was cancelled.
    #[error("Background task for {operation} did not complete: {source}")]
    Task {
        operation: &'static str,
        #[source]
        source: tokio::task::JoinError,
    },

    /// Directory traversal failure while listing a data directory.
    #[error("Failed to walk '{path}': {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Configuration(_) => ErrorKind::Configuration,
            IngestError::Remote { .. } | IngestError::MissingRemoteFile { .. } => {
                ErrorKind::Remote
            }
            IngestError::Rejected(_) => ErrorKind::Rejection,
            IngestError::Instructions { .. } => ErrorKind::Configuration,
            IngestError::Io { .. }
            | IngestError::Archive { .. }
            | IngestError::Task { .. }
            | IngestError::Walk { .. } => ErrorKind::Resource,
        }
    }

    pub(crate) fn remote(operation: &'static str) -> impl FnOnce(RemoteError) -> Self {
        move |source| IngestError::Remote { operation, source }
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        IngestError::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        IngestError::Archive {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn task(operation: &'static str) -> impl FnOnce(tokio::task::JoinError) -> Self {
        move |source| IngestError::Task { operation, source }
    }

    pub(crate) fn instructions(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        IngestError::Instructions {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
