//! Error type for the download engine.

use crate::status::Status;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Error produced by a job or one of its requests.
///
/// `Clone` so the same value can travel through the completion channel,
/// `Job::error()` and progress snapshots; non-clonable sources are held
/// behind `Arc`.
#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// The probe request exhausted its retries.
    #[error("probe failed: {0}")]
    Probe(#[source] Box<DownloadError>),

    /// The transport reported a failure (connect, TLS, read, abort).
    #[error("{0}")]
    Curl(Arc<curl::Error>),

    /// The server answered with an unusable status code.
    #[error("HTTP status {0}")]
    Http(u32),

    /// Filesystem failure on the output or checkpoint file.
    #[error("{0}")]
    Io(Arc<std::io::Error>),

    /// The output directory is missing and `create_dir` is off.
    #[error("output directory not found: {}", .0.display())]
    DirNotFound(PathBuf),

    /// The output file exists and neither overwrite nor renaming applies.
    #[error("output file exists: {}", .0.display())]
    FileExists(PathBuf),

    /// The caller cancelled the job. Not a terminal error: the job ends in
    /// `Close` with `error()` empty.
    #[error("cancelled")]
    Cancelled,

    /// The job's wall-clock deadline elapsed.
    #[error("timeout: {0}")]
    Timeout(#[source] Box<DownloadError>),

    /// `start()` was invoked from a state that forbids it.
    #[error("invalid state for start: {0}")]
    InvalidState(Status),
}

impl DownloadError {
    /// True when another attempt of the same request may succeed.
    ///
    /// Transport failures and bad status codes retry; IO failures and
    /// cancellation never do.
    pub(crate) fn retryable(&self) -> bool {
        match self {
            DownloadError::Curl(e) => !e.is_aborted_by_callback(),
            DownloadError::Http(_) => true,
            _ => false,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(e: std::io::Error) -> Self {
        DownloadError::Io(Arc::new(e))
    }
}

impl From<curl::Error> for DownloadError {
    fn from(e: curl::Error) -> Self {
        DownloadError::Curl(Arc::new(e))
    }
}

/// Result alias used throughout the engine.
pub type Result<T, E = DownloadError> = std::result::Result<T, E>;
