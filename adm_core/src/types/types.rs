use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    InProgress,
    Paused,
    Cancelled,
    Completed,
    Failed,
}

/// Which validation profile an artifact must satisfy.
///
/// `SelfUpdate` artifacts are replacement binaries for this program and get
/// the full executable-format walk on top of the size and integrity checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Installer,
    SelfUpdate,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("too many redirects (limit {limit})")]
    TooManyRedirects { limit: usize },

    #[error("redirect response missing a usable Location header")]
    MalformedRedirect,

    #[error("HTTP {0}")]
    HttpError(u16),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(reqwest::Error),
}

impl TransportError {
    /// Classify a reqwest failure: timeouts get their own variant so callers
    /// can tell a stalled transfer from a broken connection.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(err)
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("disk I/O error: {0}")]
    Disk(io::Error),

    #[error("download cancelled")]
    Cancelled,

    #[error("a download is already in flight for task {0}")]
    TaskAlreadyActive(String),
}

#[derive(Debug, Error)]
pub enum RetryError {
    #[error("download failed after {attempts} attempts: {source}")]
    DownloadExhausted {
        attempts: u32,
        source: DownloadError,
    },

    #[error("validation failed after {attempts} attempts: {reason}")]
    ValidationExhausted { attempts: u32, reason: String },

    #[error("download cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("no staged update to install")]
    NoPendingUpdate,

    #[error("staged update failed re-validation: {0}")]
    StagedArtifactInvalid(String),

    #[error("could not shut down running instances: {0}")]
    ProcessShutdown(String),

    #[error("could not back up current executable: {0}")]
    Backup(io::Error),

    #[error("could not copy new executable into place: {0}")]
    Replace(io::Error),

    #[error("installed executable is too small ({got} bytes, floor {floor})")]
    VerifySize { got: u64, floor: u64 },

    #[error("could not relaunch executable: {0}")]
    Relaunch(io::Error),

    #[error("no install strategy could be launched")]
    NoStrategyAvailable,

    #[error("rollback failed after install error ({original}): {rollback}")]
    RollbackFailed {
        original: Box<InstallError>,
        rollback: String,
    },

    #[error("state store error: {0}")]
    Store(io::Error),
}

#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error("registration command failed: {0}")]
    Command(String),

    #[error("registrar I/O error: {0}")]
    Io(#[from] io::Error),
}
