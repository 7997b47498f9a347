use std::io;
use std::path::PathBuf;

use protocol::ErrorKind;
use status::StatusError;

/// Failure of the distributor itself, as opposed to a failed transfer.
///
/// Transfer failures are absorbed by the retry engine and never surface
/// here.
#[derive(Debug, thiserror::Error)]
pub enum FdError {
    /// A pool, store or archive operation failed.
    #[error("failed to {action} '{}': {source}", path.display())]
    Io {
        /// What was being done.
        action: &'static str,
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A worker thread could not be started.
    #[error("failed to start a worker for {host_alias}: {source}")]
    Spawn {
        /// Host the worker was meant for.
        host_alias: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Shared status could not be read or updated.
    #[error(transparent)]
    Status(#[from] StatusError),
}

impl FdError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Classification for terminate-or-continue decisions.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::Spawn { .. } => ErrorKind::LocalIo,
            Self::Status(error) if error.is_invariant_violation() => ErrorKind::InvariantViolation,
            Self::Status(_) => ErrorKind::LocalIo,
        }
    }
}
