use std::io;
use std::path::PathBuf;

use protocol::{ErrorKind, TransferError};
use status::StatusError;

/// Failure while scanning a directory or materialising its messages.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The source directory could not be listed.
    #[error("failed to read directory '{}': {source}", path.display())]
    ReadDir {
        /// Directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A pool operation failed.
    #[error("failed to {action} '{}': {source}", path.display())]
    Pool {
        /// What was being done.
        action: &'static str,
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The scan ran past `FULL_SCAN_TIMEOUT`.
    #[error("scan of {dir_alias} aborted after {seconds}s")]
    Timeout {
        /// Directory alias.
        dir_alias: String,
        /// Configured limit.
        seconds: u64,
    },
    /// A remote directory could not be listed or fetched.
    #[error("retrieving {dir_alias} failed: {source}")]
    Retrieve {
        /// Directory alias.
        dir_alias: String,
        /// Adapter failure.
        #[source]
        source: TransferError,
    },
    /// A job message could not be handed to the distributor.
    #[error("failed to emit message {msg_name}: {source}")]
    Emit {
        /// Message name.
        msg_name: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Shared status could not be read or updated.
    #[error(transparent)]
    Status(#[from] StatusError),
}

impl ScanError {
    pub(crate) fn pool(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Pool {
            action,
            path: path.into(),
            source,
        }
    }

    /// Classification for terminate-or-continue decisions.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ReadDir { .. } | Self::Pool { .. } | Self::Emit { .. } => ErrorKind::LocalIo,
            Self::Timeout { .. } => ErrorKind::TransientTransport,
            Self::Retrieve { source, .. } => source.kind(),
            Self::Status(error) if error.is_invariant_violation() => ErrorKind::InvariantViolation,
            Self::Status(_) => ErrorKind::LocalIo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieve_errors_keep_transport_kind() {
        let error = ScanError::Retrieve {
            dir_alias: "in".into(),
            source: TransferError::ConnectionRefused { host: "h".into() },
        };
        assert_eq!(error.kind(), ErrorKind::TransientTransport);
        assert!(error.to_string().contains("retrieving in failed"));
    }

    #[test]
    fn corrupt_status_is_an_invariant_violation() {
        let error = ScanError::from(StatusError::Corrupt {
            path: PathBuf::from("fra_status"),
            reason: "short".into(),
        });
        assert_eq!(error.kind(), ErrorKind::InvariantViolation);
    }
}
