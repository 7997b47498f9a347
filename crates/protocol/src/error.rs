use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::code::ErrorCode;
use crate::scheme::Scheme;

/// Classification that drives retry and termination decisions.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Parse failures and undefined references; the job is dropped.
    Configuration,
    /// Connection refused, timeouts, busy remotes; retried.
    TransientTransport,
    /// Authentication rejected, missing source, remote rejection; retried
    /// with accelerated ageing.
    PermanentTransport,
    /// Pool or disk failures; the file goes to the store directory.
    LocalIo,
    /// Corrupt or mismatched shared state; controlled shutdown.
    InvariantViolation,
    /// The engine is stopping.
    Shutdown,
}

impl ErrorKind {
    /// Whether the job stays queued for a later attempt.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TransientTransport | Self::PermanentTransport)
    }
}

/// Failure reported by a delivery adapter.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Could not reach the remote.
    #[error("failed to connect to {host}: {source}")]
    Connect {
        /// Host name tried.
        host: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The remote refused the connection.
    #[error("connection to {host} refused")]
    ConnectionRefused {
        /// Host name tried.
        host: String,
    },
    /// The connection dropped mid-transfer.
    #[error("connection to {host} reset")]
    ConnectionReset {
        /// Host name.
        host: String,
    },
    /// An adapter call exceeded the host's `transfer_timeout`.
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        /// Operation that ran too long.
        operation: &'static str,
        /// Configured timeout.
        after: Duration,
    },
    /// Credentials were rejected.
    #[error("authentication of {user} at {host} rejected")]
    Authentication {
        /// User name.
        user: String,
        /// Host name.
        host: String,
    },
    /// The remote refused the file or command.
    #[error("remote rejected {name}: {reason}")]
    RemoteRejected {
        /// File or command concerned.
        name: String,
        /// Remote reply.
        reason: String,
    },
    /// A file to fetch is not present at the source.
    #[error("remote file {name} not found")]
    RemoteNotFound {
        /// Remote name.
        name: String,
    },
    /// The target directory could not be entered or created.
    #[error("failed to create target directory {path}: {source}")]
    TargetDirectory {
        /// Directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Writing at the destination failed.
    #[error("failed to write {path}: {source}")]
    WriteRemote {
        /// Destination file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The final rename at the destination failed.
    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        /// Temporary name.
        from: PathBuf,
        /// Final name.
        to: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The pool file could not be opened.
    #[error("failed to open local file {path}: {source}")]
    OpenLocal {
        /// Pool file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The pool file could not be read.
    #[error("failed to read local file {path}: {source}")]
    ReadLocal {
        /// Pool file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A retrieved file could not be written locally.
    #[error("failed to write local file {path}: {source}")]
    WriteLocal {
        /// Local file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// An `exec` command exited unsuccessfully.
    #[error("command '{command}' failed: {status}")]
    Exec {
        /// Command line.
        command: String,
        /// Exit status or spawn error.
        status: String,
    },
    /// No adapter is registered for the scheme.
    #[error("no adapter registered for {0}://")]
    UnsupportedScheme(Scheme),
    /// The adapter does not implement an optional capability.
    #[error("{scheme}:// does not support {operation}")]
    Unsupported {
        /// Scheme of the adapter.
        scheme: Scheme,
        /// Missing capability.
        operation: &'static str,
    },
    /// The recipient or options are unusable.
    #[error("invalid recipient {recipient}: {reason}")]
    InvalidTarget {
        /// Recipient text.
        recipient: String,
        /// What is wrong.
        reason: String,
    },
    /// The transfer was stopped by shutdown.
    #[error("transfer interrupted by shutdown")]
    Interrupted,
}

impl TransferError {
    /// Code recorded in `error_history`.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Connect { .. } => ErrorCode::ConnectError,
            Self::ConnectionRefused { .. } => ErrorCode::ConnectionRefusedError,
            Self::ConnectionReset { .. } => ErrorCode::ConnectionResetError,
            Self::Timeout { .. } => ErrorCode::TimeoutError,
            Self::Authentication { .. } => ErrorCode::AuthError,
            Self::RemoteRejected { .. } => ErrorCode::RemoteUserError,
            Self::RemoteNotFound { .. } => ErrorCode::OpenRemoteError,
            Self::TargetDirectory { .. } => ErrorCode::MkdirError,
            Self::WriteRemote { .. } => ErrorCode::WriteRemoteError,
            Self::Rename { .. } => ErrorCode::MoveRemoteError,
            Self::OpenLocal { .. } => ErrorCode::OpenLocalError,
            Self::ReadLocal { .. } => ErrorCode::ReadLocalError,
            Self::WriteLocal { .. } => ErrorCode::WriteLocalError,
            Self::Exec { .. } => ErrorCode::ExecError,
            Self::UnsupportedScheme(_) | Self::Unsupported { .. } => ErrorCode::UnsupportedScheme,
            Self::InvalidTarget { .. } => ErrorCode::SyntaxError,
            Self::Interrupted => ErrorCode::GotKilled,
        }
    }

    /// Classification of the failure.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect { .. }
            | Self::ConnectionRefused { .. }
            | Self::ConnectionReset { .. }
            | Self::Timeout { .. }
            | Self::TargetDirectory { .. }
            | Self::WriteRemote { .. }
            | Self::Rename { .. } => ErrorKind::TransientTransport,
            Self::Authentication { .. }
            | Self::RemoteRejected { .. }
            | Self::RemoteNotFound { .. }
            | Self::Exec { .. } => ErrorKind::PermanentTransport,
            Self::OpenLocal { .. } | Self::ReadLocal { .. } | Self::WriteLocal { .. } => {
                ErrorKind::LocalIo
            }
            Self::UnsupportedScheme(_) | Self::Unsupported { .. } | Self::InvalidTarget { .. } => {
                ErrorKind::Configuration
            }
            Self::Interrupted => ErrorKind::Shutdown,
        }
    }

    /// Maps an I/O error raised while talking to `host`.
    #[must_use]
    pub fn from_connect(host: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused {
                host: host.to_string(),
            },
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => Self::ConnectionReset {
                host: host.to_string(),
            },
            _ => Self::Connect {
                host: host.to_string(),
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_representative() {
        let refused = TransferError::from_connect(
            "down",
            io::Error::from(io::ErrorKind::ConnectionRefused),
        );
        assert_eq!(refused.code(), ErrorCode::ConnectionRefusedError);
        assert_eq!(refused.kind(), ErrorKind::TransientTransport);

        let local = TransferError::OpenLocal {
            path: "/pool/x".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(local.kind(), ErrorKind::LocalIo);
        assert!(!local.kind().is_retryable());

        assert_eq!(
            TransferError::UnsupportedScheme(Scheme::Wmo).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(TransferError::Interrupted.kind(), ErrorKind::Shutdown);
    }
}
