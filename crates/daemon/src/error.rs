use std::io;
use std::path::PathBuf;

use amg::ScanError;
use config::ConfigError;
use fd::FdError;
use protocol::ErrorKind;
use status::StatusError;

/// Failure that ends the supervisor or one of its requests.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// A fifo, status or work directory operation failed.
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
    /// Another supervisor owns the work directory.
    #[error("AFD is already active with pid {pid}")]
    Active {
        /// Process id recorded in `afd.status`.
        pid: i32,
    },
    /// The work directory carries the disabled marker.
    #[error("AFD is disabled by the system administrator ({})", marker.display())]
    Disabled {
        /// Marker file.
        marker: PathBuf,
    },
    /// `afd.status` was written on another node.
    #[error("work directory belongs to {owner}, this is {node}")]
    WrongHost {
        /// Node name found in `afd.status`.
        owner: String,
        /// Node name of this machine.
        node: String,
    },
    /// No supervisor answered on the fifos.
    #[error("AFD is not active")]
    NotActive,
    /// The supervisor did not answer in time.
    #[error("AFD did not respond within {seconds}s")]
    NotResponding {
        /// How long the caller waited.
        seconds: u64,
    },
    /// A reply could not be decoded.
    #[error("malformed reply on '{}'", path.display())]
    Reply {
        /// Reply fifo.
        path: PathBuf,
    },
    /// A component thread died.
    #[error("{component} thread failed")]
    Thread {
        /// `AMG` or `FD`.
        component: &'static str,
    },
    /// Configuration could not be loaded or published.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Shared status could not be read or updated.
    #[error(transparent)]
    Status(#[from] StatusError),
    /// The generator failed.
    #[error(transparent)]
    Scan(#[from] ScanError),
    /// The distributor failed.
    #[error(transparent)]
    Fd(#[from] FdError),
}

impl DaemonError {
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
            Self::Io { .. } | Self::Thread { .. } => ErrorKind::LocalIo,
            Self::Active { .. } | Self::Disabled { .. } | Self::WrongHost { .. } | Self::Config(_) => {
                ErrorKind::Configuration
            }
            Self::NotActive | Self::NotResponding { .. } | Self::Reply { .. } => {
                ErrorKind::TransientTransport
            }
            Self::Status(error) if error.is_invariant_violation() => ErrorKind::InvariantViolation,
            Self::Status(_) => ErrorKind::LocalIo,
            Self::Scan(error) => error.kind(),
            Self::Fd(error) => error.kind(),
        }
    }
}
