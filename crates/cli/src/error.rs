use std::io;

use config::ConfigError;
use daemon::DaemonError;
use status::StatusError;

use crate::exit;

/// Failure of a command-line tool.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Neither `-w` nor `AFD_WORK_DIR` named a work directory.
    #[error("no work directory given, use -w or set {}", crate::WORK_DIR_ENV)]
    NoWorkDir,
    /// The named host or directory is not in the status array.
    #[error("{kind} {name} is not configured")]
    Unknown {
        /// `host` or `directory`.
        kind: &'static str,
        /// Alias or position given on the command line.
        name: String,
    },
    /// The requested operation does not apply.
    #[error("{0}")]
    Refused(String),
    /// Talking to the supervisor failed.
    #[error(transparent)]
    Daemon(#[from] DaemonError),
    /// A status array could not be read or updated.
    #[error(transparent)]
    Status(#[from] StatusError),
    /// A configuration file could not be read.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// JSON output failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Writing the output failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CliError {
    /// Exit status reported for this failure.
    #[must_use]
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::Daemon(DaemonError::Active { .. }) => exit::AFD_IS_ACTIVE,
            Self::Daemon(DaemonError::Disabled { .. }) => exit::AFD_DISABLED_BY_SYSADM,
            Self::Daemon(DaemonError::NotResponding { .. }) => exit::AFD_NOT_RESPONDING,
            Self::Daemon(DaemonError::NotActive) => exit::AFD_IS_NOT_ACTIVE,
            Self::Daemon(DaemonError::WrongHost { .. }) => exit::NOT_ON_CORRECT_HOST,
            _ => exit::INCORRECT,
        }
    }
}
