use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::TransferError;
use crate::progress::Progress;
use crate::scheme::Scheme;
use crate::target::{ConnectionKey, SessionOptions, Target};

/// Opens sessions for one scheme.
pub trait Connector: Send + Sync {
    /// Connects to `target`.
    fn connect(
        &self,
        target: &Target,
        options: &SessionOptions,
    ) -> Result<Box<dyn Session>, TransferError>;
}

/// An open connection.
///
/// A session stays open across jobs while the host bursts or keeps the
/// connection alive; [`change_target`](Self::change_target) switches to the
/// next job's directory without reconnecting.
pub trait Session: Send {
    /// Scheme of the adapter.
    fn scheme(&self) -> Scheme;

    /// Identity used to decide whether another job may reuse the session.
    fn key(&self) -> &ConnectionKey;

    /// Points the session at a different directory on the same connection.
    fn change_target(&mut self, target: &Target) -> Result<(), TransferError>;

    /// Sends one file, returning the bytes written.
    fn send_file(
        &mut self,
        request: &SendRequest<'_>,
        progress: &mut dyn Progress,
    ) -> Result<u64, TransferError>;

    /// Fetches `remote_name` into `local_path`, returning the bytes read.
    fn receive_file(
        &mut self,
        remote_name: &str,
        local_path: &Path,
        progress: &mut dyn Progress,
    ) -> Result<u64, TransferError> {
        let _ = (remote_name, local_path, progress);
        Err(TransferError::Unsupported {
            scheme: self.scheme(),
            operation: "receive",
        })
    }

    /// Lists the remote directory.
    fn list(&mut self) -> Result<Vec<RemoteEntry>, TransferError> {
        Err(TransferError::Unsupported {
            scheme: self.scheme(),
            operation: "list",
        })
    }

    /// Removes a fetched file at the source.
    fn remove(&mut self, remote_name: &str) -> Result<(), TransferError> {
        let _ = remote_name;
        Err(TransferError::Unsupported {
            scheme: self.scheme(),
            operation: "remove",
        })
    }

    /// Closes the connection cleanly.
    fn disconnect(self: Box<Self>) -> Result<(), TransferError>;
}

/// One file to send.
#[derive(Clone, Copy, Debug)]
pub struct SendRequest<'a> {
    /// Pool file.
    pub local_path: &'a Path,
    /// Name at the destination after renaming options.
    pub remote_name: &'a str,
    /// Bytes already present at the destination from an earlier attempt.
    pub resume_offset: u64,
    /// How the file is hidden while it is written.
    pub lock: &'a LockScheme,
    /// Permissions to apply at the destination.
    pub mode: Option<u32>,
}

/// Entry of a remote listing.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RemoteEntry {
    /// File name.
    pub name: String,
    /// Size in bytes, −1 if unknown.
    pub size: i64,
    /// Modification time, if the listing reports an exact one.
    pub mtime: Option<i64>,
}

/// The `lock` job option.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub enum LockScheme {
    /// Write under the final name.
    Off,
    /// Write as `.name`, then rename.
    #[default]
    Dot,
    /// Write as `.name`, then rename to `name.`.
    DotVms,
    /// Hold a `LOCKFILE` in the target directory while writing.
    LockFile,
    /// Write as `<prefix>name`, then rename.
    Prefix(String),
}

/// Name of the lock file written by [`LockScheme::LockFile`].
pub const LOCK_FILE_NAME: &str = "LOCKFILE";

impl LockScheme {
    /// Name the file is written under while in transit.
    #[must_use]
    pub fn in_transit_name(&self, name: &str) -> String {
        match self {
            Self::Off | Self::LockFile => name.to_string(),
            Self::Dot | Self::DotVms => format!(".{name}"),
            Self::Prefix(prefix) => format!("{prefix}{name}"),
        }
    }

    /// Name the file ends up with.
    #[must_use]
    pub fn final_name(&self, name: &str) -> String {
        match self {
            Self::DotVms => format!("{name}."),
            _ => name.to_string(),
        }
    }
}

impl FromStr for LockScheme {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "OFF" => Self::Off,
            "DOT" => Self::Dot,
            "DOT_VMS" => Self::DotVms,
            "LOCKFILE" => Self::LockFile,
            prefix => Self::Prefix(prefix.to_string()),
        })
    }
}

/// Bound on the duration of one adapter call.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    /// Deadline `limit` from now; a zero limit never expires.
    #[must_use]
    pub fn after(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    /// Fails with [`TransferError::Timeout`] once the limit has passed.
    pub fn check(&self, operation: &'static str) -> Result<(), TransferError> {
        if !self.limit.is_zero() && self.started.elapsed() > self.limit {
            return Err(TransferError::Timeout {
                operation,
                after: self.limit,
            });
        }
        Ok(())
    }

    /// Time left, `None` when unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        (!self.limit.is_zero()).then(|| self.limit.saturating_sub(self.started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_scheme_names() {
        let dot: LockScheme = "DOT".parse().unwrap();
        assert_eq!(dot.in_transit_name("x.dat"), ".x.dat");
        assert_eq!(dot.final_name("x.dat"), "x.dat");
        let vms: LockScheme = "DOT_VMS".parse().unwrap();
        assert_eq!(vms.final_name("x"), "x.");
        let prefix: LockScheme = "tmp_".parse().unwrap();
        assert_eq!(prefix.in_transit_name("x"), "tmp_x");
        assert_eq!("OFF".parse::<LockScheme>().unwrap().in_transit_name("x"), "x");
    }

    #[test]
    fn zero_deadline_never_expires() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.check("send").is_ok());
        assert_eq!(deadline.remaining(), None);
    }

    #[test]
    fn expired_deadline_reports_timeout() {
        let deadline = Deadline {
            started: Instant::now().checked_sub(Duration::from_secs(5)).unwrap(),
            limit: Duration::from_secs(1),
        };
        let error = deadline.check("send").unwrap_err();
        assert!(matches!(error, TransferError::Timeout { operation: "send", .. }));
    }
}
