//! `db_update.fifo`: reload requests from `udc`, `uhc` and editors.
//!
//! A request is one command byte followed by the caller's pid as a
//! little-endian `i32`. The answer goes to `db_update_reply.fifo.<pid>`:
//! a [`HostReloadReply`] for host commands, a [`DirReloadReply`] for
//! directory commands. A pid of 0 asks for no reply.

use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::thread;
use std::time::{Duration, Instant};

use config::{DirReloadReply, HostReloadReply};
use status::{WorkDir, current_pid, fifo, make_fifo};

use crate::error::DaemonError;
use crate::fifo as pipe;

/// What a request asks for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DbUpdate {
    /// Re-read HOST_CONFIG; the number is the verbosity (0 to 2).
    RereadHostConfig(u8),
    /// Re-read every DIR_CONFIG; the number is the verbosity (0 to 2).
    RereadDirConfig(u8),
    /// The host array was edited; write it back to HOST_CONFIG.
    HostConfigUpdate,
    /// DIR_CONFIG was written by an editor; re-read it.
    DirConfigUpdate,
}

impl DbUpdate {
    /// Wire byte.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::RereadHostConfig(verbose) => 1 + clamp(verbose),
            Self::RereadDirConfig(verbose) => 4 + clamp(verbose),
            Self::HostConfigUpdate => 7,
            Self::DirConfigUpdate => 8,
        }
    }

    /// Command for a wire byte.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1..=3 => Some(Self::RereadHostConfig(code - 1)),
            4..=6 => Some(Self::RereadDirConfig(code - 4)),
            7 => Some(Self::HostConfigUpdate),
            8 => Some(Self::DirConfigUpdate),
            _ => None,
        }
    }

    /// Whether the reply is a host reply.
    #[must_use]
    pub const fn is_host(self) -> bool {
        matches!(self, Self::RereadHostConfig(_) | Self::HostConfigUpdate)
    }

    /// Verbosity requested by the caller.
    #[must_use]
    pub const fn verbosity(self) -> u8 {
        match self {
            Self::RereadHostConfig(verbose) | Self::RereadDirConfig(verbose) => clamp(verbose),
            Self::HostConfigUpdate | Self::DirConfigUpdate => 0,
        }
    }

    /// Length of the reply.
    #[must_use]
    pub const fn reply_len(self) -> usize {
        if self.is_host() {
            HostReloadReply::LEN
        } else {
            DirReloadReply::LEN
        }
    }
}

const fn clamp(verbose: u8) -> u8 {
    if verbose > 2 { 2 } else { verbose }
}

/// One decoded request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DbUpdateRequest {
    /// Command.
    pub command: DbUpdate,
    /// Caller waiting on its reply fifo, 0 for none.
    pub pid: i32,
}

impl DbUpdateRequest {
    /// Encoded length.
    pub const LEN: usize = 5;

    /// Wire bytes.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut bytes = [0_u8; Self::LEN];
        bytes[0] = self.command.code();
        bytes[1..].copy_from_slice(&self.pid.to_le_bytes());
        bytes
    }
}

/// Reply to a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reply {
    /// HOST_CONFIG outcome.
    Host(HostReloadReply),
    /// DIR_CONFIG outcome.
    Dir(DirReloadReply),
}

impl Reply {
    /// Wire bytes.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        match self {
            Self::Host(reply) => reply.to_bytes().to_vec(),
            Self::Dir(reply) => reply.to_bytes().to_vec(),
        }
    }

    /// Warnings reported with the result.
    #[must_use]
    pub const fn warnings(self) -> i32 {
        match self {
            Self::Host(reply) => reply.warnings,
            Self::Dir(reply) => reply.warnings,
        }
    }
}

/// Reassembles requests from fifo reads.
#[derive(Debug, Default)]
pub struct DbUpdateReader {
    pending: Vec<u8>,
}

impl DbUpdateReader {
    /// Empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every complete request.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DbUpdateRequest> {
        self.pending.extend_from_slice(chunk);
        let mut requests = Vec::new();
        let mut at = 0;
        while at < self.pending.len() {
            let code = self.pending[at];
            let Some(command) = DbUpdate::from_code(code) else {
                logging::system_log!(warn, "unknown db_update command byte {code}");
                at += 1;
                continue;
            };
            let Some(raw) = self.pending.get(at + 1..at + DbUpdateRequest::LEN) else {
                break;
            };
            let pid = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            requests.push(DbUpdateRequest { command, pid });
            at += DbUpdateRequest::LEN;
        }
        self.pending.drain(..at);
        requests
    }
}

/// Writes `reply` to the reply fifo of `pid`.
pub fn answer(work: &WorkDir, pid: i32, reply: Reply) -> Result<(), DaemonError> {
    if pid <= 0 {
        return Ok(());
    }
    let path = work.db_update_reply(pid);
    pipe::send(&path, &reply.to_bytes()).map_err(|source| DaemonError::io("reply on", path, source))
}

/// Sends `command` to the running supervisor and waits up to `timeout`
/// for the reply.
pub fn request(work: &WorkDir, command: DbUpdate, timeout: Duration) -> Result<Reply, DaemonError> {
    let pid = current_pid();
    let reply_path = work.db_update_reply(pid);
    make_fifo(&reply_path).map_err(|source| DaemonError::io("create fifo", &reply_path, source))?;
    let outcome = exchange(work, command, pid, &reply_path, timeout);
    if let Err(error) = fs::remove_file(&reply_path) {
        tracing::debug!(path = %reply_path.display(), %error, "reply fifo not removed");
    }
    outcome
}

fn exchange(
    work: &WorkDir,
    command: DbUpdate,
    pid: i32,
    reply_path: &std::path::Path,
    timeout: Duration,
) -> Result<Reply, DaemonError> {
    let mut reply = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(reply_path)
        .map_err(|source| DaemonError::io("open fifo", reply_path, source))?;
    let request = DbUpdateRequest { command, pid }.to_bytes();
    let fifo = work.fifo(fifo::DB_UPDATE);
    pipe::send(&fifo, &request).map_err(|error| match error.kind() {
        io::ErrorKind::NotConnected | io::ErrorKind::NotFound => DaemonError::NotActive,
        _ => DaemonError::io("write", &fifo, error),
    })?;

    let deadline = Instant::now() + timeout;
    let mut bytes = Vec::with_capacity(command.reply_len());
    let mut buffer = [0_u8; 64];
    while bytes.len() < command.reply_len() {
        match reply.read(&mut buffer) {
            Ok(read) => bytes.extend_from_slice(&buffer[..read]),
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(DaemonError::NotResponding {
                        seconds: timeout.as_secs(),
                    });
                }
                thread::sleep(Duration::from_millis(20));
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(source) => return Err(DaemonError::io("read", reply_path, source)),
        }
    }
    let malformed = || DaemonError::Reply {
        path: reply_path.to_path_buf(),
    };
    if command.is_host() {
        HostReloadReply::from_bytes(&bytes).map(Reply::Host).ok_or_else(malformed)
    } else {
        DirReloadReply::from_bytes(&bytes).map(Reply::Dir).ok_or_else(malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_is_part_of_the_code() {
        for command in [
            DbUpdate::RereadHostConfig(0),
            DbUpdate::RereadHostConfig(2),
            DbUpdate::RereadDirConfig(1),
            DbUpdate::HostConfigUpdate,
            DbUpdate::DirConfigUpdate,
        ] {
            assert_eq!(DbUpdate::from_code(command.code()), Some(command));
        }
        assert_eq!(DbUpdate::RereadDirConfig(9).code(), 6);
        assert_eq!(DbUpdate::from_code(0), None);
    }

    #[test]
    fn requests_are_reassembled() {
        let mut stream = DbUpdateRequest {
            command: DbUpdate::RereadHostConfig(0),
            pid: 4242,
        }
        .to_bytes()
        .to_vec();
        stream.push(99);
        stream.extend(
            DbUpdateRequest {
                command: DbUpdate::RereadDirConfig(1),
                pid: 7,
            }
            .to_bytes(),
        );
        let mut reader = DbUpdateReader::new();
        assert!(reader.push(&stream[..3]).is_empty());
        let requests = reader.push(&stream[3..]);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].pid, 4242);
        assert_eq!(requests[1].command, DbUpdate::RereadDirConfig(1));
    }

    #[test]
    fn request_without_supervisor_is_not_active() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path());
        work.create_all().unwrap();
        make_fifo(&work.fifo(fifo::DB_UPDATE)).unwrap();
        let error = request(&work, DbUpdate::RereadHostConfig(0), Duration::from_millis(100)).unwrap_err();
        assert!(matches!(error, DaemonError::NotActive));
    }
}
