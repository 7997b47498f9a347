//! Start checks and the requests other processes send to a running
//! supervisor: liveness, shutdown and work directory initialisation.

use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use config::AfdConfig;
use status::{Access, AfdStatus, MAX_NODE_NAME_LENGTH, StatusArray, WorkDir, current_pid, fifo, process_alive};

use crate::command::{ACKN, AfdCommand};
use crate::error::DaemonError;
use crate::fifo as pipe;

const POLL: Duration = Duration::from_millis(20);

/// What a liveness probe found.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Liveness {
    /// The supervisor answered.
    Active,
    /// Nobody listens on the command fifo.
    NotActive,
    /// The command fifo has a reader that did not answer.
    NotResponding,
}

/// Node name of this machine, cut to the width stored in `afd.status`.
#[must_use]
pub fn node_name() -> String {
    let mut name = dns_lookup::get_hostname().unwrap_or_else(|error| {
        tracing::debug!(%error, "hostname lookup failed");
        "localhost".to_string()
    });
    if name.len() > MAX_NODE_NAME_LENGTH {
        let mut end = MAX_NODE_NAME_LENGTH;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

/// Status block left by the last run, if any.
pub fn read_afd_status(work: &WorkDir) -> Result<Option<AfdStatus>, DaemonError> {
    let path = work.afd_status();
    if !path.exists() {
        return Ok(None);
    }
    let array = StatusArray::<AfdStatus>::open(&path, Access::ReadOnly)?;
    if array.is_empty() {
        return Ok(None);
    }
    Ok(Some(array.get(0)?))
}

/// Refuses to start when the work directory is disabled, owned by a live
/// supervisor or bound to another node.
pub fn check_start(work: &WorkDir, afd: &AfdConfig, node: &str) -> Result<(), DaemonError> {
    let marker = work.disabled_marker();
    if marker.exists() {
        return Err(DaemonError::Disabled { marker });
    }
    let previous = read_afd_status(work)?;
    if let Some(previous) = &previous {
        let pid = previous.afd_pid;
        if pid != current_pid() && process_alive(pid) {
            return Err(DaemonError::Active { pid });
        }
    }
    let owner = afd
        .hostname
        .clone()
        .or_else(|| previous.map(|status| status.hostname))
        .filter(|owner| !owner.is_empty());
    match owner {
        Some(owner) if owner != node => Err(DaemonError::WrongHost {
            owner,
            node: node.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Asks the supervisor whether it is alive, waiting up to `timeout`.
pub fn probe(work: &WorkDir, timeout: Duration) -> Result<Liveness, DaemonError> {
    let command = work.fifo(fifo::AFD_CMD);
    if !command.exists() || !pipe::has_reader(&command) {
        return Ok(Liveness::NotActive);
    }
    let response = work.fifo(fifo::AFD_RESP);
    let mut reader = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(&response)
        .map_err(|source| DaemonError::io("open fifo", &response, source))?;
    match pipe::send(&command, &[AfdCommand::IsAlive.code()]) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotConnected => return Ok(Liveness::NotActive),
        Err(source) => return Err(DaemonError::io("write", command, source)),
    }
    let deadline = Instant::now() + timeout;
    let mut buffer = [0_u8; 16];
    loop {
        match reader.read(&mut buffer) {
            Ok(read) if buffer[..read].contains(&ACKN) => return Ok(Liveness::Active),
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {}
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(source) => return Err(DaemonError::io("read", response, source)),
        }
        if Instant::now() >= deadline {
            return Ok(Liveness::NotResponding);
        }
        thread::sleep(POLL);
    }
}

/// Sends a shutdown request and waits up to `timeout` for the supervisor
/// to release its fifos.
pub fn request_shutdown(work: &WorkDir, timeout: Duration) -> Result<(), DaemonError> {
    let command = work.fifo(fifo::AFD_CMD);
    pipe::send(&command, &[AfdCommand::Shutdown.code()]).map_err(|error| match error.kind() {
        io::ErrorKind::NotConnected | io::ErrorKind::NotFound => DaemonError::NotActive,
        _ => DaemonError::io("write", &command, error),
    })?;
    let deadline = Instant::now() + timeout;
    while pipe::has_reader(&command) {
        if Instant::now() >= deadline {
            return Err(DaemonError::NotResponding {
                seconds: timeout.as_secs(),
            });
        }
        thread::sleep(POLL);
    }
    Ok(())
}

/// Removes the status files so the next start rebuilds them. With `full`
/// the queue, the pool and the retrieve lists go too.
pub fn initialize(work: &WorkDir, full: bool) -> Result<(), DaemonError> {
    if pipe::has_reader(&work.fifo(fifo::AFD_CMD)) {
        let pid = read_afd_status(work)?.map_or(0, |status| status.afd_pid);
        return Err(DaemonError::Active { pid });
    }
    let mut files = vec![
        work.fsa_status(),
        work.fra_status(),
        work.afd_status(),
        work.job_id_data(),
        work.directory_names(),
        work.file_masks(),
    ];
    if full {
        files.push(work.fd_msg_queue());
    }
    for file in &files {
        remove(file, |path| fs::remove_file(path))?;
    }
    if full {
        remove(&work.pool_dir(), |path| fs::remove_dir_all(path))?;
        remove(&work.ls_data_dir(), |path| fs::remove_dir_all(path))?;
    }
    work.create_all()
        .map_err(|source| DaemonError::io("create", work.root(), source))?;
    logging::system_log!(
        info,
        "work directory {} initialised{}",
        work.root().display(),
        if full { " completely" } else { "" }
    );
    Ok(())
}

fn remove(path: &Path, op: impl FnOnce(&Path) -> io::Result<()>) -> Result<(), DaemonError> {
    match op(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(DaemonError::io("remove", path, source)),
    }
}
