//! Named pipes under `fifodir/`.
//!
//! The supervisor opens every command fifo read-write: opening never blocks
//! and the read side never sees end-of-file when a writer goes away. Each
//! fifo gets a reader thread that forwards raw chunks over a channel; the
//! per-fifo codecs reassemble records from those chunks.
//!
//! Writers open non-blocking, so writing to a fifo nobody reads fails with
//! [`io::ErrorKind::NotConnected`] instead of hanging.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::thread;

use crossbeam_channel::Receiver;
use status::{WorkDir, fifo, make_fifo};

use crate::error::DaemonError;

const CHUNK: usize = 4096;

/// Creates every fifo the supervisor listens on.
pub fn create_fifos(work: &WorkDir) -> Result<(), DaemonError> {
    for name in fifo::ALL {
        let path = work.fifo(name);
        make_fifo(&path).map_err(|source| DaemonError::io("create fifo", &path, source))?;
    }
    Ok(())
}

/// Opens `path` for reading without waiting for a writer.
pub fn open_reader(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

/// Starts a thread forwarding everything read from `path`.
///
/// The thread blocks in `read` for the lifetime of the process; it ends
/// when the receiver is dropped and the next chunk arrives.
pub fn spawn_reader(path: &Path) -> Result<Receiver<Vec<u8>>, DaemonError> {
    let mut file = open_reader(path).map_err(|source| DaemonError::io("open fifo", path, source))?;
    let (sender, receiver) = crossbeam_channel::unbounded();
    let name = path
        .file_name()
        .map_or_else(|| "fifo".to_string(), |name| name.to_string_lossy().into_owned());
    let label = name.clone();
    thread::Builder::new()
        .name(format!("read-{name}"))
        .spawn(move || {
            let mut buffer = vec![0_u8; CHUNK];
            loop {
                match file.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(read) => {
                        if sender.send(buffer[..read].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
                    Err(error) => {
                        logging::system_log!(error, "reading {label} failed: {error}");
                        break;
                    }
                }
            }
        })
        .map_err(|source| DaemonError::io("start reader for", path, source))?;
    Ok(receiver)
}

/// Opens `path` for writing; fails with `NotConnected` when nobody reads.
pub fn open_writer(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(|error| {
            if error.raw_os_error() == Some(libc::ENXIO) {
                io::Error::new(io::ErrorKind::NotConnected, "no reader on fifo")
            } else {
                error
            }
        })
}

/// Writes one record to the fifo at `path`.
pub fn send(path: &Path, bytes: &[u8]) -> io::Result<()> {
    open_writer(path)?.write_all(bytes)
}

/// Whether some process holds `path` open for reading.
#[must_use]
pub fn has_reader(path: &Path) -> bool {
    open_writer(path).is_ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn chunks_reach_the_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.fifo");
        make_fifo(&path).unwrap();
        assert!(!has_reader(&path));

        let chunks = spawn_reader(&path).unwrap();
        assert!(has_reader(&path));
        send(&path, b"abc").unwrap();
        let chunk = chunks.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(chunk, b"abc");
    }

    #[test]
    fn writing_without_reader_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lonely.fifo");
        make_fifo(&path).unwrap();
        let error = send(&path, b"x").unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::NotConnected);
    }
}
