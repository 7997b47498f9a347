//! Thin wrappers over the system calls the status files need.

#![allow(unsafe_code)]

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;

use memmap2::{Mmap, MmapMut, MmapOptions};

/// Maps the whole of `file` read-write.
pub(crate) fn map_mut(file: &File) -> io::Result<MmapMut> {
    // SAFETY: status files are only resized by replacing them (rebuild
    // renames a new file over the old path), never truncated in place, so
    // the mapping stays valid for its lifetime.
    unsafe { MmapOptions::new().map_mut(file) }
}

/// Maps the whole of `file` read-only.
pub(crate) fn map(file: &File) -> io::Result<Mmap> {
    // SAFETY: see `map_mut`.
    unsafe { MmapOptions::new().map(file) }
}

/// System page size.
pub(crate) fn page_size() -> u32 {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u32::try_from(size).unwrap_or(4096)
}

/// Blocking byte-range lock on `file`, released by [`unlock_range`].
pub(crate) fn lock_range(file: &File, offset: usize, len: usize, exclusive: bool) -> io::Result<()> {
    fcntl_lock(
        file,
        offset,
        len,
        if exclusive { libc::F_WRLCK } else { libc::F_RDLCK },
    )
}

/// Releases a lock taken with [`lock_range`].
pub(crate) fn unlock_range(file: &File, offset: usize, len: usize) -> io::Result<()> {
    fcntl_lock(file, offset, len, libc::F_UNLCK)
}

fn fcntl_lock(file: &File, offset: usize, len: usize, kind: libc::c_int) -> io::Result<()> {
    // SAFETY: an all-zero flock is a valid value for every field.
    let mut lock: libc::flock = unsafe { std::mem::zeroed() };
    lock.l_type = kind as libc::c_short;
    lock.l_whence = libc::SEEK_SET as libc::c_short;
    lock.l_start = offset as libc::off_t;
    lock.l_len = len as libc::off_t;
    loop {
        // SAFETY: the descriptor is owned by `file` and `lock` outlives the call.
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETLKW, &raw const lock) };
        if rc != -1 {
            return Ok(());
        }
        let error = io::Error::last_os_error();
        if error.kind() != io::ErrorKind::Interrupted {
            return Err(error);
        }
    }
}

/// Creates a named pipe with mode `0o600` unless it already exists.
pub fn make_fifo(path: &std::path::Path) -> io::Result<()> {
    use std::os::unix::ffi::OsStrExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))?;
    // SAFETY: `c_path` is a valid NUL-terminated string.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc == 0 {
        return Ok(());
    }
    let error = io::Error::last_os_error();
    if error.kind() == io::ErrorKind::AlreadyExists {
        Ok(())
    } else {
        Err(error)
    }
}

/// Whether a process with `pid` exists.
pub fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 only performs the permission and existence check.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Id of the calling process.
pub fn current_pid() -> i32 {
    std::process::id() as i32
}
