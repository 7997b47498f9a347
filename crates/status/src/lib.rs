#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `status` owns the state the distribution engine shares between its
//! components and with outside observers: the Host Status Array
//! (`fsa_status`), the Directory Status Array (`fra_status`), the process
//! status block (`afd.status`), the Job-ID registry files and the retrieve
//! lists of remote directories.
//!
//! # Design
//!
//! - Every mapped file begins with a 16-byte [`Header`] (record count,
//!   feature flags, version, page size, generation) followed by fixed-size
//!   little-endian records. A [`Record`] implementation names the layout.
//! - [`StatusArray`] maps one such file. Writers go through
//!   [`StatusArray::update`], which takes a byte-range `fcntl` lock on the
//!   field range named by a [`LockSlot`] (for example
//!   [`HostStatus::LOCK_EC`]) and writes back only the bytes the closure
//!   changed. Readers decode without locking and tolerate torn reads of
//!   counters.
//! - [`StatusArray::rebuild`] replaces a file by rename and bumps the
//!   generation; readers notice through [`StatusArray::refresh`].
//! - [`RetrieveList`] is a plain file rewritten atomically.
//! - [`Clock`] and [`WorkDir`] are passed in explicitly so tests run on a
//!   [`ManualClock`] inside a temporary directory.
//!
//! # Invariants
//!
//! - A header whose version differs from the record layout aborts the open
//!   with [`StatusError::VersionMismatch`].
//! - [`DirStatus::queue_files`] and [`DirStatus::unqueue_files`] keep
//!   `FILES_IN_QUEUE` set exactly when `files_queued > 0`.
//! - `error_history` holds the most recent distinct error codes, newest first.
//!
//! # Examples
//!
//! ```
//! use status::{Access, HostStatus, StatusArray};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("fsa_status");
//! let hsa = StatusArray::create(&path, &[HostStatus::new("h1")]).unwrap();
//! hsa.update_by_alias("h1", HostStatus::LOCK_EC, |host| host.error_counter += 1)
//!     .unwrap();
//!
//! let view = StatusArray::<HostStatus>::open(&path, Access::ReadOnly).unwrap();
//! assert_eq!(view.get_by_alias("h1").unwrap().error_counter, 1);
//! ```

mod afd;
mod clock;
mod codec;
mod dir;
pub mod dupcheck;
mod error;
mod header;
mod host;
mod jobs;
mod region;
mod retrieve;
mod sys;
mod workdir;

pub use afd::{AfdStatus, MAX_NODE_NAME_LENGTH, amg_jobs};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dir::{
    DirStatus, MAX_DIR_ALIAS_LENGTH, MAX_FRA_TIME_ENTRIES, MAX_RECIPIENT_LENGTH, ScanState,
    StupidMode, TimeEntry, delete_files, dir_flag, dir_options, gt_lt_sign,
};
pub use error::StatusError;
pub use header::{AFD_WORD_OFFSET, Header, STALE};
pub use host::{
    ConnectStatus, ERROR_HISTORY_LENGTH, HOST_ONE, HOST_TWO, HostStatus, JobStatus,
    MAX_FILENAME_LENGTH, MAX_HOSTNAME_LENGTH, MAX_MSG_NAME_LENGTH, MAX_NO_PARALLEL_JOBS,
    MAX_PROXY_NAME_LENGTH, MAX_REAL_HOSTNAME_LENGTH, MAX_TOGGLE_STR_LENGTH, host_status,
    protocol_options, special_flag,
};
pub use jobs::{
    DirNameRecord, FileMaskRecord, JobIdRecord, MAX_FILE_MASK_BUFFER, MAX_OPTION_LENGTH,
    MAX_PATH_LENGTH, MAX_SOPTION_LENGTH,
};
pub use region::{Access, LockSlot, Record, StatusArray};
pub use retrieve::{RETRIEVE_LIST_VERSION, RetrieveEntry, RetrieveList};
pub use sys::{current_pid, make_fifo, process_alive};
pub use workdir::{WorkDir, fifo};
