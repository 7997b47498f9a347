#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `daemon` is the supervising process of an AFD work directory. It owns
//! the command fifos under `fifodir/`, publishes the configuration, runs the
//! generator (AMG) and the distributor (FD) on their own threads and turns
//! fifo records, signals and configuration changes into control messages
//! for them.
//!
//! # Design
//!
//! - [`Supervisor::start`] checks that the work directory may be used,
//!   publishes the status arrays, writes `afd.status` and starts both
//!   components. [`Supervisor::run`] serves the fifos until shutdown.
//! - [`fifo`] opens every command fifo read-write so readers never see
//!   end-of-file; each fifo has a reader thread feeding a channel that the
//!   supervisor loop selects over together with component exits.
//! - [`reload::Reloader`] answers `db_update.fifo` requests with the
//!   fixed-size replies `udc` and `uhc` wait for, and re-reads the
//!   configuration when a file's modification time changes.
//! - [`lifecycle`] holds what other processes do to a supervisor: probe
//!   it, ask it to stop, or initialise its work directory.
//!
//! # Invariants
//!
//! - At most one live supervisor owns a work directory; `afd.status`
//!   records its pid and node.
//! - Shutdown waits at most `MAX_SHUTDOWN_TIME` (plus one tick) for AMG
//!   and FD before clearing `afd.status`.
//!
//! # Examples
//!
//! ```no_run
//! use daemon::{Signals, Supervisor, SupervisorOptions};
//! use status::WorkDir;
//!
//! let work = WorkDir::new("/var/afd");
//! let signals = Signals::install()?;
//! Supervisor::start(work, SupervisorOptions::default(), signals)?.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod command;
pub mod db_update;
mod error;
pub mod fifo;
pub mod lifecycle;
pub mod reload;
mod signals;
mod supervisor;

pub use command::{ACKN, AfdCommand};
pub use db_update::{DbUpdate, DbUpdateRequest, Reply};
pub use error::DaemonError;
pub use lifecycle::{Liveness, check_start, initialize, node_name, probe, request_shutdown};
pub use reload::Reloader;
pub use signals::Signals;
pub use supervisor::{DIR_CHECK_INTERVAL, Supervisor, SupervisorOptions};
