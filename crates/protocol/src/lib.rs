#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `protocol` defines how the distribution engine talks to destinations.
//! Every transport implements the same small contract: a [`Connector`]
//! opens a [`Session`] for a [`Target`], the session sends (and for
//! retrieving directories lists and fetches) files, and finally
//! disconnects. Failures are reported as [`TransferError`], each mapping to
//! one [`ErrorCode`] for the host's error history and one [`ErrorKind`] for
//! the retry policy.
//!
//! # Design
//!
//! - [`AdapterRegistry`] dispatches on [`Scheme`]. The built-in
//!   [`FileConnector`] and [`ExecConnector`] cover `file://` and `exec://`;
//!   network transports register their own connectors.
//! - Hosts in simulate-send mode are served by [`SimulateConnector`]
//!   regardless of scheme.
//! - A session is reusable across jobs with the same [`ConnectionKey`],
//!   which is how the scheduler implements burst and keep-alive.
//! - Adapters report through [`Progress`] so the worker can mirror the
//!   transfer into the host's `job_status` slot.
//! - [`Deadline`] bounds each call by the host's `transfer_timeout`.
//!
//! # Examples
//!
//! ```
//! use protocol::{AdapterRegistry, LockScheme, NullProgress, SendRequest, SessionOptions, Target};
//!
//! let temp = tempfile::tempdir().unwrap();
//! let pool_file = temp.path().join("x.dat");
//! std::fs::write(&pool_file, b"payload").unwrap();
//! let out = temp.path().join("out");
//! std::fs::create_dir(&out).unwrap();
//!
//! let registry = AdapterRegistry::with_local_adapters();
//! let target = Target::local(out.to_str().unwrap());
//! let mut session = registry.connect(&target, &SessionOptions::default(), false).unwrap();
//! let sent = session
//!     .send_file(
//!         &SendRequest {
//!             local_path: &pool_file,
//!             remote_name: "x.dat",
//!             resume_offset: 0,
//!             lock: &LockScheme::Dot,
//!             mode: None,
//!         },
//!         &mut NullProgress,
//!     )
//!     .unwrap();
//! session.disconnect().unwrap();
//! assert_eq!(sent, 7);
//! assert!(out.join("x.dat").exists());
//! ```

mod adapter;
mod code;
mod error;
mod exec;
mod file;
mod progress;
mod registry;
mod scheme;
#[cfg(any(test, feature = "test-support"))]
mod scripted;
mod simulate;
mod target;

pub use adapter::{
    Connector, Deadline, LOCK_FILE_NAME, LockScheme, RemoteEntry, SendRequest, Session,
};
pub use code::ErrorCode;
pub use error::{ErrorKind, TransferError};
pub use exec::{ExecConnector, expand_command};
pub use file::FileConnector;
pub use progress::{NullProgress, Progress};
pub use registry::AdapterRegistry;
pub use scheme::{Scheme, UnknownScheme};
#[cfg(any(test, feature = "test-support"))]
pub use scripted::{Delivery, ScriptedConnector};
pub use simulate::SimulateConnector;
pub use target::{ConnectionKey, SessionOptions, Target};
