#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `config` reads the operator-edited files under `etc/` (AFD_CONFIG,
//! HOST_CONFIG, DIR_CONFIG and the rename rules), turns the directory
//! blocks into jobs with stable CRC-32 ids, and publishes hosts,
//! directories and the job registry into the shared status files.
//!
//! # Design
//!
//! - Parsing never fails on a single bad line. Problems are collected in
//!   [`Diagnostics`] and logged to the System log; only unusable files
//!   surface as [`ConfigError`].
//! - [`DirConfig::parse`] is a small section state machine over
//!   `[directory]`, `[dir options]`, `[files]`, `[destination]`,
//!   `[recipient]` and `[options]` markers.
//! - [`compile`] expands every `(directory, file group, recipient,
//!   options)` tuple into a [`Job`]. Colliding ids are salted.
//! - [`loader::publish`] merges the new configuration with the running
//!   status arrays by alias so counters and operator status bits survive a
//!   reload, and classifies the difference as a [`DirConfigResult`] and
//!   [`HostConfigResult`].
//!
//! # Invariants
//!
//! - The same configuration always yields the same job ids, so a reload of
//!   unchanged files reports [`DirConfigResult::NoChange`].
//! - Every host a recipient or remote directory names has a host entry,
//!   either from HOST_CONFIG or with default settings.
//!
//! # Examples
//!
//! ```
//! use std::path::Path;
//! use config::{DirConfig, DirDefaults, Diagnostics};
//!
//! let text = "[directory] /data/in\n [files]\n  *.dat\n  [destination]\n   [recipient]\n    ftp://user:pw@h1/out\n";
//! let mut diagnostics = Diagnostics::new();
//! let parsed = DirConfig::parse(text, Path::new("DIR_CONFIG"), DirDefaults::default(), &mut diagnostics);
//! assert_eq!(parsed.directories.len(), 1);
//! assert_eq!(parsed.directories[0].alias, "in");
//! ```

mod afd_config;
mod compile;
mod dir_config;
mod error;
mod host_config;
pub mod loader;
mod options;
mod recipient;
mod reload;
mod rename;
mod time_entry;

pub use afd_config::AfdConfig;
pub use compile::{CompiledConfig, CompiledDir, CompiledGroup, Job, compile};
pub use dir_config::{
    Destination, DirConfig, DirDefaults, DirOptions, DirectoryBlock, FileGroup, Line,
};
pub use error::{ConfigError, Diagnostic, Diagnostics, Severity};
pub use host_config::{
    HOST_CONFIG_FIELDS, HostEntry, load_host_config, parse_host_config, write_host_config,
};
pub use loader::{LoadedConfig, Published};
pub use options::{DupcheckOption, JobOptions, NameOptions, OptionDefaults};
pub use recipient::{
    LOCAL_HOST_ALIAS, MAX_PASSWORD_LENGTH, MAX_USER_NAME_LENGTH, Recipient, SmtpAuth, UrlErrors,
    url_error,
};
pub use reload::{
    DirConfigResult, DirReloadReply, HostConfigResult, HostReloadReply, JobDiff, compare_hosts,
    complete_host_entries, diff_jobs, dirs_changed, merge_dirs, merge_hosts,
};
pub use rename::RenameRules;
pub use time_entry::parse_time_entry;
