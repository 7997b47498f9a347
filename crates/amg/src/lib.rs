#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `amg` is the Automatic Message Generator. It scans every configured
//! source directory when its schedule says so, selects the files the
//! directory's masks and policies accept, links them into one pool batch
//! per job and hands a [`JobMessage`] per batch to the distributor.
//!
//! # Design
//!
//! - [`DirScanner`] runs one scan as a small state machine
//!   (`Scanning → Collecting → Dispatching`) recorded in the directory's DSA
//!   record. [`classify()`] decides per file, the
//!   [`DupcheckStore`] drops duplicates, [`Pool`] builds batches.
//! - Remote directories are fetched into `files/incoming/<alias>` by
//!   [`retrieve()`] before the local scan runs.
//! - [`Amg::tick`] scans every due directory on a bounded set of scoped
//!   worker threads fed by a `crossbeam_channel`. Directories with
//!   `one process just scanning` get a thread of their own.
//! - Messages leave through a [`MessageSink`]: [`FifoMessageSink`] writes
//!   `msg.fifo`, [`ChannelSink`] feeds an in-process distributor.
//! - All time decisions read the injected [`Clock`].
//!
//! # Invariants
//!
//! - A file reaches the pool for a job at most once per scan; its source
//!   is removed only after every batch holding it was created.
//! - `PAUSE_DISTRIBUTION` stops message generation; only queued-file
//!   deletion runs while it is set.
//! - Three consecutive failed scans set `DIR_ERROR_SET`; the next
//!   successful scan clears it.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use amg::{Amg, AmgOptions, FifoMessageSink};
//! use logging::RecordLogs;
//! use protocol::AdapterRegistry;
//! use status::{SystemClock, WorkDir, fifo};
//!
//! let work = WorkDir::new("/var/afd");
//! let loaded = config::loader::load(&work).unwrap();
//! config::loader::publish(&work, &loaded).unwrap();
//! let sink = FifoMessageSink::open(&work.fifo(fifo::MSG)).unwrap();
//! let mut amg = Amg::new(
//!     work.clone(),
//!     Arc::new(loaded.compiled),
//!     Arc::new(SystemClock),
//!     Arc::new(sink),
//!     RecordLogs::files(&work.log_dir()).unwrap(),
//!     AdapterRegistry::with_local_adapters(),
//!     AmgOptions::default(),
//! )
//! .unwrap();
//! amg.tick().unwrap();
//! ```

mod classify;
mod command;
mod dupcheck;
mod error;
mod message;
mod pool;
mod retrieve;
mod scanner;
pub mod schedule;
mod sink;

use std::sync::Arc;
use std::time::Duration;

use config::CompiledConfig;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use logging::{RecordLogs, system_log};
use protocol::{AdapterRegistry, ErrorKind};
use status::{Access, AfdStatus, Clock, DirStatus, HostStatus, StatusArray, WorkDir, dir_options};

pub use classify::{Candidate, Verdict, classify, queued_too_long};
pub use command::AmgCommand;
pub use dupcheck::{DupAction, DupFile, DupcheckStore, checksum};
pub use error::ScanError;
pub use message::{
    BATCHES_PER_COUNTER, InvalidMessageName, JobMessage, MAX_BIN_MSG_LENGTH, MessageName,
    MessageReader, msg_flag,
};
pub use pool::{Pool, PoolFile, link_or_copy, move_file};
pub use retrieve::{RetrieveContext, RetrieveReport, retrieve};
pub use scanner::{DirScanner, SCAN_ERROR_THRESHOLD, ScanContext, ScanReport};
pub use sink::{ChannelSink, FifoMessageSink, MessageSink};

/// Number of directories scanned in parallel by default.
pub const DEFAULT_SCAN_THREADS: usize = 10;

/// Tunables of the generator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AmgOptions {
    /// Shared scanner threads.
    pub scan_threads: usize,
    /// Upper bound on one scan in seconds, 0 for none.
    pub full_scan_timeout: u64,
    /// Sleep between ticks when no command arrives.
    pub tick_interval: Duration,
}

impl Default for AmgOptions {
    fn default() -> Self {
        Self {
            scan_threads: DEFAULT_SCAN_THREADS,
            full_scan_timeout: 0,
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Everything [`Amg::run`] reacts to.
#[derive(Clone, Debug)]
pub enum AmgControl {
    /// A command from `amg_cmd.fifo`.
    Command(AmgCommand),
    /// A freshly published configuration.
    Install(Arc<CompiledConfig>),
    /// Scan the directory with this alias on the next tick.
    Rescan(String),
}

/// Outcome of one [`Amg::tick`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TickReport {
    /// Directories scanned.
    pub scanned: usize,
    /// Messages emitted.
    pub messages: u32,
    /// Scans that failed, with the directory alias.
    pub failures: Vec<String>,
}

/// The generator: scanners plus their shared context.
pub struct Amg {
    ctx: ScanContext,
    afd: Option<StatusArray<AfdStatus>>,
    scanners: Vec<DirScanner>,
    options: AmgOptions,
    debug: bool,
}

impl std::fmt::Debug for Amg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Amg")
            .field("ctx", &self.ctx)
            .field("scanners", &self.scanners.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Amg {
    /// Attaches to the published status files of `work`.
    ///
    /// The DSA must exist; the host array and `afd.status` are optional.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        work: WorkDir,
        config: Arc<CompiledConfig>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn MessageSink>,
        logs: RecordLogs,
        registry: AdapterRegistry,
        options: AmgOptions,
    ) -> Result<Self, ScanError> {
        let dsa = StatusArray::<DirStatus>::open(&work.fra_status(), Access::ReadWrite)?;
        let hosts = optional::<HostStatus>(&work.fsa_status(), Access::ReadOnly)?;
        let afd = optional::<AfdStatus>(&work.afd_status(), Access::ReadWrite)?;
        let scanners = (0..config.dirs.len())
            .map(|index| DirScanner::new(&config, index))
            .collect();
        let mut ctx = ScanContext::new(work, dsa, hosts, config, sink, logs, clock, registry);
        ctx.full_scan_timeout = options.full_scan_timeout;
        Ok(Self {
            ctx,
            afd,
            scanners,
            options,
            debug: false,
        })
    }

    /// Shared scan context.
    #[must_use]
    pub const fn context(&self) -> &ScanContext {
        &self.ctx
    }

    /// Switches to `config`, keeping scanner state of surviving directories.
    pub fn install(&mut self, config: Arc<CompiledConfig>) -> Result<(), ScanError> {
        self.ctx.dsa.refresh()?;
        let mut previous: Vec<DirScanner> = std::mem::take(&mut self.scanners);
        for (index, dir) in config.dirs.iter().enumerate() {
            let alias = dir.status.dir_alias.as_str();
            let scanner = match previous.iter().position(|scanner| scanner.alias() == alias) {
                Some(found) => {
                    let mut scanner = previous.swap_remove(found);
                    scanner.rebind(index);
                    scanner
                }
                None => DirScanner::new(&config, index),
            };
            self.scanners.push(scanner);
        }
        for gone in &previous {
            if let Some(dir) = self.ctx.config.dir(gone.alias()) {
                self.ctx.dupcheck.forget(dir.status.dir_id);
            }
        }
        system_log!(
            info,
            "AMG now scans {} directories ({} dropped)",
            self.scanners.len(),
            previous.len()
        );
        self.ctx.config = config;
        Ok(())
    }

    /// Marks `alias` for a scan on the next tick regardless of its schedule.
    pub fn force(&mut self, alias: &str) -> bool {
        match self.scanners.iter_mut().find(|scanner| scanner.alias() == alias) {
            Some(scanner) => {
                scanner.forced = true;
                true
            }
            None => false,
        }
    }

    /// Scans `alias` right away on the calling thread.
    pub fn scan_now(&mut self, alias: &str) -> Result<ScanReport, ScanError> {
        let paused = self.paused();
        let Some(scanner) = self.scanners.iter_mut().find(|scanner| scanner.alias() == alias) else {
            return Err(status::StatusError::UnknownAlias {
                alias: alias.to_string(),
            }
            .into());
        };
        scanner.scan(&self.ctx, paused)
    }

    fn paused(&self) -> bool {
        self.afd
            .as_ref()
            .and_then(|afd| afd.get(0).ok())
            .is_some_and(|afd| afd.distribution_paused())
    }

    /// Scans every directory that is due.
    ///
    /// Failures of single directories are recorded in their DSA records and
    /// listed in the report; only invariant violations end the tick with an
    /// error.
    pub fn tick(&mut self) -> Result<TickReport, ScanError> {
        let now = self.ctx.clock.unix_time();
        let purged = self.ctx.dupcheck.purge(now);
        if purged > 0 {
            tracing::debug!(purged, "expired dupcheck entries dropped");
        }
        if self.ctx.dsa.refresh()? {
            tracing::debug!("directory status array was rebuilt");
        }
        if let Some(hosts) = &self.ctx.hosts {
            hosts.refresh()?;
        }
        let paused = self.paused();
        let ctx = &self.ctx;
        let mut dedicated: Vec<&mut DirScanner> = Vec::new();
        let mut shared: Vec<&mut DirScanner> = Vec::new();
        for scanner in &mut self.scanners {
            if !scanner.is_due(ctx, now) {
                continue;
            }
            let own_thread = ctx.config.dirs.get(scanner.dir_index()).is_some_and(|dir| {
                dir.status.has_option(dir_options::ONE_PROCESS_JUST_SCANNING)
            });
            if own_thread {
                dedicated.push(scanner);
            } else {
                shared.push(scanner);
            }
        }
        if self.debug {
            tracing::debug!(dedicated = dedicated.len(), shared = shared.len(), paused, "tick");
        }

        let (results_tx, results_rx) = crossbeam_channel::unbounded();
        let (work_tx, work_rx) = crossbeam_channel::unbounded::<&mut DirScanner>();
        let workers = self.options.scan_threads.max(1).min(shared.len());
        for scanner in shared {
            // The receiver outlives this loop, so sending cannot fail.
            let _ = work_tx.send(scanner);
        }
        drop(work_tx);

        std::thread::scope(|scope| {
            for scanner in dedicated {
                let results = results_tx.clone();
                scope.spawn(move || {
                    let result = scanner.scan(ctx, paused);
                    let _ = results.send((scanner.alias().to_string(), result));
                });
            }
            for _ in 0..workers {
                let queue = work_rx.clone();
                let results = results_tx.clone();
                scope.spawn(move || {
                    for scanner in queue {
                        let result = scanner.scan(ctx, paused);
                        let _ = results.send((scanner.alias().to_string(), result));
                    }
                });
            }
        });
        drop(results_tx);

        let mut report = TickReport::default();
        let mut fatal = None;
        for (alias, result) in results_rx {
            report.scanned += 1;
            match result {
                Ok(scan) => report.messages += scan.messages,
                Err(error) => {
                    if error.kind() == ErrorKind::InvariantViolation && fatal.is_none() {
                        fatal = Some(error);
                    }
                    report.failures.push(alias);
                }
            }
        }
        report.failures.sort();
        match fatal {
            Some(error) => Err(error),
            None => Ok(report),
        }
    }

    /// Ticks until [`AmgCommand::Stop`] arrives or `control` disconnects.
    ///
    /// `RereadDirConfig` is left to the sender, which answers with
    /// [`AmgControl::Install`] once the new configuration is published.
    pub fn run(&mut self, control: &Receiver<AmgControl>) -> Result<(), ScanError> {
        system_log!(info, "AMG started with {} directories", self.scanners.len());
        loop {
            let report = self.tick()?;
            if report.messages > 0 {
                tracing::debug!(scanned = report.scanned, messages = report.messages, "tick done");
            }
            match control.recv_timeout(self.options.tick_interval) {
                Ok(message) => {
                    if !self.handle(message)? {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        system_log!(info, "AMG stopped");
        Ok(())
    }

    /// Applies one control message; `false` means stop.
    pub fn handle(&mut self, message: AmgControl) -> Result<bool, ScanError> {
        match message {
            AmgControl::Command(AmgCommand::Stop) => return Ok(false),
            AmgControl::Command(AmgCommand::RereadDirConfig) => {
                tracing::debug!("waiting for the reloaded DIR_CONFIG");
            }
            AmgControl::Command(AmgCommand::RereadHostConfig | AmgCommand::FsaAboutToChange) => {
                if let Some(hosts) = &self.ctx.hosts {
                    hosts.refresh()?;
                }
            }
            AmgControl::Command(AmgCommand::Debug) => {
                self.debug = !self.debug;
                system_log!(info, "AMG debug output {}", if self.debug { "on" } else { "off" });
            }
            AmgControl::Command(AmgCommand::ForceRemoteDirCheck) => {
                let config = Arc::clone(&self.ctx.config);
                for scanner in &mut self.scanners {
                    if config.dirs.get(scanner.dir_index()).is_some_and(|dir| dir.remote.is_some()) {
                        scanner.forced = true;
                    }
                }
            }
            AmgControl::Install(config) => self.install(config)?,
            AmgControl::Rescan(alias) => {
                if !self.force(&alias) {
                    system_log!(warn, "rescan of unknown directory {alias} ignored");
                }
            }
        }
        Ok(true)
    }
}

fn optional<R: status::Record>(
    path: &std::path::Path,
    access: Access,
) -> Result<Option<StatusArray<R>>, ScanError> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(StatusArray::open(path, access)?))
}
