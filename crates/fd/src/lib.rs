#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `fd` is the File Distributor. It keeps every [`JobMessage`] the
//! generator announced in a queue ordered by `msg_number`, admits queue
//! heads for transfer when their host allows it, runs one worker thread per
//! transfer slot and folds the outcome of each attempt back into the host
//! status array.
//!
//! # Design
//!
//! - [`Queue`] is an arena with generation-checked ids; [`Backpressure`]
//!   turns its length into the `PAUSE_DISTRIBUTION` bit of `afd.status`.
//! - [`Fd::tick`] drains worker events, closes expired keep-alive
//!   connections, then walks the queue head first. A non-admissible head is
//!   skipped but keeps its place.
//! - Workers own an adapter session. After a success the scheduler hands
//!   the same worker the next message for an identical connection (burst),
//!   lets it idle for `keep_connected` seconds, or closes it.
//! - Failures go through the retry engine: counters under `LOCK_EC`, bits
//!   under `LOCK_HS`, the message aged forward and requeued.
//! - Delivered files are archived or removed, and every file ends with one
//!   output-log or delete-log record.
//! - The queue is written to `fd_msg_queue` whenever it changed, so a
//!   restart resumes it; pool batches without a queue entry are requeued.
//!
//! # Invariants
//!
//! - `active_transfers <= allowed_transfers` for every host; idle
//!   keep-alive workers count as active.
//! - No transfer starts for a host with any `NO_SCHEDULE` bit set.
//! - A message is held by at most one worker at a time.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fd::{Fd, FdOptions};
//! use logging::RecordLogs;
//! use protocol::AdapterRegistry;
//! use status::{SystemClock, WorkDir};
//!
//! let work = WorkDir::new("/var/afd");
//! let loaded = config::loader::load(&work).unwrap();
//! config::loader::publish(&work, &loaded).unwrap();
//! let options = FdOptions::from_config(&loaded.afd);
//! let mut fd = Fd::new(
//!     work.clone(),
//!     Arc::new(loaded.compiled),
//!     Arc::new(loaded.rename_rules),
//!     Arc::new(SystemClock),
//!     RecordLogs::files(&work.log_dir()).unwrap(),
//!     AdapterRegistry::with_local_adapters(),
//!     options,
//! )
//! .unwrap();
//! fd.tick().unwrap();
//! ```

mod archive;
mod command;
mod error;
mod names;
mod persist;
mod queue;
mod retry;
mod worker;

use std::fs;
use std::io;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use amg::{AmgCommand, AmgControl, JobMessage, MessageName, Pool, msg_flag};
use config::{AfdConfig, CompiledConfig, Job, RenameRules};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use logging::{DeleteReason, DeleteRecord, OutputRecord, OutputType, RecordLogs, system_log, transfer_log};
use protocol::{AdapterRegistry, ConnectionKey, ErrorKind, SessionOptions, TransferError};
use rustc_hash::FxHashMap;
use status::{
    Access, AfdStatus, Clock, ConnectStatus, DirStatus, HostStatus, LockSlot, StatusArray, WorkDir,
    amg_jobs, host_status, protocol_options, special_flag,
};

pub use archive::Archive;
pub use command::{CommandReader, DeleteCommand, DeleteReader, FdCommand};
pub use error::FdError;
pub use names::{local_name, remote_name};
pub use persist::{QueueRecord, load as load_queue, save as save_queue};
pub use queue::{
    AGEING_STEP, Backpressure, MAX_AGEING, PRIORITY_STEP, Queue, QueueEntry, QueueId, Resume,
    msg_number, queue_flag,
};
pub use retry::{
    FailureStep, SuccessStep, check_warn_time, count_failure, count_success, flag_failure,
    flag_success, retry_due,
};

use worker::{Assignment, Finished, Worker, WorkerCommand, WorkerEvent, WorkerShared};

/// Burst rounds on one connection when the host sets no limit.
pub const DEFAULT_BURST_ROUNDS: u32 = 100;

/// Seconds between two archive purges.
const ARCHIVE_PURGE_INTERVAL: i64 = 3600;

const PROC_USER: &str = "fd";

/// Tunables of the distributor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FdOptions {
    /// Soft limit of the queue, 0 disables backpressure.
    pub max_queue_length: usize,
    /// Workers across all hosts, 0 for no limit.
    pub max_connections: usize,
    /// Longest sleep between two ticks.
    pub tick_interval: Duration,
    /// Time running workers get to finish on shutdown.
    pub max_shutdown_time: Duration,
    /// Mode of new archive directories.
    pub archive_dir_mode: u32,
    /// Archive time of jobs that are no longer configured.
    pub archive_unit: i64,
    /// Burst rounds when the host sets no `number_of_no_bursts`.
    pub max_burst_rounds: u32,
}

impl Default for FdOptions {
    fn default() -> Self {
        Self {
            max_queue_length: 10_000,
            max_connections: 50,
            tick_interval: Duration::from_secs(1),
            max_shutdown_time: Duration::from_secs(30),
            archive_dir_mode: 0o755,
            archive_unit: 86_400,
            max_burst_rounds: DEFAULT_BURST_ROUNDS,
        }
    }
}

impl FdOptions {
    /// Options taken from `AFD_CONFIG`.
    #[must_use]
    pub fn from_config(afd: &AfdConfig) -> Self {
        Self {
            max_queue_length: afd.max_queue_length,
            max_connections: afd.max_connections as usize,
            max_shutdown_time: Duration::from_secs(afd.max_shutdown_time),
            archive_dir_mode: afd.archive_dir_mode,
            archive_unit: afd.archive_unit,
            ..Self::default()
        }
    }
}

/// Everything [`Fd::run`] reacts to besides job messages.
#[derive(Clone, Debug)]
pub enum FdControl {
    /// A command from `fd_cmd.fifo`.
    Command(FdCommand),
    /// A request from `fd_delete.fifo`.
    Delete(DeleteCommand),
    /// A freshly published configuration.
    Install {
        /// Compiled jobs.
        config: Arc<CompiledConfig>,
        /// Rename rules referenced by the jobs.
        rules: Arc<RenameRules>,
    },
    /// Toggle debug output.
    Debug,
    /// Finish running transfers and exit.
    Stop,
}

/// What one [`Fd::tick`] (or [`Fd::settle`]) did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TickReport {
    /// Transfers started on a new or idle worker.
    pub started: usize,
    /// Messages handed to a worker as burst continuation.
    pub bursts: usize,
    /// Messages delivered completely.
    pub delivered: usize,
    /// Failed attempts.
    pub failed: usize,
    /// Messages deleted without transfer.
    pub deleted: usize,
}

impl TickReport {
    fn absorb(&mut self, other: Self) {
        self.started += other.started;
        self.bursts += other.bursts;
        self.delivered += other.delivered;
        self.failed += other.failed;
        self.deleted += other.deleted;
    }
}

/// Scheduler side of a worker thread.
struct WorkerHandle {
    host_alias: String,
    slot: usize,
    key: ConnectionKey,
    commands: Sender<WorkerCommand>,
    running: Option<QueueId>,
    idle_until: i64,
    bursts: u32,
    closing: bool,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    const fn idle(&self) -> bool {
        self.running.is_none() && !self.closing
    }
}

/// What the queue walk decided for one waiting message.
enum Step {
    Skip,
    Delete(DeleteReason, Option<OutputType>),
    Reuse(u32),
    Evict(u32),
    Start(usize),
}

/// The distributor.
pub struct Fd {
    work: WorkDir,
    shared: Arc<WorkerShared>,
    dsa: Option<StatusArray<DirStatus>>,
    afd: Option<StatusArray<AfdStatus>>,
    config: Arc<CompiledConfig>,
    rules: Arc<RenameRules>,
    options: FdOptions,
    queue: Queue,
    backpressure: Backpressure,
    workers: FxHashMap<u32, WorkerHandle>,
    events: Sender<WorkerEvent>,
    finished: Receiver<WorkerEvent>,
    amg: Option<Sender<AmgControl>>,
    next_worker: u32,
    last_purge: i64,
    dirty: bool,
    stopping: bool,
    debug: bool,
}

impl std::fmt::Debug for Fd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fd")
            .field("work", &self.work)
            .field("queue", &self.queue.len())
            .field("workers", &self.workers.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Fd {
    /// Attaches to the published status files of `work` and restores the
    /// queue left by the previous run.
    ///
    /// The host array must exist; the DSA and `afd.status` are optional.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        work: WorkDir,
        config: Arc<CompiledConfig>,
        rules: Arc<RenameRules>,
        clock: Arc<dyn Clock>,
        logs: RecordLogs,
        registry: AdapterRegistry,
        options: FdOptions,
    ) -> Result<Self, FdError> {
        let hosts = StatusArray::<HostStatus>::open(&work.fsa_status(), Access::ReadWrite)?;
        let dsa = optional::<DirStatus>(&work.fra_status())?;
        let afd = optional::<AfdStatus>(&work.afd_status())?;
        let now = clock.unix_time();
        let shared = Arc::new(WorkerShared {
            hosts: Arc::new(hosts),
            registry,
            pool: Pool::new(work.pool_dir()),
            archive: Archive::new(work.archive_dir(), options.archive_dir_mode),
            logs,
            clock,
            stopping: AtomicBool::new(false),
        });
        let (events, finished) = crossbeam_channel::unbounded();
        let mut fd = Self {
            work,
            shared,
            dsa,
            afd,
            config,
            rules,
            options,
            queue: Queue::new(),
            backpressure: Backpressure::new(options.max_queue_length),
            workers: FxHashMap::default(),
            events,
            finished,
            amg: None,
            next_worker: 0,
            last_purge: now,
            dirty: false,
            stopping: false,
            debug: false,
        };
        fd.reset_hosts()?;
        for entry in persist::load(&fd.work.fd_msg_queue())? {
            fd.restore(entry)?;
        }
        fd.check_file_dir()?;
        fd.set_active(true)?;
        fd.save_if_dirty()?;
        system_log!(info, "FD started with {} queued messages", fd.queue.len());
        Ok(fd)
    }

    /// Forwards scanner commands received on `fd_cmd.fifo` to `amg`.
    pub fn connect_amg(&mut self, amg: Sender<AmgControl>) {
        self.amg = Some(amg);
    }

    /// The message queue.
    #[must_use]
    pub const fn queue(&self) -> &Queue {
        &self.queue
    }

    /// The host status array.
    #[must_use]
    pub fn hosts(&self) -> &StatusArray<HostStatus> {
        &self.shared.hosts
    }

    /// Worker threads alive, idle ones included.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &Arc<CompiledConfig> {
        &self.config
    }

    fn now(&self) -> i64 {
        self.shared.clock.unix_time()
    }

    /// Clears what a previous run left in the transfer slots and restarts
    /// the queue counters from zero.
    fn reset_hosts(&self) -> Result<(), FdError> {
        for index in 0..self.shared.hosts.len() {
            self.shared.hosts.update(index, LockSlot::WHOLE, |host| {
                host.active_transfers = 0;
                host.jobs_queued = 0;
                host.total_file_counter = 0;
                host.total_file_size = 0;
                host.special_flag &= !special_flag::KEEP_CON_IDLE;
                for slot in &mut host.job_status {
                    slot.clear();
                }
            })?;
        }
        Ok(())
    }

    fn restore(&mut self, entry: QueueEntry) -> Result<(), FdError> {
        let name = entry.message.name;
        if !self.shared.pool.batch_path(&name).is_dir() {
            system_log!(warn, "queued message {name} has no pool directory, dropped");
            self.dirty = true;
            return Ok(());
        }
        self.account_queued(&entry)?;
        self.queue.push(entry);
        Ok(())
    }

    /// Adds a message announced by the generator.
    ///
    /// A message for an unknown job is deleted right away; a message whose
    /// batch is already queued is ignored.
    pub fn enqueue(&mut self, message: JobMessage) -> Result<(), FdError> {
        if self.queue.find(&message.name).is_some() {
            tracing::debug!(batch = %message.name, "message already queued");
            return Ok(());
        }
        let Some(job) = self.config.job(message.name.job_id) else {
            system_log!(
                warn,
                "message {} refers to unknown job #{:x}, deleted",
                message.name,
                message.name.job_id
            );
            let now = self.now();
            self.discard_batch(&message, "", DeleteReason::JidLookupFailureDel, None, now);
            return Ok(());
        };
        let alias = job.host_alias().to_string();
        let ageing = !self
            .host(&alias)
            .is_some_and(|host| host.protocol_options & protocol_options::NO_AGEING_JOBS != 0);
        let mut entry = QueueEntry::new(message, &alias, ageing);
        if message.flag & msg_flag::FROM_RETRIEVE != 0 {
            entry.special_flag |= queue_flag::FETCH;
        }
        if message.flag & msg_flag::RESEND != 0 {
            entry.special_flag |= queue_flag::RESEND;
        }
        self.account_queued(&entry)?;
        self.queue.push(entry);
        self.dirty = true;
        Ok(())
    }

    /// Switches to `config` and `rules`. Messages of jobs that disappeared
    /// are deleted on the next queue walk.
    pub fn install(&mut self, config: Arc<CompiledConfig>, rules: Arc<RenameRules>) -> Result<(), FdError> {
        self.shared.hosts.refresh()?;
        self.config = config;
        self.rules = rules;
        system_log!(info, "FD now serves {} jobs", self.config.jobs.len());
        Ok(())
    }

    /// One scheduling round.
    pub fn tick(&mut self) -> Result<TickReport, FdError> {
        let mut report = TickReport::default();
        self.refresh()?;
        self.drain_events(&mut report)?;
        let now = self.now();
        self.expire_idle(now)?;
        self.check_warn_times(now)?;
        if !self.stopping {
            self.schedule(now, &mut report)?;
        }
        self.publish()?;
        if now - self.last_purge >= ARCHIVE_PURGE_INTERVAL {
            self.last_purge = now;
            if let Err(error) = self
                .shared
                .archive
                .purge(&self.config, self.options.archive_unit, now)
            {
                system_log!(warn, "archive purge failed: {error}");
            }
        }
        self.save_if_dirty()?;
        Ok(report)
    }

    /// Ticks until no worker is busy and nothing more can be started, or
    /// `timeout` passes.
    pub fn settle(&mut self, timeout: Duration) -> Result<TickReport, FdError> {
        let deadline = Instant::now() + timeout;
        let mut total = TickReport::default();
        loop {
            let report = self.tick()?;
            total.absorb(report);
            let busy = self.workers.values().any(|worker| !worker.idle());
            if !busy && report.started == 0 && report.bursts == 0 {
                break;
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match self.finished.recv_timeout(left) {
                Ok(event) => self.on_event(event, &mut total)?,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(total)
    }

    /// Serves `messages` and `control` until [`FdControl::Stop`] arrives or
    /// `control` disconnects, then shuts down.
    pub fn run(&mut self, messages: &Receiver<JobMessage>, control: &Receiver<FdControl>) -> Result<(), FdError> {
        let finished = self.finished.clone();
        let mut inbox = messages.clone();
        let mut last_tick = Instant::now();
        let mut scratch = TickReport::default();
        loop {
            let mut wake = false;
            let mut inbox_closed = false;
            let mut stop = false;
            let wait = self.options.tick_interval.saturating_sub(last_tick.elapsed());
            crossbeam_channel::select! {
                recv(inbox) -> message => match message {
                    Ok(message) => {
                        self.enqueue(message)?;
                        for message in inbox.try_iter() {
                            self.enqueue(message)?;
                        }
                        wake = true;
                    }
                    Err(_) => inbox_closed = true,
                },
                recv(control) -> message => match message {
                    Ok(message) => {
                        stop = !self.handle(message)?;
                        wake = true;
                    }
                    Err(_) => stop = true,
                },
                recv(finished) -> event => {
                    if let Ok(event) = event {
                        self.on_event(event, &mut scratch)?;
                    }
                    wake = true;
                },
                default(wait) => {},
            }
            if stop {
                break;
            }
            if inbox_closed {
                inbox = crossbeam_channel::never();
            }
            if wake || last_tick.elapsed() >= self.options.tick_interval {
                self.tick()?;
                last_tick = Instant::now();
            }
        }
        self.shutdown()?;
        Ok(())
    }

    /// Applies one control message; `false` means stop.
    pub fn handle(&mut self, message: FdControl) -> Result<bool, FdError> {
        match message {
            FdControl::Command(command) => {
                if let Some(forward) = self.command(command)? {
                    self.forward(forward);
                }
            }
            FdControl::Delete(command) => match self.delete(&command) {
                Ok(_) => {}
                Err(error) if error.kind() == ErrorKind::InvariantViolation => return Err(error),
                Err(error) => system_log!(error, "delete request failed: {error}"),
            },
            FdControl::Install { config, rules } => self.install(config, rules)?,
            FdControl::Debug => {
                self.debug = !self.debug;
                system_log!(info, "FD debug output {}", if self.debug { "on" } else { "off" });
            }
            FdControl::Stop => return Ok(false),
        }
        Ok(true)
    }

    /// Applies an `fd_cmd` command. Returns the command to pass on to the
    /// generator, if any.
    pub fn command(&mut self, command: FdCommand) -> Result<Option<AmgCommand>, FdError> {
        match command {
            FdCommand::Queue | FdCommand::DataReady => {}
            FdCommand::Transfer => {
                let now = self.now();
                self.expire_idle(now)?;
            }
            FdCommand::Retry(position) => self.retry(position)?,
            FdCommand::ForceRemoteDirCheck => return Ok(Some(AmgCommand::ForceRemoteDirCheck)),
            FdCommand::CheckFileDir => {
                self.check_file_dir()?;
            }
        }
        Ok(None)
    }

    fn forward(&self, command: AmgCommand) {
        match &self.amg {
            Some(amg) => {
                if amg.send(AmgControl::Command(command)).is_err() {
                    system_log!(warn, "AMG is gone, {command:?} dropped");
                }
            }
            None => tracing::debug!(?command, "no AMG link, command dropped"),
        }
    }

    fn retry(&mut self, position: i32) -> Result<(), FdError> {
        let index = usize::try_from(position)
            .ok()
            .filter(|&index| index < self.shared.hosts.len());
        let Some(index) = index else {
            system_log!(warn, "retry for unknown host position {position} ignored");
            return Ok(());
        };
        let alias = self.shared.hosts.update(index, LockSlot::WHOLE, |host| {
            host.special_flag |= special_flag::RETRY_REQUESTED;
            host.host_alias.clone()
        })?;
        let waiting: Vec<QueueId> = self
            .queue
            .iter()
            .filter(|(_, entry)| entry.host_alias == alias)
            .map(|(id, _)| id)
            .collect();
        for id in waiting {
            if let Some(entry) = self.queue.get_mut(id) {
                entry.retry_at = 0;
            }
        }
        system_log!(info, "{alias}: retry requested");
        Ok(())
    }

    /// Requeues every pool batch no queue entry refers to.
    pub fn check_file_dir(&mut self) -> Result<usize, FdError> {
        let pool = self.shared.pool.clone();
        let names = pool
            .batches()
            .map_err(|source| FdError::io("read", pool.root(), source))?;
        let now = self.now();
        let mut requeued = 0;
        for name in names {
            if self.queue.find(&name).is_some() {
                continue;
            }
            let files = match pool.files(&name) {
                Ok(files) => files,
                Err(error) => {
                    system_log!(warn, "pool batch {name} unreadable: {error}");
                    continue;
                }
            };
            let mut message = JobMessage {
                name,
                dev: pool.device(),
                dir_id: 0,
                file_size: files.iter().map(|file| file.size).sum(),
                files: u32::try_from(files.len()).unwrap_or(u32::MAX),
                priority: b'9',
                flag: 0,
            };
            if files.is_empty() {
                if let Err(error) = pool.remove_batch(&name) {
                    tracing::debug!(batch = %name, %error, "empty batch not removed");
                }
                continue;
            }
            match self.config.job(name.job_id) {
                Some(job) => {
                    message.dir_id = job.dir_id;
                    message.priority = job.options.priority;
                }
                None => {
                    system_log!(warn, "pool batch {name} belongs to no job, deleted");
                    self.discard_batch(&message, "", DeleteReason::JidLookupFailureDel, None, now);
                    continue;
                }
            }
            self.enqueue(message)?;
            requeued += 1;
        }
        if requeued > 0 {
            system_log!(info, "{requeued} pool batches without queue entry queued again");
        }
        Ok(requeued)
    }

    /// Applies an `fd_delete` request. Returns the number of files deleted.
    /// Messages being transferred are left alone.
    pub fn delete(&mut self, command: &DeleteCommand) -> Result<usize, FdError> {
        let now = self.now();
        let fetched = |entry: &QueueEntry| entry.special_flag & queue_flag::FETCH != 0;
        let ids: Vec<QueueId> = match command {
            DeleteCommand::AllJobsFromHost(alias) => self
                .queue
                .iter()
                .filter(|(_, entry)| entry.host_alias == *alias)
                .map(|(id, _)| id)
                .collect(),
            DeleteCommand::Message(name) => self.queue.find(name).into_iter().collect(),
            DeleteCommand::Retrieve(name) => self
                .queue
                .find(name)
                .filter(|id| self.queue.get(*id).is_some_and(fetched))
                .into_iter()
                .collect(),
            DeleteCommand::RetrievesFromDir(alias) => {
                let Some(dir_id) = self.config.dir(alias).map(|dir| dir.status.dir_id) else {
                    system_log!(warn, "delete for unknown directory {alias} ignored");
                    return Ok(0);
                };
                self.queue
                    .iter()
                    .filter(|(_, entry)| entry.message.dir_id == dir_id && fetched(entry))
                    .map(|(id, _)| id)
                    .collect()
            }
            DeleteCommand::SingleFile(name, file) => return self.delete_file(name, file, now),
        };
        let mut deleted = 0;
        for id in ids {
            if let Some(entry) = self.queue.get(id).filter(|entry| entry.in_progress()) {
                system_log!(warn, "{} is being transferred, not deleted", entry.name());
                continue;
            }
            deleted += self.discard(id, DeleteReason::UserDel, None, now)?;
        }
        if deleted > 0 {
            system_log!(info, "{deleted} queued files deleted on request");
        }
        Ok(deleted)
    }

    fn delete_file(&mut self, name: &MessageName, file: &str, now: i64) -> Result<usize, FdError> {
        let Some(id) = self.queue.find(name) else {
            return Ok(0);
        };
        let Some(entry) = self.queue.get(id) else {
            return Ok(0);
        };
        if entry.in_progress() {
            system_log!(warn, "{name} is being transferred, {file} not deleted");
            return Ok(0);
        }
        let alias = entry.host_alias.clone();
        let (job_id, dir_id) = (name.job_id, entry.message.dir_id);
        let path = self.shared.pool.batch_path(name).join(file);
        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(FdError::io("inspect", path, source)),
        };
        fs::remove_file(&path).map_err(|source| FdError::io("remove", &path, source))?;
        self.shared.logs.delete(DeleteRecord {
            time: now,
            host_name: alias.clone(),
            file_size: size,
            job_id,
            dir_id,
            reason: DeleteReason::UserDel,
            file_name: file.to_string(),
            proc_user: PROC_USER.to_string(),
        });
        let remaining = match self.queue.get_mut(id) {
            Some(entry) => {
                entry.message.files = entry.message.files.saturating_sub(1);
                entry.message.file_size = entry.message.file_size.saturating_sub(size);
                entry.message.files
            }
            None => 0,
        };
        self.account_files(&alias, dir_id, 1, size, false)?;
        if remaining == 0 {
            self.queue.remove(id);
            if let Err(error) = self.shared.pool.remove_batch(name) {
                tracing::warn!(batch = %name, %error, "emptied batch not removed");
            }
            self.job_gone(&alias)?;
        }
        self.dirty = true;
        Ok(1)
    }

    /// Finishes running transfers, waits up to `max_shutdown_time` for the
    /// workers and writes the queue. Returns the number of workers that
    /// did not stop in time.
    pub fn shutdown(&mut self) -> Result<usize, FdError> {
        self.stopping = true;
        self.shared.stopping.store(true, Ordering::Relaxed);
        let now = self.now();
        self.expire_idle(now)?;
        let deadline = Instant::now() + self.options.max_shutdown_time;
        let mut report = TickReport::default();
        while !self.workers.is_empty() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            match self.finished.recv_timeout(left) {
                Ok(event) => self.on_event(event, &mut report)?,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }
        let abandoned: Vec<WorkerHandle> = self.workers.drain().map(|(_, handle)| handle).collect();
        if !abandoned.is_empty() {
            system_log!(
                warn,
                "{} workers still running after {}s, abandoned",
                abandoned.len(),
                self.options.max_shutdown_time.as_secs()
            );
        }
        for handle in &abandoned {
            if let Some(entry) = handle.running.and_then(|id| self.queue.get_mut(id)) {
                entry.worker = 0;
            }
            self.release(&handle.host_alias, handle.slot)?;
        }
        self.dirty = true;
        self.save_if_dirty()?;
        self.set_active(false)?;
        system_log!(info, "FD stopped with {} queued messages", self.queue.len());
        Ok(abandoned.len())
    }

    fn refresh(&self) -> Result<(), FdError> {
        if self.shared.hosts.refresh()? {
            tracing::debug!("host status array was rebuilt");
        }
        if let Some(dsa) = &self.dsa {
            dsa.refresh()?;
        }
        if let Some(afd) = &self.afd {
            afd.refresh()?;
        }
        Ok(())
    }

    fn drain_events(&mut self, report: &mut TickReport) -> Result<(), FdError> {
        // Threads that ended without reporting (a panic) are reaped after
        // their queued events were handled.
        let ended: Vec<u32> = self
            .workers
            .iter()
            .filter(|(_, worker)| worker.thread.as_ref().is_some_and(JoinHandle::is_finished))
            .map(|(id, _)| *id)
            .collect();
        while let Ok(event) = self.finished.try_recv() {
            self.on_event(event, report)?;
        }
        for worker in ended {
            if self.workers.contains_key(&worker) {
                system_log!(error, "worker {worker} ended without reporting");
                self.on_exited(worker)?;
            }
        }
        Ok(())
    }

    fn on_event(&mut self, event: WorkerEvent, report: &mut TickReport) -> Result<(), FdError> {
        match event {
            WorkerEvent::Finished(finished) => self.on_finished(finished, report),
            WorkerEvent::Exited { worker } => self.on_exited(worker),
        }
    }

    fn on_finished(&mut self, finished: Finished, report: &mut TickReport) -> Result<(), FdError> {
        let now = self.now();
        if let Some(handle) = self.workers.get_mut(&finished.worker) {
            handle.running = None;
        }
        let (alias, dir_id) = match self.queue.get_mut(finished.id) {
            Some(entry) => {
                entry.worker = 0;
                entry.special_flag &= !queue_flag::QUEUED_FOR_BURST;
                entry.message.files = entry.message.files.saturating_sub(finished.files_done);
                entry.message.file_size = entry.message.file_size.saturating_sub(finished.bytes_done);
                (entry.host_alias.clone(), entry.message.dir_id)
            }
            None => return Ok(()),
        };
        if finished.connected {
            self.update_host(&alias, HostStatus::LOCK_CON, |host| {
                host.connections = host.connections.saturating_add(1);
            })?;
        }
        if finished.files_done > 0 {
            self.dirty = true;
            self.account_files(&alias, dir_id, finished.files_done, finished.bytes_done, true)?;
        }
        match finished.result {
            Ok(()) => {
                self.queue.remove(finished.id);
                self.job_gone(&alias)?;
                self.dirty = true;
                report.delivered += 1;
                self.on_success(&alias, now)?;
                self.continue_or_close(finished.worker, now, report)?;
            }
            Err(error) => {
                report.failed += 1;
                if let Some(handle) = self.workers.get_mut(&finished.worker) {
                    handle.closing = true;
                }
                self.on_failure(finished.id, &alias, &error, finished.resume, now)?;
            }
        }
        Ok(())
    }

    fn on_success(&self, alias: &str, now: i64) -> Result<(), FdError> {
        let Some(index) = self.shared.hosts.position(alias) else {
            return Ok(());
        };
        let hosts = &self.shared.hosts;
        let step = hosts.update(index, HostStatus::LOCK_EC, |host| retry::count_success(host, now))?;
        let recovered = hosts.update(index, HostStatus::LOCK_HS, |host| retry::flag_success(host, step))?;
        if step.toggled_back {
            system_log!(info, "{alias}: switched back to the original host");
        }
        if recovered {
            system_log!(info, "{alias}: transfers working again");
        }
        Ok(())
    }

    fn on_failure(
        &mut self,
        id: QueueId,
        alias: &str,
        error: &TransferError,
        resume: Option<Resume>,
        now: i64,
    ) -> Result<(), FdError> {
        let kind = error.kind();
        match kind {
            ErrorKind::TransientTransport | ErrorKind::PermanentTransport => {
                let Some(index) = self.shared.hosts.position(alias) else {
                    return Ok(());
                };
                let hosts = &self.shared.hosts;
                let step = hosts.update(index, HostStatus::LOCK_EC, |host| {
                    retry::count_failure(host, error.code(), now)
                })?;
                let host = hosts.update(index, HostStatus::LOCK_HS, |host| {
                    retry::flag_failure(host, step);
                    host.clone()
                })?;
                transfer_log!(warn, "{alias}: {error}");
                if step.toggled {
                    system_log!(
                        warn,
                        "{alias}: {} errors, switched to {}",
                        host.max_errors,
                        host.active_hostname()
                    );
                } else if step.not_working {
                    system_log!(error, "{alias}: not working, next retry in {}s", host.retry_interval);
                }
                let permanent = kind == ErrorKind::PermanentTransport;
                let ageing = host.protocol_options & protocol_options::NO_AGEING_JOBS == 0;
                let Some(entry) = self.queue.get_mut(id) else {
                    return Ok(());
                };
                entry.retries += if permanent { 2 } else { 1 };
                entry.permanent_failures = if permanent { entry.permanent_failures + 1 } else { 0 };
                entry.resume = resume.filter(|_| host.file_size_offset != -1);
                entry.retry_at = if step.not_working {
                    now + i64::from(host.retry_interval)
                } else {
                    0
                };
                entry.msg_number = msg_number(&entry.message, entry.retries, ageing);
                let job_id = entry.message.name.job_id;
                let given_up = entry.permanent_failures >= 2;
                self.queue.reorder(id);
                self.dirty = true;
                let ages_out = self
                    .config
                    .job(job_id)
                    .is_some_and(|job| job.options.age_limit.is_some());
                if given_up && ages_out {
                    transfer_log!(warn, "{alias}: rejected twice, message deleted");
                    self.discard(id, DeleteReason::AgeOutput, Some(OutputType::AgeLimitDelete), now)?;
                }
            }
            ErrorKind::LocalIo => self.quarantine(id, alias, error, now)?,
            ErrorKind::Configuration => {
                system_log!(error, "{alias}: {error}, message dropped");
                self.discard(id, DeleteReason::DelQueuedFile, None, now)?;
            }
            ErrorKind::Shutdown | ErrorKind::InvariantViolation => {
                tracing::debug!(host = alias, %error, "transfer interrupted, message stays queued");
            }
        }
        Ok(())
    }

    /// Moves the batch of a message that failed on local I/O into the store
    /// directory.
    fn quarantine(&mut self, id: QueueId, alias: &str, error: &TransferError, now: i64) -> Result<(), FdError> {
        let Some(entry) = self.queue.remove(id) else {
            return Ok(());
        };
        let message = entry.message;
        let name = message.name;
        let batch = self.shared.pool.batch_path(&name);
        if batch.is_dir() {
            let store = self
                .work
                .store_dir()
                .join(alias)
                .join(name.to_string().replace('/', "_"));
            let moved = fs::create_dir_all(self.work.store_dir().join(alias))
                .and_then(|()| fs::rename(&batch, &store));
            match moved {
                Ok(()) => {
                    system_log!(error, "{alias}: {error}; batch {name} moved to {}", store.display());
                    if let Err(cleanup) = self.shared.pool.remove_batch(&name) {
                        tracing::debug!(batch = %name, %cleanup, "pool parents not removed");
                    }
                }
                Err(move_error) => {
                    system_log!(error, "{alias}: {error}; batch {name} could not be stored: {move_error}");
                    self.discard_batch(&message, alias, DeleteReason::DelQueuedFile, None, now);
                }
            }
        } else {
            system_log!(warn, "{alias}: batch {name} vanished from the pool");
            self.shared.logs.delete(DeleteRecord {
                time: now,
                host_name: alias.to_string(),
                file_size: message.file_size,
                job_id: name.job_id,
                dir_id: message.dir_id,
                reason: DeleteReason::NoMessageFileDel,
                file_name: name.to_string(),
                proc_user: PROC_USER.to_string(),
            });
        }
        self.account_files(alias, message.dir_id, message.files, message.file_size, false)?;
        self.job_gone(alias)?;
        self.dirty = true;
        Ok(())
    }

    /// After a success: burst into the next message for the same
    /// connection, idle for keep-alive, or close.
    fn continue_or_close(&mut self, worker: u32, now: i64, report: &mut TickReport) -> Result<(), FdError> {
        let Some(handle) = self.workers.get(&worker) else {
            return Ok(());
        };
        let alias = handle.host_alias.clone();
        let slot = handle.slot;
        let bursts = handle.bursts;
        let key = handle.key.clone();
        let host = match self.host(&alias) {
            Some(host) if !self.stopping && host.is_schedulable() => host,
            _ => return self.close(worker),
        };
        let limit = if host.number_of_no_bursts > 0 {
            host.number_of_no_bursts
        } else {
            self.options.max_burst_rounds
        };
        let may_burst = host.protocol_options & protocol_options::DISABLE_BURSTING == 0 && bursts < limit;
        let next = if may_burst {
            self.next_for(&alias, &key, &host, now)
        } else {
            None
        };
        if let Some(next) = next {
            let assigned = self.assign(worker, next, &host, true)?;
            if assigned {
                self.update_host(&alias, LockSlot::WHOLE, |host| {
                    host.burst2_counter = host.burst2_counter.saturating_add(1);
                })?;
                report.bursts += 1;
                return Ok(());
            }
        }
        if host.keep_connected == 0 {
            return self.close(worker);
        }
        if let Some(handle) = self.workers.get_mut(&worker) {
            handle.idle_until = now + i64::from(host.keep_connected);
        }
        self.update_host(&alias, HostStatus::lock_job(slot), |host| {
            host.job_status[slot].connect_status = ConnectStatus::KeepAlive;
        })?;
        self.sync_idle_flag(&alias)
    }

    /// First waiting message for `alias` that can travel over `key`.
    fn next_for(&self, alias: &str, key: &ConnectionKey, host: &HostStatus, now: i64) -> Option<QueueId> {
        let hostname = connect_hostname(host);
        self.queue.next_admissible(|entry| {
            entry.host_alias == alias
                && entry.retry_at <= now
                && self.config.job(entry.message.name.job_id).is_some_and(|job| {
                    removal(entry, job, host, now).is_none()
                        && job.recipient.to_target(hostname).connection_key() == *key
                })
        })
    }

    fn expire_idle(&mut self, now: i64) -> Result<(), FdError> {
        let expired: Vec<u32> = self
            .workers
            .iter()
            .filter(|(_, worker)| worker.idle())
            .filter(|(_, worker)| {
                self.stopping
                    || worker.idle_until <= now
                    || !self
                        .host(&worker.host_alias)
                        .is_some_and(|host| host.is_schedulable())
            })
            .map(|(id, _)| *id)
            .collect();
        for worker in expired {
            self.close(worker)?;
        }
        Ok(())
    }

    fn close(&mut self, worker: u32) -> Result<(), FdError> {
        let Some(handle) = self.workers.get_mut(&worker) else {
            return Ok(());
        };
        handle.closing = true;
        // A worker that already left has its Exited event queued.
        let _ = handle.commands.send(WorkerCommand::Close);
        let alias = handle.host_alias.clone();
        self.sync_idle_flag(&alias)
    }

    fn on_exited(&mut self, worker: u32) -> Result<(), FdError> {
        let Some(mut handle) = self.workers.remove(&worker) else {
            return Ok(());
        };
        if let Some(Err(_)) = handle.thread.take().map(JoinHandle::join) {
            system_log!(error, "worker for {} panicked", handle.host_alias);
        }
        if let Some(entry) = handle.running.and_then(|id| self.queue.get_mut(id)) {
            entry.worker = 0;
        }
        self.release(&handle.host_alias, handle.slot)?;
        self.sync_idle_flag(&handle.host_alias)
    }

    fn check_warn_times(&self, now: i64) -> Result<(), FdError> {
        let due: Vec<usize> = self
            .shared
            .hosts
            .snapshot()
            .iter()
            .enumerate()
            .filter(|(_, host)| {
                host.warn_time > 0
                    && host.last_connection > 0
                    && !host.has_status(host_status::HOST_WARN_TIME_REACHED)
                    && now - host.last_connection > host.warn_time
            })
            .map(|(index, _)| index)
            .collect();
        for index in due {
            let (reached, alias, warn_time) = self.shared.hosts.update(index, HostStatus::LOCK_HS, |host| {
                (retry::check_warn_time(host, now), host.host_alias.clone(), host.warn_time)
            })?;
            if reached {
                system_log!(warn, "{alias}: no successful transfer for more than {warn_time}s");
            }
        }
        Ok(())
    }

    fn schedule(&mut self, now: i64, report: &mut TickReport) -> Result<(), FdError> {
        let mut hosts: FxHashMap<String, Option<HostStatus>> = FxHashMap::default();
        for id in self.queue.ids() {
            let Some(entry) = self.queue.get(id) else {
                continue;
            };
            if entry.in_progress() {
                continue;
            }
            let alias = entry.host_alias.clone();
            let host = hosts
                .entry(alias.clone())
                .or_insert_with(|| self.host(&alias));
            let job = self.config.job(entry.message.name.job_id);
            let step = self.decide(entry, job, host.as_ref(), now);
            match step {
                Step::Skip => {}
                Step::Delete(reason, output) => {
                    self.discard(id, reason, output, now)?;
                    report.deleted += 1;
                }
                Step::Evict(worker) => self.close(worker)?,
                Step::Reuse(worker) => {
                    let Some(host) = hosts.get(&alias).cloned().flatten() else {
                        continue;
                    };
                    if self.assign(worker, id, &host, false)? {
                        report.started += 1;
                        self.clear_retry_request(&host)?;
                        hosts.remove(&alias);
                    }
                }
                Step::Start(slot) => {
                    let Some(host) = hosts.get(&alias).cloned().flatten() else {
                        continue;
                    };
                    if self.start_worker(id, &host, slot)? {
                        report.started += 1;
                        self.clear_retry_request(&host)?;
                    }
                    hosts.remove(&alias);
                }
            }
        }
        Ok(())
    }

    fn decide(&self, entry: &QueueEntry, job: Option<&Job>, host: Option<&HostStatus>, now: i64) -> Step {
        let (Some(job), Some(host)) = (job, host) else {
            return Step::Delete(DeleteReason::JidLookupFailureDel, None);
        };
        if let Some((reason, output)) = removal(entry, job, host, now) {
            return Step::Delete(reason, Some(output));
        }
        if !host.is_schedulable() {
            return Step::Skip;
        }
        let requested = host.special_flag & special_flag::RETRY_REQUESTED != 0;
        if !retry::retry_due(host, now) || (entry.retry_at > now && !requested) {
            return Step::Skip;
        }
        let alias = entry.host_alias.as_str();
        let sequence = host.protocol_options & protocol_options::USE_SEQUENCE_LOCKING != 0;
        if sequence
            && self
                .workers
                .values()
                .any(|worker| worker.host_alias == alias && worker.running.is_some())
        {
            return Step::Skip;
        }
        let key = job.recipient.to_target(connect_hostname(host)).connection_key();
        let mut other_idle = None;
        for (id, worker) in &self.workers {
            if worker.host_alias != alias || !worker.idle() {
                continue;
            }
            if worker.key == key {
                return Step::Reuse(*id);
            }
            other_idle = Some(*id);
        }
        if host.active_transfers >= host.allowed_transfers {
            // An idle connection to another target holds the last slot.
            return other_idle.map_or(Step::Skip, Step::Evict);
        }
        if self.options.max_connections > 0 && self.workers.len() >= self.options.max_connections {
            return Step::Skip;
        }
        host.free_slot().map_or(Step::Skip, Step::Start)
    }

    fn assignment(&self, id: QueueId, entry: &QueueEntry, job: Job, host: &HostStatus, burst: bool) -> Assignment {
        Assignment {
            id,
            message: entry.message,
            target: job.recipient.to_target(connect_hostname(host)),
            options: session_options(host, &job, self.debug),
            rules: Arc::clone(&self.rules),
            simulate: host.has_status(host_status::SIMULATE_SEND_MODE),
            resume: entry.resume.clone().filter(|_| host.file_size_offset != -1),
            burst,
            job,
        }
    }

    /// Hands message `id` to the idle or just finished `worker`.
    fn assign(&mut self, worker: u32, id: QueueId, host: &HostStatus, burst: bool) -> Result<bool, FdError> {
        let Some(entry) = self.queue.get(id) else {
            return Ok(false);
        };
        let Some(job) = self.config.job(entry.message.name.job_id).cloned() else {
            return Ok(false);
        };
        let name = entry.message.name;
        let assignment = self.assignment(id, entry, job, host, burst);
        let Some(handle) = self.workers.get_mut(&worker) else {
            return Ok(false);
        };
        if handle
            .commands
            .send(WorkerCommand::Run(Box::new(assignment)))
            .is_err()
        {
            handle.closing = true;
            return Ok(false);
        }
        handle.running = Some(id);
        handle.idle_until = 0;
        handle.bursts = if burst { handle.bursts + 1 } else { 0 };
        let (alias, slot) = (handle.host_alias.clone(), handle.slot);
        if let Some(entry) = self.queue.get_mut(id) {
            entry.worker = worker;
            if burst {
                entry.special_flag |= queue_flag::QUEUED_FOR_BURST;
            }
        }
        self.claim_slot(&alias, slot, worker, &name)?;
        self.sync_idle_flag(&alias)?;
        Ok(true)
    }

    /// Starts a worker in `slot` for message `id`.
    fn start_worker(&mut self, id: QueueId, host: &HostStatus, slot: usize) -> Result<bool, FdError> {
        let Some(entry) = self.queue.get(id) else {
            return Ok(false);
        };
        let Some(job) = self.config.job(entry.message.name.job_id).cloned() else {
            return Ok(false);
        };
        let name = entry.message.name;
        let alias = entry.host_alias.clone();
        let assignment = self.assignment(id, entry, job, host, false);
        let key = assignment.target.connection_key();

        self.next_worker = self.next_worker.wrapping_add(1).max(1);
        let worker_id = self.next_worker;
        self.update_host(&alias, HostStatus::LOCK_CON, |host| {
            host.active_transfers += 1;
        })?;
        self.claim_slot(&alias, slot, worker_id, &name)?;

        let (commands, inbox) = crossbeam_channel::unbounded();
        let worker = Worker {
            id: worker_id,
            host_alias: alias.clone(),
            slot,
            shared: Arc::clone(&self.shared),
            commands: inbox,
            events: self.events.clone(),
        };
        let thread = match worker.spawn(assignment) {
            Ok(thread) => thread,
            Err(source) => {
                let error = FdError::Spawn {
                    host_alias: alias.clone(),
                    source,
                };
                system_log!(error, "{error}");
                self.release(&alias, slot)?;
                return Ok(false);
            }
        };
        if let Some(entry) = self.queue.get_mut(id) {
            entry.worker = worker_id;
        }
        tracing::debug!(host = %alias, slot, worker = worker_id, batch = %name, "worker started");
        self.workers.insert(
            worker_id,
            WorkerHandle {
                host_alias: alias,
                slot,
                key,
                commands,
                running: Some(id),
                idle_until: 0,
                bursts: 0,
                closing: false,
                thread: Some(thread),
            },
        );
        Ok(true)
    }

    fn claim_slot(&self, alias: &str, slot: usize, worker: u32, name: &MessageName) -> Result<(), FdError> {
        self.update_host(alias, HostStatus::lock_job(slot), |host| {
            let job = &mut host.job_status[slot];
            job.pid = i32::try_from(worker).unwrap_or(i32::MAX);
            job.job_id = name.job_id;
            job.unique_name = name.to_string();
        })?;
        Ok(())
    }

    fn release(&self, alias: &str, slot: usize) -> Result<(), FdError> {
        self.update_host(alias, HostStatus::LOCK_CON, |host| {
            host.active_transfers = (host.active_transfers - 1).max(0);
        })?;
        self.update_host(alias, HostStatus::lock_job(slot), |host| {
            host.job_status[slot].clear();
        })?;
        Ok(())
    }

    fn clear_retry_request(&self, host: &HostStatus) -> Result<(), FdError> {
        if host.special_flag & special_flag::RETRY_REQUESTED == 0 {
            return Ok(());
        }
        self.update_host(&host.host_alias, LockSlot::WHOLE, |host| {
            host.special_flag &= !special_flag::RETRY_REQUESTED;
        })?;
        Ok(())
    }

    fn sync_idle_flag(&self, alias: &str) -> Result<(), FdError> {
        let idle = self
            .workers
            .values()
            .any(|worker| worker.host_alias == alias && worker.idle());
        self.update_host(alias, LockSlot::WHOLE, |host| {
            if idle {
                host.special_flag |= special_flag::KEEP_CON_IDLE;
            } else {
                host.special_flag &= !special_flag::KEEP_CON_IDLE;
            }
        })?;
        Ok(())
    }

    /// Removes message `id` without transfer, logging every file. Returns the
    /// number of files deleted.
    fn discard(
        &mut self,
        id: QueueId,
        reason: DeleteReason,
        output: Option<OutputType>,
        now: i64,
    ) -> Result<usize, FdError> {
        let Some(entry) = self.queue.remove(id) else {
            return Ok(0);
        };
        let message = entry.message;
        let deleted = self.discard_batch(&message, &entry.host_alias, reason, output, now);
        self.account_files(&entry.host_alias, message.dir_id, message.files, message.file_size, false)?;
        self.job_gone(&entry.host_alias)?;
        self.dirty = true;
        Ok(deleted)
    }

    fn discard_batch(
        &self,
        message: &JobMessage,
        host_alias: &str,
        reason: DeleteReason,
        output: Option<OutputType>,
        now: i64,
    ) -> usize {
        let name = message.name;
        let files = self.shared.pool.files(&name).unwrap_or_default();
        for file in &files {
            self.shared.logs.delete(DeleteRecord {
                time: now,
                host_name: host_alias.to_string(),
                file_size: file.size,
                job_id: name.job_id,
                dir_id: message.dir_id,
                reason,
                file_name: file.name.clone(),
                proc_user: PROC_USER.to_string(),
            });
            if let Some(output_type) = output {
                self.shared.logs.output(OutputRecord {
                    time: now,
                    job_id: name.job_id,
                    dir_id: message.dir_id,
                    input_time: name.creation_time,
                    split_job_counter: name.split_job_counter,
                    unique_number: name.unique_number,
                    file_size: file.size,
                    host_name: host_alias.to_string(),
                    output_type,
                    file_name: file.name.clone(),
                    archive_dir: None,
                });
            }
        }
        if let Err(error) = self.shared.pool.remove_batch(&name) {
            tracing::warn!(batch = %name, %error, "deleted batch not removed");
        }
        if !files.is_empty() {
            transfer_log!(
                info,
                "{}: deleted {} files of {name} ({})",
                if host_alias.is_empty() { "-" } else { host_alias },
                files.len(),
                reason.as_str()
            );
        }
        files.len()
    }

    fn host(&self, alias: &str) -> Option<HostStatus> {
        let index = self.shared.hosts.position(alias)?;
        self.shared.hosts.get(index).ok()
    }

    /// Updates the record of `alias`; `None` when the host is not in the
    /// array (any more).
    fn update_host<T>(
        &self,
        alias: &str,
        slot: LockSlot,
        f: impl FnOnce(&mut HostStatus) -> T,
    ) -> Result<Option<T>, FdError> {
        match self.shared.hosts.position(alias) {
            Some(index) => Ok(Some(self.shared.hosts.update(index, slot, f)?)),
            None => Ok(None),
        }
    }

    fn account_queued(&self, entry: &QueueEntry) -> Result<(), FdError> {
        let files = i32::try_from(entry.message.files).unwrap_or(i32::MAX);
        let bytes = entry.message.file_size;
        // `jobs_queued` has a single writer.
        self.update_host(&entry.host_alias, HostStatus::LOCK_TFC, |host| {
            host.total_file_counter = host.total_file_counter.saturating_add(files);
            host.total_file_size = host.total_file_size.saturating_add(bytes);
            host.jobs_queued = host.jobs_queued.saturating_add(1);
        })?;
        Ok(())
    }

    /// Files left the queue, delivered or not.
    fn account_files(&self, alias: &str, dir_id: u32, files: u32, bytes: u64, delivered: bool) -> Result<(), FdError> {
        let count = i32::try_from(files).unwrap_or(i32::MAX);
        self.update_host(alias, HostStatus::LOCK_TFC, |host| {
            host.total_file_counter = (host.total_file_counter - count).max(0);
            host.total_file_size = host.total_file_size.saturating_sub(bytes);
            if host.total_file_counter == 0 {
                host.total_file_size = 0;
            }
            if delivered {
                host.file_counter_done = host.file_counter_done.saturating_add(files);
                host.bytes_send = host.bytes_send.saturating_add(bytes);
            }
        })?;
        let Some(dsa) = &self.dsa else {
            return Ok(());
        };
        let index = self
            .config
            .dir_by_id(dir_id)
            .and_then(|dir| dsa.position(&dir.status.dir_alias))
            .or_else(|| dsa.snapshot().iter().position(|dir| dir.dir_id == dir_id));
        if let Some(index) = index {
            dsa.update(index, DirStatus::LOCK_QUEUE, |dir| dir.unqueue_files(files, bytes))?;
        }
        Ok(())
    }

    fn job_gone(&self, alias: &str) -> Result<(), FdError> {
        self.update_host(alias, HostStatus::LOCK_TFC, |host| {
            host.jobs_queued = host.jobs_queued.saturating_sub(1);
        })?;
        Ok(())
    }

    fn publish(&mut self) -> Result<(), FdError> {
        let queued = self.queue.len();
        if let Some(paused) = self.backpressure.observe(queued) {
            if paused {
                system_log!(warn, "{queued} messages queued, distribution paused");
            } else {
                system_log!(info, "queue down to {queued} messages, distribution resumed");
            }
        }
        let Some(afd) = self.afd.as_ref().filter(|afd| !afd.is_empty()) else {
            return Ok(());
        };
        let paused = self.backpressure.engaged();
        let transfers = self
            .workers
            .values()
            .filter(|worker| worker.running.is_some())
            .count();
        afd.update(0, AfdStatus::LOCK_AMG_JOBS, |afd| {
            if paused {
                afd.amg_jobs |= amg_jobs::PAUSE_DISTRIBUTION;
            } else {
                afd.amg_jobs &= !amg_jobs::PAUSE_DISTRIBUTION;
            }
            afd.jobs_in_queue = u32::try_from(queued).unwrap_or(u32::MAX);
            afd.no_of_transfers = i32::try_from(transfers).unwrap_or(i32::MAX);
        })?;
        Ok(())
    }

    fn set_active(&self, active: bool) -> Result<(), FdError> {
        if let Some(afd) = self.afd.as_ref().filter(|afd| !afd.is_empty()) {
            afd.update(0, LockSlot::WHOLE, |afd| afd.fd_active = active)?;
        }
        Ok(())
    }

    fn save_if_dirty(&mut self) -> Result<(), FdError> {
        if !self.dirty {
            return Ok(());
        }
        persist::save(&self.work.fd_msg_queue(), self.queue.iter().map(|(_, entry)| entry))?;
        self.dirty = false;
        Ok(())
    }
}

/// Real host name connections to `host` use; the alias when none is set.
fn connect_hostname(host: &HostStatus) -> &str {
    let name = host.active_hostname();
    if name.is_empty() { &host.host_alias } else { name }
}

/// Why `entry` must be removed rather than sent, if it must.
fn removal(entry: &QueueEntry, job: &Job, host: &HostStatus, now: i64) -> Option<(DeleteReason, OutputType)> {
    let keep_data = host.has_status(host_status::DO_NOT_DELETE_DATA);
    if host.has_status(host_status::HOST_CONFIG_HOST_DISABLED) && !keep_data {
        return Some((DeleteReason::HostDisabledDel, OutputType::HostDisabledDelete));
    }
    if age_expired(job, &entry.message, host, now) {
        return Some((DeleteReason::AgeOutput, OutputType::AgeLimitDelete));
    }
    if job.options.delete {
        return Some((DeleteReason::UserDel, OutputType::OtherProcDelete));
    }
    None
}

fn age_expired(job: &Job, message: &JobMessage, host: &HostStatus, now: i64) -> bool {
    job.options
        .age_limit
        .is_some_and(|limit| limit > 0 && now - message.name.creation_time > i64::from(limit))
        && !host.has_status(host_status::DO_NOT_DELETE_DATA)
}

fn session_options(host: &HostStatus, job: &Job, debug: bool) -> SessionOptions {
    let defaults = SessionOptions::default();
    let transfers = u64::from(host.active_transfers.max(1).unsigned_abs());
    SessionOptions {
        block_size: usize::try_from(host.block_size)
            .ok()
            .filter(|&size| size > 0)
            .unwrap_or(defaults.block_size),
        transfer_timeout: Duration::from_secs(u64::try_from(host.transfer_timeout).unwrap_or(0)),
        rate_limit: NonZeroU64::new(u64::from(host.transfer_rate_limit) * 1024 / transfers),
        create_target_dir: job.options.create_target_dir,
        keep_time_stamp: host.protocol_options & protocol_options::KEEP_TIME_STAMP != 0,
        debug: debug || host.has_status(host_status::DEBUG_MODE),
    }
}

fn optional<R: status::Record>(path: &std::path::Path) -> Result<Option<StatusArray<R>>, FdError> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(StatusArray::open(path, Access::ReadWrite)?))
}

#[cfg(test)]
mod tests {
    use config::{JobOptions, Recipient};

    use super::*;

    fn job(age_limit: Option<u32>) -> Job {
        Job {
            job_id: 1,
            dir_id: 1,
            dir_alias: "in".into(),
            file_mask_id: 1,
            dir_config_id: 1,
            recipient: Recipient::parse("file://h1/out").unwrap(),
            options: JobOptions {
                age_limit,
                ..JobOptions::default()
            },
            salt: 0,
        }
    }

    fn message(creation_time: i64) -> JobMessage {
        JobMessage {
            name: MessageName {
                job_id: 1,
                counter: 0,
                creation_time,
                unique_number: 1,
                split_job_counter: 0,
            },
            dev: 0,
            dir_id: 1,
            file_size: 1,
            files: 1,
            priority: b'5',
            flag: 0,
        }
    }

    #[test]
    fn age_limit_counts_from_message_creation() {
        let host = HostStatus::new("h1");
        assert!(!age_expired(&job(Some(60)), &message(1000), &host, 1060));
        assert!(age_expired(&job(Some(60)), &message(1000), &host, 1061));
        assert!(!age_expired(&job(None), &message(0), &host, 1_000_000));
    }

    #[test]
    fn do_not_delete_data_keeps_old_messages() {
        let mut host = HostStatus::new("h1");
        host.host_status |= host_status::DO_NOT_DELETE_DATA;
        assert!(!age_expired(&job(Some(60)), &message(0), &host, 1000));
    }

    #[test]
    fn rate_limit_is_shared_by_active_transfers() {
        let mut host = HostStatus::new("h1");
        host.transfer_rate_limit = 100;
        assert_eq!(session_options(&host, &job(None), false).rate_limit, NonZeroU64::new(102_400));
        host.active_transfers = 4;
        assert_eq!(session_options(&host, &job(None), false).rate_limit, NonZeroU64::new(25_600));
        host.transfer_rate_limit = 0;
        assert_eq!(session_options(&host, &job(None), false).rate_limit, None);
    }

    #[test]
    fn connections_fall_back_to_the_alias() {
        let mut host = HostStatus::new("h1");
        host.real_hostname[0].clear();
        assert_eq!(connect_hostname(&host), "h1");
        host.real_hostname[0] = "node-a".into();
        assert_eq!(connect_hostname(&host), "node-a");
    }

    #[test]
    fn options_follow_afd_config() {
        let afd = AfdConfig {
            max_queue_length: 12,
            max_connections: 3,
            ..AfdConfig::default()
        };
        let options = FdOptions::from_config(&afd);
        assert_eq!(options.max_queue_length, 12);
        assert_eq!(options.max_connections, 3);
        assert_eq!(options.max_shutdown_time, Duration::from_secs(30));
    }
}
