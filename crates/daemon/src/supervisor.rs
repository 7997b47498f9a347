//! The supervisor: owns the fifos, runs AMG and FD on their own threads and
//! turns fifo records, signals and configuration changes into control
//! messages for them.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use amg::{Amg, AmgCommand, AmgControl, AmgOptions, ChannelSink, JobMessage, MessageReader};
use config::{AfdConfig, Diagnostics};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use fd::{CommandReader, DeleteReader, Fd, FdCommand, FdControl, FdOptions};
use logging::{RecordLogs, system_log};
use protocol::AdapterRegistry;
use status::{AfdStatus, Clock, LockSlot, StatusArray, SystemClock, WorkDir, current_pid, fifo};

use crate::command::{ACKN, AfdCommand};
use crate::db_update::{self, DbUpdate, DbUpdateReader};
use crate::error::DaemonError;
use crate::fifo as pipe;
use crate::lifecycle;
use crate::reload::Reloader;
use crate::signals::Signals;

/// How often configuration files are checked for changes by default.
pub const DIR_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Everything the supervisor needs besides the work directory.
#[derive(Clone, Debug)]
pub struct SupervisorOptions {
    /// Connectors used by workers and retrieval.
    pub registry: AdapterRegistry,
    /// Record log sinks.
    pub logs: RecordLogs,
    /// Time source shared by every component.
    pub clock: Arc<dyn Clock>,
    /// Loop period; the heartbeat advances once per period.
    pub tick_interval: Duration,
    /// Period of the configuration file check, zero disables it.
    pub dir_check_interval: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            registry: AdapterRegistry::with_local_adapters(),
            logs: RecordLogs::disabled(),
            clock: Arc::new(SystemClock),
            tick_interval: Duration::from_secs(1),
            dir_check_interval: DIR_CHECK_INTERVAL,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Component {
    Amg,
    Fd,
}

impl Component {
    const fn name(self) -> &'static str {
        match self {
            Self::Amg => "AMG",
            Self::Fd => "FD",
        }
    }
}

type Exit = (Component, Result<(), DaemonError>);

/// Fifos the supervisor reads.
const READ_FIFOS: [&str; 9] = [
    fifo::AFD_CMD,
    fifo::DB_UPDATE,
    fifo::AMG_CMD,
    fifo::FD_CMD,
    fifo::FD_DELETE,
    fifo::MSG,
    fifo::FD_WAKE_UP,
    fifo::SF_FIN,
    fifo::PROBE_ONLY,
];

/// Fifo reader channels, one per command fifo.
struct Inputs {
    afd_cmd: Receiver<Vec<u8>>,
    db_update: Receiver<Vec<u8>>,
    amg_cmd: Receiver<Vec<u8>>,
    fd_cmd: Receiver<Vec<u8>>,
    fd_delete: Receiver<Vec<u8>>,
    msg: Receiver<Vec<u8>>,
    wake_up: Receiver<Vec<u8>>,
    finished: Receiver<Vec<u8>>,
    probe: Receiver<Vec<u8>>,
}

impl Inputs {
    fn spawn(work: &WorkDir) -> Result<Self, DaemonError> {
        let open = |name: &str| pipe::spawn_reader(&work.fifo(name));
        Ok(Self {
            afd_cmd: open(fifo::AFD_CMD)?,
            db_update: open(fifo::DB_UPDATE)?,
            amg_cmd: open(fifo::AMG_CMD)?,
            fd_cmd: open(fifo::FD_CMD)?,
            fd_delete: open(fifo::FD_DELETE)?,
            msg: open(fifo::MSG)?,
            wake_up: open(fifo::FD_WAKE_UP)?,
            finished: open(fifo::SF_FIN)?,
            probe: open(fifo::PROBE_ONLY)?,
        })
    }

    /// Drops the channels and wakes every reader so it closes its fifo.
    fn release(self, work: &WorkDir) {
        drop(self);
        for name in READ_FIFOS {
            if let Err(error) = pipe::send(&work.fifo(name), &[0]) {
                tracing::debug!(fifo = name, %error, "reader not woken");
            }
        }
    }
}

/// One thing the loop woke up for.
enum Event {
    AfdCmd(Option<Vec<u8>>),
    DbUpdate(Option<Vec<u8>>),
    AmgCmd(Option<Vec<u8>>),
    FdCmd(Option<Vec<u8>>),
    FdDelete(Option<Vec<u8>>),
    Msg(Option<Vec<u8>>),
    WakeUp(Option<Vec<u8>>),
    Finished(Option<Vec<u8>>),
    Probe(Option<Vec<u8>>),
    Exited(Option<Exit>),
    Tick,
}

/// A running AFD instance.
pub struct Supervisor {
    work: WorkDir,
    options: SupervisorOptions,
    signals: Signals,
    status: StatusArray<AfdStatus>,
    reloader: Reloader,
    amg: Sender<AmgControl>,
    fd: Sender<FdControl>,
    messages: Sender<JobMessage>,
    exits: Receiver<Exit>,
    threads: Vec<(Component, JoinHandle<()>)>,
    max_shutdown_time: Duration,
    running: usize,
    failure: Option<DaemonError>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("work", &self.work)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Checks the work directory, publishes the configuration and starts
    /// AMG and FD.
    pub fn start(work: WorkDir, options: SupervisorOptions, signals: Signals) -> Result<Self, DaemonError> {
        work.create_all()
            .map_err(|source| DaemonError::io("create", work.root(), source))?;
        let afd = AfdConfig::load(&work.afd_config(), &mut Diagnostics::new())?;
        let node = lifecycle::node_name();
        lifecycle::check_start(&work, &afd, &node)?;
        let loaded = config::loader::load(&work)?;
        pipe::create_fifos(&work)?;
        let published = config::loader::publish(&work, &loaded)?;
        system_log!(
            info,
            "configuration loaded: {} hosts, {} directories, {} warnings",
            published.hosts.len(),
            published.dirs.len(),
            loaded.diagnostics.warnings()
        );

        let status = StatusArray::create(
            &work.afd_status(),
            &[AfdStatus {
                afd_pid: current_pid(),
                start_time: options.clock.unix_time(),
                hostname: node,
                ..AfdStatus::default()
            }],
        )?;

        let compiled = Arc::new(loaded.compiled.clone());
        let rules = Arc::new(loaded.rename_rules.clone());
        let (amg_tx, amg_rx) = crossbeam_channel::unbounded();
        let (fd_tx, fd_rx) = crossbeam_channel::unbounded();
        let (msg_tx, msg_rx) = crossbeam_channel::unbounded();
        let (exit_tx, exits) = crossbeam_channel::unbounded();

        let amg_options = AmgOptions {
            full_scan_timeout: loaded.afd.full_scan_timeout,
            tick_interval: options.tick_interval,
            ..AmgOptions::default()
        };
        let amg = Amg::new(
            work.clone(),
            Arc::clone(&compiled),
            Arc::clone(&options.clock),
            Arc::new(ChannelSink::new(msg_tx.clone())),
            options.logs.clone(),
            options.registry.clone(),
            amg_options,
        )?;
        let fd_options = FdOptions {
            tick_interval: options.tick_interval,
            ..FdOptions::from_config(&loaded.afd)
        };
        let mut fd = Fd::new(
            work.clone(),
            compiled,
            rules,
            Arc::clone(&options.clock),
            options.logs.clone(),
            options.registry.clone(),
            fd_options,
        )?;
        fd.connect_amg(amg_tx.clone());

        let mut reloader = Reloader::new(work.clone());
        reloader.connect_amg(amg_tx.clone());
        reloader.connect_fd(fd_tx.clone());

        let threads = vec![
            (Component::Amg, spawn_amg(amg, amg_rx, exit_tx.clone())?),
            (Component::Fd, spawn_fd(fd, msg_rx, fd_rx, exit_tx)?),
        ];
        system_log!(info, "AFD started in {} with pid {}", work.root().display(), current_pid());
        Ok(Self {
            work,
            options,
            signals,
            status,
            reloader,
            amg: amg_tx,
            fd: fd_tx,
            messages: msg_tx,
            exits,
            threads,
            max_shutdown_time: Duration::from_secs(loaded.afd.max_shutdown_time),
            running: 2,
            failure: None,
        })
    }

    /// The reload path, for callers that drive the supervisor directly.
    pub fn reloader(&mut self) -> &mut Reloader {
        &mut self.reloader
    }

    /// Serves the fifos until a stop is requested or a component dies,
    /// then shuts down.
    pub fn run(mut self) -> Result<(), DaemonError> {
        let work = self.work.clone();
        let mut inputs = Inputs::spawn(&self.work)?;
        let mut db_reader = DbUpdateReader::new();
        let mut fd_reader = CommandReader::new();
        let mut delete_reader = DeleteReader::new();
        let mut msg_reader = MessageReader::new();
        let tick = self.options.tick_interval;
        let mut last_beat = Instant::now();
        let mut last_check = Instant::now();

        while !self.signals.stop_requested() && self.failure.is_none() {
            let wait = tick.saturating_sub(last_beat.elapsed());
            let event = crossbeam_channel::select! {
                recv(inputs.afd_cmd) -> chunk => Event::AfdCmd(chunk.ok()),
                recv(inputs.db_update) -> chunk => Event::DbUpdate(chunk.ok()),
                recv(inputs.amg_cmd) -> chunk => Event::AmgCmd(chunk.ok()),
                recv(inputs.fd_cmd) -> chunk => Event::FdCmd(chunk.ok()),
                recv(inputs.fd_delete) -> chunk => Event::FdDelete(chunk.ok()),
                recv(inputs.msg) -> chunk => Event::Msg(chunk.ok()),
                recv(inputs.wake_up) -> chunk => Event::WakeUp(chunk.ok()),
                recv(inputs.finished) -> chunk => Event::Finished(chunk.ok()),
                recv(inputs.probe) -> chunk => Event::Probe(chunk.ok()),
                recv(self.exits) -> exit => Event::Exited(exit.ok()),
                default(wait) => Event::Tick,
            };
            match event {
                Event::AfdCmd(Some(chunk)) => {
                    for command in AfdCommand::decode_all(&chunk) {
                        self.on_afd_command(command);
                    }
                }
                Event::DbUpdate(Some(chunk)) => {
                    for request in db_reader.push(&chunk) {
                        let reply = self.reloader.apply(request.command);
                        if let Err(error) = db_update::answer(&self.work, request.pid, reply) {
                            system_log!(warn, "{error}");
                        }
                    }
                }
                Event::AmgCmd(Some(chunk)) => {
                    for command in AmgCommand::decode_all(&chunk) {
                        self.on_amg_command(command);
                    }
                }
                Event::FdCmd(Some(chunk)) => {
                    for command in fd_reader.push(&chunk) {
                        self.to_fd(FdControl::Command(command));
                    }
                }
                Event::FdDelete(Some(chunk)) => {
                    for command in delete_reader.push(&chunk) {
                        self.to_fd(FdControl::Delete(command));
                    }
                }
                Event::Msg(Some(chunk)) => {
                    for message in msg_reader.push(&chunk) {
                        if self.messages.send(message).is_err() {
                            system_log!(warn, "FD is gone, message dropped");
                        }
                    }
                }
                // Completion notes from outside wake FD like a wake-up does.
                Event::WakeUp(Some(_)) | Event::Finished(Some(_)) => self.to_fd(FdControl::Command(FdCommand::DataReady)),
                Event::Probe(Some(_)) | Event::Tick => {}
                Event::Exited(Some(exit)) => self.on_exit(exit),
                Event::Exited(None) => {}
                Event::AfdCmd(None) => inputs.afd_cmd = closed("afd_cmd"),
                Event::DbUpdate(None) => inputs.db_update = closed("db_update"),
                Event::AmgCmd(None) => inputs.amg_cmd = closed("amg_cmd"),
                Event::FdCmd(None) => inputs.fd_cmd = closed("fd_cmd"),
                Event::FdDelete(None) => inputs.fd_delete = closed("fd_delete"),
                Event::Msg(None) => inputs.msg = closed("msg"),
                Event::WakeUp(None) => inputs.wake_up = closed("fd_wake_up"),
                Event::Finished(None) => inputs.finished = closed("sf_fin"),
                Event::Probe(None) => inputs.probe = closed("probe_only"),
            }

            if last_beat.elapsed() >= tick {
                self.beat();
                last_beat = Instant::now();
            }
            if self.signals.take_reload() {
                system_log!(info, "reload requested by signal");
                self.reloader.apply(DbUpdate::RereadDirConfig(0));
                last_check = Instant::now();
            }
            let interval = self.options.dir_check_interval;
            if !interval.is_zero() && last_check.elapsed() >= interval {
                self.reloader.check_files();
                last_check = Instant::now();
            }
        }
        let outcome = self.shutdown();
        inputs.release(&work);
        outcome
    }

    fn on_afd_command(&mut self, command: AfdCommand) {
        match command {
            AfdCommand::Shutdown => {
                system_log!(info, "shutdown requested");
                self.signals.request_stop();
            }
            AfdCommand::IsAlive => {
                if let Err(error) = pipe::send(&self.work.fifo(fifo::AFD_RESP), &[ACKN]) {
                    tracing::debug!(%error, "liveness answer not delivered");
                }
            }
            AfdCommand::Reload => {
                self.reloader.apply(DbUpdate::RereadDirConfig(0));
            }
        }
    }

    fn on_amg_command(&mut self, command: AmgCommand) {
        match command {
            AmgCommand::Stop => {
                system_log!(info, "stop requested on amg_cmd");
                self.signals.request_stop();
            }
            AmgCommand::RereadDirConfig => {
                self.reloader.apply(DbUpdate::RereadDirConfig(0));
            }
            AmgCommand::RereadHostConfig => {
                self.reloader.apply(DbUpdate::RereadHostConfig(0));
            }
            command => {
                if self.amg.send(AmgControl::Command(command)).is_err() {
                    system_log!(warn, "AMG is gone, {command:?} dropped");
                }
            }
        }
    }

    fn to_fd(&self, message: FdControl) {
        if self.fd.send(message).is_err() {
            system_log!(warn, "FD is gone, command dropped");
        }
    }

    fn on_exit(&mut self, (component, result): Exit) {
        self.running = self.running.saturating_sub(1);
        match result {
            Ok(()) => system_log!(error, "{} stopped unexpectedly", component.name()),
            Err(error) => system_log!(error, "{} failed: {error}", component.name()),
        }
        self.failure = Some(DaemonError::Thread {
            component: component.name(),
        });
    }

    fn beat(&self) {
        let beat = self.status.update(0, LockSlot::WHOLE, |status| {
            status.heartbeat = status.heartbeat.wrapping_add(1);
        });
        if let Err(error) = beat {
            system_log!(warn, "heartbeat not written: {error}");
        }
    }

    /// Stops both components, waiting up to `MAX_SHUTDOWN_TIME` plus one
    /// tick for them to finish. The fifos stay open until this returns.
    fn shutdown(mut self) -> Result<(), DaemonError> {
        system_log!(info, "stopping AFD");
        let _ = self.amg.send(AmgControl::Command(AmgCommand::Stop));
        let _ = self.fd.send(FdControl::Stop);
        let deadline = Instant::now() + self.max_shutdown_time + self.options.tick_interval;
        while self.running > 0 {
            match self.exits.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok((component, result)) => {
                    self.running -= 1;
                    if let Err(error) = result {
                        system_log!(error, "{} failed while stopping: {error}", component.name());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    system_log!(warn, "{} components still running, abandoning them", self.running);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        if self.running == 0 {
            for (component, thread) in self.threads.drain(..) {
                if thread.join().is_err() {
                    system_log!(error, "{} thread panicked", component.name());
                }
            }
        }
        let cleared = self.status.update(0, LockSlot::WHOLE, |status| {
            status.afd_pid = 0;
            status.amg_active = false;
            status.fd_active = false;
            status.no_of_transfers = 0;
        });
        if let Err(error) = cleared {
            system_log!(warn, "afd.status not cleared: {error}");
        }
        system_log!(info, "AFD stopped");
        match self.failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn closed(name: &str) -> Receiver<Vec<u8>> {
    system_log!(warn, "reader of {name}.fifo ended");
    crossbeam_channel::never()
}

fn spawn_amg(
    mut amg: Amg,
    control: Receiver<AmgControl>,
    exits: Sender<Exit>,
) -> Result<JoinHandle<()>, DaemonError> {
    thread::Builder::new()
        .name("amg".to_string())
        .spawn(move || {
            let result = amg.run(&control).map_err(DaemonError::from);
            let _ = exits.send((Component::Amg, result));
        })
        .map_err(|source| DaemonError::io("start thread", "amg", source))
}

fn spawn_fd(
    mut fd: Fd,
    messages: Receiver<JobMessage>,
    control: Receiver<FdControl>,
    exits: Sender<Exit>,
) -> Result<JoinHandle<()>, DaemonError> {
    thread::Builder::new()
        .name("fd".to_string())
        .spawn(move || {
            let result = fd.run(&messages, &control).map_err(DaemonError::from);
            let _ = exits.send((Component::Fd, result));
        })
        .map_err(|source| DaemonError::io("start thread", "fd", source))
}
