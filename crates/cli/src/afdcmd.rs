//! `afdcmd`: operator switches on hosts.
//!
//! Flags change `host_status` bits in the mapped host array under the
//! `LOCK_HS` region lock, then tell FD over `fd_cmd.fifo` so the next queue
//! walk sees the change. Enabling or disabling a host also rewrites
//! HOST_CONFIG, where that bit is persisted.

use std::ffi::OsString;
use std::io::{self, Write};
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches};
use daemon::{DaemonError, DbUpdate};
use fd::FdCommand;
use status::{Access, HOST_TWO, HostStatus, StatusArray, WorkDir, fifo, host_status};

use crate::{CliError, base_command, exit, parse, report, work_dir};

const NAME: &str = "afdcmd";

/// Operations requested on the command line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Actions {
    /// `-q`.
    pub start_queue: bool,
    /// `-Q`.
    pub stop_queue: bool,
    /// `-t`.
    pub start_transfer: bool,
    /// `-T`.
    pub stop_transfer: bool,
    /// `-e`.
    pub enable: bool,
    /// `-E`.
    pub disable: bool,
    /// `-s`.
    pub switch: bool,
    /// `-r`.
    pub retry: bool,
    /// `-d`.
    pub debug: bool,
    /// `-X`.
    pub simulate: bool,
}

/// What FD and HOST_CONFIG must hear about after [`apply`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Changes {
    /// Queue state changed.
    pub queue: bool,
    /// Transfer state changed.
    pub transfer: bool,
    /// A persisted bit changed.
    pub config: bool,
}

/// Applies `actions` to `host`.
pub fn apply(host: &mut HostStatus, actions: Actions) -> Result<Changes, CliError> {
    if actions.switch && host.toggle_str.is_empty() {
        return Err(CliError::Refused(format!(
            "host {} has no second real host name to switch to",
            host.host_alias
        )));
    }
    let mut changes = Changes::default();
    let original = host.host_status;
    let before = host.host_status;
    if actions.start_queue {
        host.host_status &= !(host_status::PAUSE_QUEUE_STAT | host_status::AUTO_PAUSE_QUEUE_STAT);
    }
    if actions.stop_queue {
        host.host_status |= host_status::PAUSE_QUEUE_STAT;
    }
    changes.queue = (before ^ host.host_status) & host_status::PAUSE_QUEUE_STAT != 0;

    let before = host.host_status;
    if actions.start_transfer {
        host.host_status &= !host_status::STOP_TRANSFER_STAT;
    }
    if actions.stop_transfer {
        host.host_status |= host_status::STOP_TRANSFER_STAT;
    }
    if actions.enable {
        host.host_status &= !host_status::HOST_CONFIG_HOST_DISABLED;
    }
    if actions.disable {
        host.host_status |= host_status::HOST_CONFIG_HOST_DISABLED;
    }
    let flipped = before ^ host.host_status;
    changes.transfer = flipped & (host_status::STOP_TRANSFER_STAT | host_status::HOST_CONFIG_HOST_DISABLED) != 0;

    if actions.switch {
        host.toggle();
        if host.host_toggle == HOST_TWO {
            host.host_status |= host_status::HOST_TWO_FLAG;
        } else {
            host.host_status &= !host_status::HOST_TWO_FLAG;
        }
        changes.transfer = true;
    }
    if actions.debug {
        host.host_status ^= host_status::DEBUG_MODE;
    }
    if actions.simulate {
        host.host_status ^= host_status::SIMULATE_SEND_MODE;
        changes.transfer = true;
    }
    changes.config = (original ^ host.host_status) & host_status::PERSISTED != 0;
    Ok(changes)
}

fn command() -> clap::Command {
    let flag = |id: &'static str, short: char, help: &'static str| {
        Arg::new(id).short(short).help(help).action(ArgAction::SetTrue)
    };
    base_command(NAME, "Switch queue, transfer and host states")
        .arg(flag("start-queue", 'q', "Start the queue.").conflicts_with("stop-queue"))
        .arg(flag("stop-queue", 'Q', "Stop the queue."))
        .arg(flag("start-transfer", 't', "Start transfers.").conflicts_with("stop-transfer"))
        .arg(flag("stop-transfer", 'T', "Stop transfers."))
        .arg(flag("enable", 'e', "Enable the host.").conflicts_with("disable"))
        .arg(flag("disable", 'E', "Disable the host."))
        .arg(flag("switch", 's', "Switch to the other real host name."))
        .arg(flag("retry", 'r', "Retry now instead of waiting for the retry interval."))
        .arg(flag("debug", 'd', "Toggle debug output for the host."))
        .arg(flag("simulate", 'X', "Toggle simulated sending."))
        .arg(
            Arg::new("hosts")
                .value_name("HOST")
                .num_args(1..)
                .required(true)
                .help("Host alias or position in the host array."),
        )
}

fn actions(matches: &ArgMatches) -> Actions {
    let set = |id: &str| matches.get_flag(id);
    Actions {
        start_queue: set("start-queue"),
        stop_queue: set("stop-queue"),
        start_transfer: set("start-transfer"),
        stop_transfer: set("stop-transfer"),
        enable: set("enable"),
        disable: set("disable"),
        switch: set("switch"),
        retry: set("retry"),
        debug: set("debug"),
        simulate: set("simulate"),
    }
}

/// Runs `afdcmd` with `arguments`.
pub fn run<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let matches = match parse(command(), arguments, stdout, stderr) {
        Ok(matches) => matches,
        Err(status) => return status,
    };
    match execute(&matches, stderr) {
        Ok(()) => exit::SUCCESS,
        Err(error) => report(NAME, &error, stderr),
    }
}

fn execute<Err: Write>(matches: &ArgMatches, stderr: &mut Err) -> Result<(), CliError> {
    let work = work_dir(matches)?;
    let actions = actions(matches);
    let hosts = StatusArray::<HostStatus>::open(&work.fsa_status(), Access::ReadWrite)?;
    let names: Vec<&String> = matches.get_many::<String>("hosts").into_iter().flatten().collect();
    let mut total = Changes::default();
    let mut notes = Vec::new();
    for name in names {
        let index = resolve(&hosts, name)?;
        // A refusal must leave the mapped record untouched.
        apply(&mut hosts.get(index)?, actions)?;
        let changes = hosts.update(index, HostStatus::LOCK_HS, |record| apply(record, actions))??;
        total.queue |= changes.queue;
        total.transfer |= changes.transfer;
        total.config |= changes.config;
        if actions.retry {
            notes.push(FdCommand::Retry(i32::try_from(index).unwrap_or(i32::MAX)));
        }
    }
    if total.queue {
        notes.push(FdCommand::Queue);
    }
    if total.transfer {
        notes.push(FdCommand::Transfer);
    }
    notify(&work, &notes, stderr)?;
    if total.config {
        persist(&work, stderr)?;
    }
    Ok(())
}

/// Position of `name`, an alias or a decimal index.
fn resolve(hosts: &StatusArray<HostStatus>, name: &str) -> Result<usize, CliError> {
    hosts
        .position(name)
        .or_else(|| name.parse::<usize>().ok().filter(|&index| index < hosts.len()))
        .ok_or_else(|| CliError::Unknown {
            kind: "host",
            name: name.to_string(),
        })
}

fn notify<Err: Write>(work: &WorkDir, notes: &[FdCommand], stderr: &mut Err) -> Result<(), CliError> {
    if notes.is_empty() {
        return Ok(());
    }
    let bytes: Vec<u8> = notes.iter().flat_map(|note| note.encode()).collect();
    match daemon::fifo::send(&work.fifo(fifo::FD_CMD), &bytes) {
        Ok(()) => Ok(()),
        Err(error) if matches!(error.kind(), io::ErrorKind::NotConnected | io::ErrorKind::NotFound) => {
            writeln!(stderr, "{NAME}: AFD is not active, the change applies at the next start")?;
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}

/// Rewrites HOST_CONFIG through the supervisor, or directly when none runs.
fn persist<Err: Write>(work: &WorkDir, stderr: &mut Err) -> Result<(), CliError> {
    match daemon::db_update::request(work, DbUpdate::HostConfigUpdate, Duration::from_secs(30)) {
        Ok(reply) if reply.warnings() > 0 => {
            writeln!(stderr, "{NAME}: HOST_CONFIG not rewritten, see the system log")?;
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(DaemonError::NotActive) => Ok(config::loader::save_host_config(work)?),
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostStatus {
        HostStatus::new("h1")
    }

    #[test]
    fn queue_and_transfer_bits() {
        let mut host = host();
        let changes = apply(
            &mut host,
            Actions {
                stop_queue: true,
                stop_transfer: true,
                ..Actions::default()
            },
        )
        .unwrap();
        assert!(changes.queue && changes.transfer);
        assert!(host.has_status(host_status::PAUSE_QUEUE_STAT));
        assert!(host.has_status(host_status::STOP_TRANSFER_STAT));
        assert!(!host.is_schedulable());

        let changes = apply(
            &mut host,
            Actions {
                stop_queue: true,
                ..Actions::default()
            },
        )
        .unwrap();
        assert!(!changes.queue);

        apply(
            &mut host,
            Actions {
                start_queue: true,
                start_transfer: true,
                ..Actions::default()
            },
        )
        .unwrap();
        assert!(host.is_schedulable());
    }

    #[test]
    fn disabling_is_persisted() {
        let mut host = host();
        let changes = apply(
            &mut host,
            Actions {
                disable: true,
                ..Actions::default()
            },
        )
        .unwrap();
        assert!(changes.config);
        assert!(host.has_status(host_status::HOST_CONFIG_HOST_DISABLED));
    }

    #[test]
    fn switch_needs_a_second_host() {
        let switch = Actions {
            switch: true,
            ..Actions::default()
        };
        assert!(apply(&mut host(), switch).is_err());

        let mut host = host();
        host.toggle_str = "[12]".to_string();
        host.real_hostname = ["one".into(), "two".into()];
        apply(&mut host, switch).unwrap();
        assert_eq!(host.active_hostname(), "two");
        apply(&mut host, switch).unwrap();
        assert_eq!(host.active_hostname(), "one");
    }

    #[test]
    fn commands_reach_the_host_array() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path());
        work.create_all().unwrap();
        StatusArray::create(&work.fsa_status(), &[HostStatus::new("h1"), HostStatus::new("h2")]).unwrap();

        let root = dir.path().to_str().unwrap();
        let mut stderr = Vec::new();
        let status = run(["afdcmd", "-w", root, "-Q", "h1", "1"], &mut Vec::new(), &mut stderr);
        assert_eq!(status, exit::SUCCESS, "{}", String::from_utf8_lossy(&stderr));
        let hosts = StatusArray::<HostStatus>::open(&work.fsa_status(), Access::ReadOnly).unwrap();
        assert!(hosts.snapshot().iter().all(|host| host.has_status(host_status::PAUSE_QUEUE_STAT)));

        let status = run(["afdcmd", "-w", root, "-q", "nope"], &mut Vec::new(), &mut stderr);
        assert_eq!(status, exit::INCORRECT);
    }
}
