//! `afd`: start, stop, probe and initialise an AFD instance.
//!
//! | flag | action | exit |
//! |---|---|---|
//! | `-a` (default) | run the supervisor in the foreground | 0 after shutdown |
//! | `-c` | probe | 5 active, 10 not active, 9 not responding |
//! | `-C` | probe, start when not active | as `-c`, 0 after a run |
//! | `-s`, `-S` | shut down (`-S` silently) | 0, 10, 9 |
//! | `-i`, `-I` | initialise (`-I` also wipes queue and pool) | 0, 5 |

use std::ffi::OsString;
use std::io::Write;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgGroup, ArgMatches};
use config::{AfdConfig, Diagnostics};
use daemon::{Liveness, Signals, Supervisor, SupervisorOptions};
use logging::RecordLogs;
use status::WorkDir;

use crate::{CliError, base_command, exit, parse, report, work_dir};

const NAME: &str = "afd";

/// How long a probe waits for the answer.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    Start,
    Check,
    CheckStart,
    Shutdown { silent: bool },
    Initialize { full: bool },
}

fn command() -> clap::Command {
    let flag = |id: &'static str, short: char, help: &'static str| {
        Arg::new(id).short(short).help(help).action(ArgAction::SetTrue)
    };
    base_command(NAME, "Automatic File Distributor supervisor")
        .arg(flag("start", 'a', "Start AFD in the foreground (default)."))
        .arg(flag("check", 'c', "Report whether AFD is active."))
        .arg(flag("check-start", 'C', "Start AFD unless it is active."))
        .arg(flag("shutdown", 's', "Shut AFD down."))
        .arg(flag("silent-shutdown", 'S', "Shut AFD down without output."))
        .arg(flag("init", 'i', "Remove the status files before the next start."))
        .arg(flag("full-init", 'I', "Like -i, also removing the queue and the pool."))
        .group(
            ArgGroup::new("mode")
                .args(["start", "check", "check-start", "shutdown", "silent-shutdown", "init", "full-init"])
                .multiple(false),
        )
}

fn mode(matches: &ArgMatches) -> Mode {
    let set = |id: &str| matches.get_flag(id);
    if set("check") {
        Mode::Check
    } else if set("check-start") {
        Mode::CheckStart
    } else if set("shutdown") {
        Mode::Shutdown { silent: false }
    } else if set("silent-shutdown") {
        Mode::Shutdown { silent: true }
    } else if set("init") {
        Mode::Initialize { full: false }
    } else if set("full-init") {
        Mode::Initialize { full: true }
    } else {
        Mode::Start
    }
}

/// Runs `afd` with `arguments`.
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
    match execute(&matches, stdout) {
        Ok(status) => status,
        Err(error) => report(NAME, &error, stderr),
    }
}

fn execute<Out: Write>(matches: &ArgMatches, stdout: &mut Out) -> Result<i32, CliError> {
    let work = work_dir(matches)?;
    match mode(matches) {
        Mode::Start => start(work),
        Mode::Check => check(&work, stdout),
        Mode::CheckStart => match daemon::probe(&work, PROBE_TIMEOUT)? {
            Liveness::NotActive => start(work),
            _ => check(&work, stdout),
        },
        Mode::Shutdown { silent } => {
            let afd = AfdConfig::load(&work.afd_config(), &mut Diagnostics::new())?;
            let timeout = Duration::from_secs(afd.max_shutdown_time) * 2 + PROBE_TIMEOUT;
            daemon::request_shutdown(&work, timeout)?;
            if !silent {
                writeln!(stdout, "AFD in {} shut down", work.root().display())?;
            }
            Ok(exit::SUCCESS)
        }
        Mode::Initialize { full } => {
            daemon::initialize(&work, full)?;
            writeln!(stdout, "AFD work directory {} initialised", work.root().display())?;
            Ok(exit::SUCCESS)
        }
    }
}

fn check<Out: Write>(work: &WorkDir, stdout: &mut Out) -> Result<i32, CliError> {
    let root = work.root().display();
    let (text, status) = match daemon::probe(work, PROBE_TIMEOUT)? {
        Liveness::Active => ("is active", exit::AFD_IS_ACTIVE),
        Liveness::NotActive => ("is not active", exit::AFD_IS_NOT_ACTIVE),
        Liveness::NotResponding => ("is not responding", exit::AFD_NOT_RESPONDING),
    };
    writeln!(stdout, "AFD in {root} {text}")?;
    Ok(status)
}

fn start(work: WorkDir) -> Result<i32, CliError> {
    work.create_all()
        .map_err(|source| CliError::Refused(format!("cannot create {}: {source}", work.root().display())))?;
    let log_dir = work.log_dir();
    let _logging = logging::init(Some(&log_dir))?;
    let options = SupervisorOptions {
        logs: RecordLogs::files(&log_dir)?,
        ..SupervisorOptions::default()
    };
    let signals = Signals::install()?;
    Supervisor::start(work, options, signals)?.run()?;
    Ok(exit::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(args: &[&str]) -> ArgMatches {
        command().try_get_matches_from(args).unwrap()
    }

    #[test]
    fn default_mode_starts() {
        assert_eq!(mode(&matches(&["afd", "-w", "/tmp/afd"])), Mode::Start);
        assert_eq!(mode(&matches(&["afd", "-S"])), Mode::Shutdown { silent: true });
        assert_eq!(mode(&matches(&["afd", "-I"])), Mode::Initialize { full: true });
    }

    #[test]
    fn modes_are_exclusive() {
        assert!(command().try_get_matches_from(["afd", "-c", "-s"]).is_err());
    }

    #[test]
    fn check_reports_not_active() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let status = run(["afd", "-w", root, "-c"], &mut stdout, &mut stderr);
        assert_eq!(status, exit::AFD_IS_NOT_ACTIVE);
        assert!(String::from_utf8(stdout).unwrap().contains("is not active"));

        let status = run(["afd", "-w", root, "-s"], &mut Vec::new(), &mut stderr);
        assert_eq!(status, exit::AFD_IS_NOT_ACTIVE);
    }

    #[test]
    fn disabled_work_directory() {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path());
        work.create_all().unwrap();
        std::fs::write(work.disabled_marker(), b"").unwrap();
        let mut stderr = Vec::new();
        let status = run(
            ["afd", "-w", dir.path().to_str().unwrap()],
            &mut Vec::new(),
            &mut stderr,
        );
        assert_eq!(status, exit::AFD_DISABLED_BY_SYSADM);
        assert!(String::from_utf8(stderr).unwrap().starts_with("afd: "));
    }
}
