//! `udc` and `uhc`: ask the running supervisor to re-read DIR_CONFIG or
//! HOST_CONFIG and report the outcome.
//!
//! Exit status: 0 clean, 2 with warnings, 3 with errors, 255 when the
//! request could not be made.

use std::ffi::OsString;
use std::io::Write;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches};
use config::{DirConfigResult, DirReloadReply, HostReloadReply};
use daemon::{DbUpdate, Reply};

use crate::{CliError, base_command, exit, parse, verbose_arg, work_dir};

/// How long the tools wait for the reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs `udc` with `arguments`.
pub fn run_udc<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let command = base_command("udc", "Re-read DIR_CONFIG in a running AFD").arg(verbose_arg());
    let matches = match parse(command, arguments, stdout, stderr) {
        Ok(matches) => matches,
        Err(status) => return status,
    };
    let verbose = verbosity(&matches);
    finish("udc", request(&matches, DbUpdate::RereadDirConfig(verbose)), stdout, stderr)
}

/// Runs `uhc` with `arguments`.
pub fn run_uhc<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let command = base_command("uhc", "Re-read HOST_CONFIG in a running AFD")
        .arg(verbose_arg())
        .arg(
            Arg::new("write")
                .long("write")
                .short('W')
                .action(ArgAction::SetTrue)
                .help("Write the host status array back to HOST_CONFIG instead."),
        );
    let matches = match parse(command, arguments, stdout, stderr) {
        Ok(matches) => matches,
        Err(status) => return status,
    };
    let request_kind = if matches.get_flag("write") {
        DbUpdate::HostConfigUpdate
    } else {
        DbUpdate::RereadHostConfig(verbosity(&matches))
    };
    finish("uhc", request(&matches, request_kind), stdout, stderr)
}

fn verbosity(matches: &ArgMatches) -> u8 {
    matches.get_count("verbose").min(2)
}

fn request(matches: &ArgMatches, command: DbUpdate) -> Result<Reply, CliError> {
    let work = work_dir(matches)?;
    Ok(daemon::db_update::request(&work, command, REPLY_TIMEOUT)?)
}

fn finish<Out: Write, Err: Write>(
    name: &str,
    outcome: Result<Reply, CliError>,
    stdout: &mut Out,
    stderr: &mut Err,
) -> i32 {
    match outcome {
        Ok(reply) => {
            let _ = writeln!(stdout, "{}", describe(reply));
            reply_status(reply)
        }
        Err(error) => {
            let _ = writeln!(stderr, "{name}: {error}");
            exit::INTERNAL
        }
    }
}

/// One line summarising `reply`.
#[must_use]
pub fn describe(reply: Reply) -> String {
    match reply {
        Reply::Host(HostReloadReply { result, warnings }) => format!("{result} ({warnings} warnings)"),
        Reply::Dir(DirReloadReply {
            result,
            warnings,
            jobs_added_or_changed,
            jobs_removed,
        }) => format!(
            "{result} ({jobs_added_or_changed} jobs added or changed, {jobs_removed} removed, {warnings} warnings)"
        ),
    }
}

/// Exit status for `reply`.
#[must_use]
pub const fn reply_status(reply: Reply) -> i32 {
    match reply {
        Reply::Dir(reply) if reply.result.is_failure() => exit::ERRORS,
        Reply::Dir(DirReloadReply {
            result: DirConfigResult::UpdatedDcProblems,
            ..
        }) => exit::WARNINGS,
        reply if reply.warnings() > 0 => exit::WARNINGS,
        _ => exit::SUCCESS,
    }
}

#[cfg(test)]
mod tests {
    use config::HostConfigResult;

    use super::*;

    #[test]
    fn status_follows_the_reply() {
        let host = |warnings| {
            Reply::Host(HostReloadReply {
                result: HostConfigResult::DataChanged,
                warnings,
            })
        };
        assert_eq!(reply_status(host(0)), exit::SUCCESS);
        assert_eq!(reply_status(host(3)), exit::WARNINGS);

        let dir = |result| {
            Reply::Dir(DirReloadReply {
                result,
                warnings: 0,
                jobs_added_or_changed: 2,
                jobs_removed: 1,
            })
        };
        assert_eq!(reply_status(dir(DirConfigResult::Updated)), exit::SUCCESS);
        assert_eq!(reply_status(dir(DirConfigResult::AccessError)), exit::ERRORS);
        assert!(describe(dir(DirConfigResult::Updated)).contains("2 jobs added or changed, 1 removed"));
    }

    #[test]
    fn without_supervisor_the_request_is_internal() {
        let dir = tempfile::tempdir().unwrap();
        let mut stderr = Vec::new();
        let status = run_udc(["udc", "-w", dir.path().to_str().unwrap()], &mut Vec::new(), &mut stderr);
        assert_eq!(status, exit::INTERNAL);
        assert!(!stderr.is_empty());
    }
}
