//! `fsa_view`, `fra_view` and `afd_status`: read-only dumps of the host
//! and directory status arrays and of `afd.status`.
//!
//! Without an argument every record is listed one per line; with an alias
//! or position that record is printed field by field, or as JSON with
//! `--json`.

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;

use clap::{Arg, ArgAction, ArgMatches};
use serde_json::Value;
use status::{Access, DirStatus, HostStatus, Record, StatusArray};

use crate::{CliError, base_command, exit, parse, report, work_dir};

/// Records the viewers know how to summarise.
trait Viewed: Record + serde::Serialize {
    const KIND: &'static str;

    /// One line for the listing.
    fn summary(&self) -> String;
}

impl Viewed for HostStatus {
    const KIND: &'static str = "host";

    fn summary(&self) -> String {
        format!(
            "{:<16} {:<24} status={:#07x} queued={} active={}/{} errors={}",
            self.host_alias,
            self.active_hostname(),
            self.host_status,
            self.jobs_queued,
            self.active_transfers,
            self.allowed_transfers,
            self.error_counter
        )
    }
}

impl Viewed for DirStatus {
    const KIND: &'static str = "directory";

    fn summary(&self) -> String {
        format!(
            "{:<16} {:<40} queued={} errors={} state={:?}",
            self.dir_alias, self.url, self.files_queued, self.error_counter, self.dir_status
        )
    }
}

fn command(name: &'static str, about: &'static str) -> clap::Command {
    base_command(name, about)
        .arg(
            Arg::new("json")
                .long("json")
                .short('j')
                .action(ArgAction::SetTrue)
                .help("Print JSON."),
        )
        .arg(
            Arg::new("record")
                .value_name("ALIAS")
                .help("Alias or position of the record to show."),
        )
}

/// Runs `fsa_view` with `arguments`.
pub fn run_fsa_view<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    const NAME: &str = "fsa_view";
    let matches = match parse(command(NAME, "Show the host status array"), arguments, stdout, stderr) {
        Ok(matches) => matches,
        Err(status) => return status,
    };
    let outcome = work_dir(&matches).and_then(|work| show::<HostStatus, _>(&work.fsa_status(), &matches, stdout));
    match outcome {
        Ok(()) => exit::SUCCESS,
        Err(error) => report(NAME, &error, stderr),
    }
}

/// Runs `fra_view` with `arguments`.
pub fn run_fra_view<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    const NAME: &str = "fra_view";
    let matches = match parse(command(NAME, "Show the directory status array"), arguments, stdout, stderr) {
        Ok(matches) => matches,
        Err(status) => return status,
    };
    let outcome = work_dir(&matches).and_then(|work| show::<DirStatus, _>(&work.fra_status(), &matches, stdout));
    match outcome {
        Ok(()) => exit::SUCCESS,
        Err(error) => report(NAME, &error, stderr),
    }
}

/// Runs `afd_status` with `arguments`.
pub fn run_afd_status<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    const NAME: &str = "afd_status";
    let command = base_command(NAME, "Show the process status block").arg(
        Arg::new("json")
            .long("json")
            .short('j')
            .action(ArgAction::SetTrue)
            .help("Print JSON."),
    );
    let matches = match parse(command, arguments, stdout, stderr) {
        Ok(matches) => matches,
        Err(status) => return status,
    };
    let outcome = work_dir(&matches).and_then(|work| {
        let Some(status) = daemon::lifecycle::read_afd_status(&work)? else {
            writeln!(stdout, "AFD in {} is not active", work.root().display())?;
            return Ok(exit::AFD_IS_NOT_ACTIVE);
        };
        print_fields(&status, matches.get_flag("json"), stdout)?;
        Ok(exit::SUCCESS)
    });
    match outcome {
        Ok(status) => status,
        Err(error) => report(NAME, &error, stderr),
    }
}

fn show<R: Viewed, Out: Write>(path: &Path, matches: &ArgMatches, stdout: &mut Out) -> Result<(), CliError> {
    let array = StatusArray::<R>::open(path, Access::ReadOnly)?;
    let json = matches.get_flag("json");
    let Some(name) = matches.get_one::<String>("record") else {
        let records = array.snapshot();
        if json {
            serde_json::to_writer_pretty(&mut *stdout, &records)?;
            writeln!(stdout)?;
        } else {
            for (position, record) in records.iter().enumerate() {
                writeln!(stdout, "{position:>3} {}", record.summary())?;
            }
        }
        return Ok(());
    };
    let index = array
        .position(name)
        .or_else(|| name.parse::<usize>().ok().filter(|&index| index < array.len()))
        .ok_or_else(|| CliError::Unknown {
            kind: R::KIND,
            name: name.clone(),
        })?;
    print_fields(&array.get(index)?, json, stdout)
}

/// One record as JSON or as `field: value` lines.
fn print_fields<T: serde::Serialize, Out: Write>(record: &T, json: bool, stdout: &mut Out) -> Result<(), CliError> {
    if json {
        serde_json::to_writer_pretty(&mut *stdout, record)?;
        writeln!(stdout)?;
        return Ok(());
    }
    if let Value::Object(fields) = serde_json::to_value(record)? {
        for (field, value) in fields {
            match value {
                Value::String(text) => writeln!(stdout, "{field:<24}: {text}")?,
                other => writeln!(stdout, "{field:<24}: {other}")?,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use status::WorkDir;

    use super::*;

    fn work() -> (tempfile::TempDir, WorkDir) {
        let dir = tempfile::tempdir().unwrap();
        let work = WorkDir::new(dir.path());
        work.create_all().unwrap();
        let mut host = HostStatus::new("h1");
        host.jobs_queued = 3;
        StatusArray::create(&work.fsa_status(), &[host, HostStatus::new("h2")]).unwrap();
        (dir, work)
    }

    fn view(args: &[&str]) -> (i32, String) {
        let mut stdout = Vec::new();
        let status = run_fsa_view(args.iter().copied(), &mut stdout, &mut Vec::new());
        (status, String::from_utf8(stdout).unwrap())
    }

    #[test]
    fn listing_has_a_line_per_host() {
        let (dir, _work) = work();
        let (status, text) = view(&["fsa_view", "-w", dir.path().to_str().unwrap()]);
        assert_eq!(status, exit::SUCCESS);
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().next().unwrap().contains("queued=3"));
    }

    #[test]
    fn single_host_as_json() {
        let (dir, _work) = work();
        let (status, text) = view(&["fsa_view", "-w", dir.path().to_str().unwrap(), "--json", "1"]);
        assert_eq!(status, exit::SUCCESS);
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["host_alias"], "h2");
        assert_eq!(value["max_errors"], 10);
    }

    #[test]
    fn unknown_host_fails() {
        let (dir, _work) = work();
        let (status, _) = view(&["fsa_view", "-w", dir.path().to_str().unwrap(), "h9"]);
        assert_eq!(status, exit::INCORRECT);
    }

    #[test]
    fn afd_status_fields() {
        let (dir, work) = work();
        let root = dir.path().to_str().unwrap();
        let mut stdout = Vec::new();
        assert_eq!(
            run_afd_status(["afd_status", "-w", root], &mut stdout, &mut Vec::new()),
            exit::AFD_IS_NOT_ACTIVE
        );

        let status = status::AfdStatus {
            heartbeat: 7,
            hostname: "node1".to_string(),
            ..status::AfdStatus::default()
        };
        StatusArray::create(&work.afd_status(), &[status]).unwrap();
        let mut stdout = Vec::new();
        assert_eq!(
            run_afd_status(["afd_status", "-w", root], &mut stdout, &mut Vec::new()),
            exit::SUCCESS
        );
        let text = String::from_utf8(stdout).unwrap();
        assert!(text.lines().any(|line| line.starts_with("heartbeat") && line.ends_with(": 7")));
        assert!(text.lines().any(|line| line.ends_with(": node1")));
    }
}
