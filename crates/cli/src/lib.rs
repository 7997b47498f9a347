#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cli` holds the command-line front-ends of AFD. Every tool is a `run`
//! function taking an argument iterator plus handles for standard output and
//! error and returning the process exit status, so the binaries under
//! `src/bin/` stay one-liners and tests drive the tools in-process.
//!
//! | tool | module |
//! |---|---|
//! | `afd` | [`afd`] |
//! | `udc`, `uhc` | [`reload`] |
//! | `afdcmd` | [`afdcmd`] |
//! | `fsa_view`, `fra_view`, `afd_status` | [`view`] |
//!
//! # Design
//!
//! Parsing uses [`clap`]'s builder API. The work directory comes from
//! `-w/--work-dir` or, failing that, the `AFD_WORK_DIR` environment
//! variable. Failures are reported on stderr as one line and mapped to the
//! exit codes in [`exit`].
//!
//! # Examples
//!
//! ```
//! let mut stdout = Vec::new();
//! let mut stderr = Vec::new();
//! let status = cli::afd::run(["afd", "--version"], &mut stdout, &mut stderr);
//! assert_eq!(status, cli::exit::SUCCESS);
//! assert!(!stdout.is_empty());
//! ```

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command};
use status::WorkDir;

pub mod afd;
pub mod afdcmd;
mod error;
pub mod exit;
pub mod reload;
pub mod view;

pub use error::CliError;

/// Environment variable naming the work directory when `-w` is absent.
pub const WORK_DIR_ENV: &str = "AFD_WORK_DIR";

/// Converts a tool's status into the process exit code.
#[must_use]
pub fn exit_code_from(status: i32) -> ExitCode {
    ExitCode::from(u8::try_from(status).unwrap_or(u8::MAX))
}

/// The `-w/--work-dir` argument shared by every tool.
fn work_dir_arg() -> Arg {
    Arg::new("work-dir")
        .long("work-dir")
        .short('w')
        .value_name("DIR")
        .value_parser(clap::value_parser!(PathBuf))
        .help("AFD work directory (default: $AFD_WORK_DIR).")
}

fn base_command(name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .version(env!("CARGO_PKG_VERSION"))
        .about(about)
        .arg(work_dir_arg())
}

fn verbose_arg() -> Arg {
    Arg::new("verbose")
        .short('v')
        .action(ArgAction::Count)
        .help("Ask for a more detailed reply; may be given twice.")
}

fn work_dir(matches: &ArgMatches) -> Result<WorkDir, CliError> {
    matches
        .get_one::<PathBuf>("work-dir")
        .cloned()
        .or_else(|| std::env::var_os(WORK_DIR_ENV).map(PathBuf::from))
        .filter(|path| !path.as_os_str().is_empty())
        .map(WorkDir::new)
        .ok_or(CliError::NoWorkDir)
}

/// Parses `arguments`, or prints help, version or the usage error and
/// returns the status to exit with.
fn parse<I, S, Out, Err>(command: Command, arguments: I, stdout: &mut Out, stderr: &mut Err) -> Result<ArgMatches, i32>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    match command.try_get_matches_from(arguments) {
        Ok(matches) => Ok(matches),
        Err(error) => {
            let rendered = error.render().to_string();
            if error.use_stderr() {
                let _ = write!(stderr, "{rendered}");
                Err(exit::INCORRECT)
            } else {
                let _ = write!(stdout, "{rendered}");
                Err(exit::SUCCESS)
            }
        }
    }
}

/// Writes `error` as one line and returns its exit status.
fn report<Err: Write>(name: &str, error: &CliError, stderr: &mut Err) -> i32 {
    let _ = writeln!(stderr, "{name}: {error}");
    error.exit_status()
}
