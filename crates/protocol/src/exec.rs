//! `exec://` adapter: runs a command for every file.
//!
//! The recipient path is the command line. `%s` is replaced by the pool
//! file's path; without it the path is appended. The command runs through
//! `sh -c` in the directory holding the file.

use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crate::adapter::{Connector, Deadline, SendRequest, Session};
use crate::error::TransferError;
use crate::progress::Progress;
use crate::scheme::Scheme;
use crate::target::{ConnectionKey, SessionOptions, Target};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Connector for [`Scheme::Exec`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecConnector;

impl Connector for ExecConnector {
    fn connect(
        &self,
        target: &Target,
        options: &SessionOptions,
    ) -> Result<Box<dyn Session>, TransferError> {
        if target.path.trim().is_empty() {
            return Err(TransferError::InvalidTarget {
                recipient: "exec://".into(),
                reason: "no command given".into(),
            });
        }
        Ok(Box::new(ExecSession {
            key: target.connection_key(),
            command: target.path.clone(),
            timeout: options.transfer_timeout,
        }))
    }
}

struct ExecSession {
    key: ConnectionKey,
    command: String,
    timeout: Duration,
}

/// Expands `%s` in `command` with `file`.
#[must_use]
pub fn expand_command(command: &str, file: &Path) -> String {
    let file = file.display().to_string();
    if command.contains("%s") {
        command.replace("%s", &file)
    } else {
        format!("{command} {file}")
    }
}

impl Session for ExecSession {
    fn scheme(&self) -> Scheme {
        Scheme::Exec
    }

    fn key(&self) -> &ConnectionKey {
        &self.key
    }

    fn change_target(&mut self, target: &Target) -> Result<(), TransferError> {
        self.command.clone_from(&target.path);
        Ok(())
    }

    fn send_file(
        &mut self,
        request: &SendRequest<'_>,
        progress: &mut dyn Progress,
    ) -> Result<u64, TransferError> {
        let size = std::fs::metadata(request.local_path)
            .map_err(|source| TransferError::OpenLocal {
                path: request.local_path.to_path_buf(),
                source,
            })?
            .len();
        progress.file_started(request.remote_name, size);

        let command = expand_command(&self.command, request.local_path);
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(request.local_path.parent().unwrap_or_else(|| Path::new("/")))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|error| TransferError::Exec {
                command: command.clone(),
                status: error.to_string(),
            })?;

        let deadline = Deadline::after(self.timeout);
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Err(timeout) = deadline.check("exec") {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(timeout);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(error) => {
                    return Err(TransferError::Exec {
                        command,
                        status: error.to_string(),
                    });
                }
            }
        };
        if !status.success() {
            return Err(TransferError::Exec {
                command,
                status: status.to_string(),
            });
        }
        progress.transferred(size);
        progress.file_finished();
        Ok(size)
    }

    fn disconnect(self: Box<Self>) -> Result<(), TransferError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::LockScheme;
    use crate::progress::NullProgress;

    fn run(command: &str, timeout: Duration) -> Result<u64, TransferError> {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("in.dat");
        std::fs::write(&file, b"abc").unwrap();
        let mut target = Target::local("");
        target.scheme = Scheme::Exec;
        target.path = command.to_string();
        let options = SessionOptions {
            transfer_timeout: timeout,
            ..SessionOptions::default()
        };
        let mut session = ExecConnector.connect(&target, &options)?;
        session.send_file(
            &SendRequest {
                local_path: &file,
                remote_name: "in.dat",
                resume_offset: 0,
                lock: &LockScheme::Off,
                mode: None,
            },
            &mut NullProgress,
        )
    }

    #[test]
    fn placeholder_is_expanded() {
        assert_eq!(
            expand_command("cp %s /tmp/", Path::new("/pool/a")),
            "cp /pool/a /tmp/"
        );
        assert_eq!(expand_command("ls", Path::new("/pool/a")), "ls /pool/a");
    }

    #[test]
    fn successful_command_reports_file_size() {
        assert_eq!(run("test -s %s", Duration::from_secs(5)).unwrap(), 3);
    }

    #[test]
    fn failing_command_is_permanent() {
        let error = run("false", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(error, TransferError::Exec { .. }));
    }

    #[test]
    fn slow_command_times_out() {
        let error = run("sleep 5 #", Duration::from_millis(100)).unwrap_err();
        assert!(matches!(error, TransferError::Timeout { operation: "exec", .. }));
    }
}
