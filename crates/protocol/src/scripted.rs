//! Connector whose behaviour is scripted per host, for tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::adapter::{Connector, RemoteEntry, SendRequest, Session};
use crate::error::TransferError;
use crate::progress::Progress;
use crate::scheme::Scheme;
use crate::target::{ConnectionKey, SessionOptions, Target};

/// A file the scripted connector accepted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Delivery {
    /// Real host name the session was opened to.
    pub host: String,
    /// Target directory at the time.
    pub dir: String,
    /// Name at the destination.
    pub name: String,
    /// Bytes accepted.
    pub bytes: u64,
}

#[derive(Default)]
struct Script {
    connect_failures: FxHashMap<String, VecDeque<fn(&str) -> TransferError>>,
    send_failures: FxHashMap<String, VecDeque<fn(&str) -> TransferError>>,
    send_delay: Duration,
    connections: Vec<String>,
    disconnects: usize,
    deliveries: Vec<Delivery>,
    remote_files: FxHashMap<String, Vec<(String, Vec<u8>)>>,
}

/// Connector whose outcomes are prepared by the test.
///
/// Clones share the script, so a test keeps one handle to inspect what the
/// engine did while the registry owns another.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl std::fmt::Debug for ScriptedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedConnector").finish_non_exhaustive()
    }
}

fn refused(host: &str) -> TransferError {
    TransferError::ConnectionRefused {
        host: host.to_string(),
    }
}

fn rejected(name: &str) -> TransferError {
    TransferError::RemoteRejected {
        name: name.to_string(),
        reason: "scripted rejection".into(),
    }
}

impl ScriptedConnector {
    /// Connector accepting everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        f(&mut self.script.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Refuses the next `times` connection attempts to `host`.
    pub fn refuse(&self, host: &str, times: usize) {
        self.with(|script| {
            let queue = script.connect_failures.entry(host.to_string()).or_default();
            queue.extend(std::iter::repeat_n(refused as fn(&str) -> TransferError, times));
        });
    }

    /// Rejects the next `times` files sent to `host`.
    pub fn reject_sends(&self, host: &str, times: usize) {
        self.with(|script| {
            let queue = script.send_failures.entry(host.to_string()).or_default();
            queue.extend(std::iter::repeat_n(rejected as fn(&str) -> TransferError, times));
        });
    }

    /// Makes every send take at least `delay`.
    pub fn set_send_delay(&self, delay: Duration) {
        self.with(|script| script.send_delay = delay);
    }

    /// Files served by `list` and `receive_file` for sessions to `host`.
    pub fn set_remote_files(&self, host: &str, files: Vec<(String, Vec<u8>)>) {
        self.with(|script| {
            script.remote_files.insert(host.to_string(), files);
        });
    }

    /// Hosts of every successful connect, in order.
    #[must_use]
    pub fn connections(&self) -> Vec<String> {
        self.with(|script| script.connections.clone())
    }

    /// Number of clean disconnects.
    #[must_use]
    pub fn disconnects(&self) -> usize {
        self.with(|script| script.disconnects)
    }

    /// Every accepted file, in order.
    #[must_use]
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.with(|script| script.deliveries.clone())
    }
}

impl Connector for ScriptedConnector {
    fn connect(
        &self,
        target: &Target,
        _options: &SessionOptions,
    ) -> Result<Box<dyn Session>, TransferError> {
        self.with(|script| {
            if let Some(failure) = script
                .connect_failures
                .get_mut(&target.host)
                .and_then(VecDeque::pop_front)
            {
                return Err(failure(&target.host));
            }
            script.connections.push(target.host.clone());
            Ok(())
        })?;
        Ok(Box::new(ScriptedSession {
            key: target.connection_key(),
            dir: target.path.clone(),
            connector: self.clone(),
        }))
    }
}

struct ScriptedSession {
    key: ConnectionKey,
    dir: String,
    connector: ScriptedConnector,
}

impl Session for ScriptedSession {
    fn scheme(&self) -> Scheme {
        self.key.scheme
    }

    fn key(&self) -> &ConnectionKey {
        &self.key
    }

    fn change_target(&mut self, target: &Target) -> Result<(), TransferError> {
        self.dir.clone_from(&target.path);
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
        let (failure, delay) = self.connector.with(|script| {
            let failure = script
                .send_failures
                .get_mut(&self.key.host)
                .and_then(VecDeque::pop_front);
            (failure, script.send_delay)
        });
        if let Some(failure) = failure {
            return Err(failure(request.remote_name));
        }
        progress.file_started(request.remote_name, size);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        progress.transferred(size);
        progress.file_finished();
        let delivery = Delivery {
            host: self.key.host.clone(),
            dir: self.dir.clone(),
            name: request.remote_name.to_string(),
            bytes: size,
        };
        self.connector
            .with(|script| script.deliveries.push(delivery));
        Ok(size)
    }

    fn receive_file(
        &mut self,
        remote_name: &str,
        local_path: &Path,
        progress: &mut dyn Progress,
    ) -> Result<u64, TransferError> {
        let content = self.connector.with(|script| {
            script
                .remote_files
                .get(&self.key.host)
                .and_then(|files| files.iter().find(|(name, _)| name == remote_name))
                .map(|(_, content)| content.clone())
        });
        let content = content.ok_or_else(|| TransferError::RemoteNotFound {
            name: remote_name.to_string(),
        })?;
        progress.file_started(remote_name, content.len() as u64);
        std::fs::write(local_path, &content).map_err(|source| TransferError::WriteLocal {
            path: local_path.to_path_buf(),
            source,
        })?;
        progress.transferred(content.len() as u64);
        progress.file_finished();
        Ok(content.len() as u64)
    }

    fn list(&mut self) -> Result<Vec<RemoteEntry>, TransferError> {
        Ok(self.connector.with(|script| {
            script
                .remote_files
                .get(&self.key.host)
                .map(|files| {
                    files
                        .iter()
                        .map(|(name, content)| RemoteEntry {
                            name: name.clone(),
                            size: content.len() as i64,
                            mtime: None,
                        })
                        .collect()
                })
                .unwrap_or_default()
        }))
    }

    fn remove(&mut self, remote_name: &str) -> Result<(), TransferError> {
        self.connector.with(|script| {
            if let Some(files) = script.remote_files.get_mut(&self.key.host) {
                files.retain(|(name, _)| name != remote_name);
            }
        });
        Ok(())
    }

    fn disconnect(self: Box<Self>) -> Result<(), TransferError> {
        self.connector.with(|script| script.disconnects += 1);
        Ok(())
    }
}
