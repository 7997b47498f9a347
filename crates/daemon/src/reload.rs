//! Re-reading the configuration while transfers run.
//!
//! A reload loads every configuration file, publishes the new status
//! arrays and registry, then hands the compiled jobs to AMG and FD. Workers
//! keep the job they were given; the next scheduling round sees the new
//! host settings through the rebuilt host array.

use std::fs;
use std::sync::Arc;
use std::time::SystemTime;

use amg::{AmgCommand, AmgControl};
use config::{
    DirConfigResult, DirReloadReply, HostConfigResult, HostReloadReply, LoadedConfig, Published,
};
use crossbeam_channel::Sender;
use fd::FdControl;
use logging::system_log;
use status::WorkDir;

use crate::db_update::{DbUpdate, Reply};

/// Applies reload requests and forwards the result to the components.
#[derive(Debug)]
pub struct Reloader {
    work: WorkDir,
    amg: Option<Sender<AmgControl>>,
    fd: Option<Sender<FdControl>>,
    stamps: Vec<Option<SystemTime>>,
}

impl Reloader {
    /// Reloader for `work` that informs nobody yet.
    #[must_use]
    pub fn new(work: WorkDir) -> Self {
        let mut reloader = Self {
            work,
            amg: None,
            fd: None,
            stamps: Vec::new(),
        };
        reloader.stamps = reloader.current_stamps();
        reloader
    }

    /// Sends installs and host-array notices to AMG.
    pub fn connect_amg(&mut self, amg: Sender<AmgControl>) {
        self.amg = Some(amg);
    }

    /// Sends installs to FD.
    pub fn connect_fd(&mut self, fd: Sender<FdControl>) {
        self.fd = Some(fd);
    }

    /// Applies `command` and returns the reply for the caller.
    pub fn apply(&mut self, command: DbUpdate) -> Reply {
        match command {
            DbUpdate::HostConfigUpdate => {
                let warnings = match config::loader::save_host_config(&self.work) {
                    Ok(()) => {
                        system_log!(info, "HOST_CONFIG rewritten from the host status array");
                        0
                    }
                    Err(error) => {
                        system_log!(error, "{error}");
                        1
                    }
                };
                self.stamps = self.current_stamps();
                Reply::Host(HostReloadReply {
                    result: HostConfigResult::NoChange,
                    warnings,
                })
            }
            DbUpdate::RereadHostConfig(_) => {
                self.notify_amg(AmgCommand::FsaAboutToChange);
                let reply = match self.reload() {
                    Ok((_, published, warnings)) => HostReloadReply {
                        result: published.host_result,
                        warnings,
                    },
                    Err(_) => HostReloadReply {
                        result: HostConfigResult::NoChange,
                        warnings: 1,
                    },
                };
                self.log_outcome(command, &reply.result.to_string(), reply.warnings);
                Reply::Host(reply)
            }
            DbUpdate::RereadDirConfig(_) | DbUpdate::DirConfigUpdate => {
                let reply = match self.reload() {
                    Ok((_, published, warnings)) => DirReloadReply {
                        result: published.dir_result,
                        warnings,
                        jobs_added_or_changed: count(published.jobs.added + published.jobs.changed),
                        jobs_removed: count(published.jobs.removed),
                    },
                    Err(result) => DirReloadReply {
                        result: DirConfigResult::from_code(result).unwrap_or(DirConfigResult::AccessError),
                        warnings: 0,
                        jobs_added_or_changed: 0,
                        jobs_removed: 0,
                    },
                };
                self.log_outcome(command, &reply.result.to_string(), reply.warnings);
                Reply::Dir(reply)
            }
        }
    }

    /// Reloads when a configuration file changed since the last reload.
    pub fn check_files(&mut self) -> Option<Reply> {
        let stamps = self.current_stamps();
        if stamps == self.stamps {
            return None;
        }
        system_log!(info, "configuration files changed on disk, reloading");
        Some(self.apply(DbUpdate::RereadDirConfig(0)))
    }

    /// Loads and publishes. On failure returns the DIR_CONFIG result code
    /// of the error.
    fn reload(&mut self) -> Result<(LoadedConfig, Published, i32), i32> {
        self.stamps = self.current_stamps();
        let loaded = match config::loader::load(&self.work) {
            Ok(loaded) => loaded,
            Err(error) => {
                system_log!(error, "configuration not reloaded: {error}");
                return Err(DirConfigResult::from_error(&error).code());
            }
        };
        let published = match config::loader::publish(&self.work, &loaded) {
            Ok(published) => published,
            Err(error) => {
                system_log!(error, "configuration not published: {error}");
                return Err(DirConfigResult::AccessError.code());
            }
        };
        let warnings = count(loaded.diagnostics.warnings());
        self.install(&loaded);
        Ok((loaded, published, warnings))
    }

    fn install(&self, loaded: &LoadedConfig) {
        let compiled = Arc::new(loaded.compiled.clone());
        if let Some(amg) = &self.amg {
            let sent = amg
                .send(AmgControl::Command(AmgCommand::RereadHostConfig))
                .and_then(|()| amg.send(AmgControl::Install(Arc::clone(&compiled))));
            if sent.is_err() {
                system_log!(warn, "AMG is gone, new configuration not installed there");
            }
        }
        if let Some(fd) = &self.fd {
            let install = FdControl::Install {
                config: compiled,
                rules: Arc::new(loaded.rename_rules.clone()),
            };
            if fd.send(install).is_err() {
                system_log!(warn, "FD is gone, new configuration not installed there");
            }
        }
    }

    fn notify_amg(&self, command: AmgCommand) {
        if let Some(amg) = &self.amg {
            let _ = amg.send(AmgControl::Command(command));
        }
    }

    fn log_outcome(&self, command: DbUpdate, result: &str, warnings: i32) {
        if command.verbosity() > 0 {
            system_log!(info, "{command:?}: {result} with {warnings} warnings");
        } else {
            tracing::debug!(?command, result, warnings, "reload done");
        }
    }

    fn current_stamps(&self) -> Vec<Option<SystemTime>> {
        [
            self.work.dir_config(),
            self.work.host_config(),
            self.work.afd_config(),
            self.work.rename_rule(),
        ]
        .iter()
        .map(|path| fs::metadata(path).and_then(|meta| meta.modified()).ok())
        .collect()
    }
}

fn count(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
