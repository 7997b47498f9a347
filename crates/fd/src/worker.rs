//! Transfer workers.
//!
//! A worker owns one job-status slot of a host and one adapter session. It
//! delivers the batch it was started with, reports the outcome, then waits
//! for the scheduler to hand it the next batch for the same connection
//! (burst or keep-alive) or to close it. A failed attempt drops the
//! session and ends the worker.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use amg::{JobMessage, Pool};
use config::{Job, RenameRules};
use crossbeam_channel::{Receiver, Sender};
use logging::{OutputRecord, OutputType, ProductionRecord, RecordLogs, trans_db_log, transfer_log};
use protocol::{AdapterRegistry, Progress, SendRequest, Session, SessionOptions, Target, TransferError};
use status::{Clock, ConnectStatus, HostStatus, StatusArray};

use crate::archive::Archive;
use crate::names;
use crate::queue::{QueueId, Resume};

/// One batch handed to a worker.
#[derive(Clone, Debug)]
pub(crate) struct Assignment {
    pub id: QueueId,
    pub message: JobMessage,
    pub job: Job,
    pub rules: Arc<RenameRules>,
    pub target: Target,
    pub options: SessionOptions,
    pub simulate: bool,
    pub resume: Option<Resume>,
    pub burst: bool,
}

pub(crate) enum WorkerCommand {
    Run(Box<Assignment>),
    Close,
}

/// Outcome of one assignment.
#[derive(Debug)]
pub(crate) struct Finished {
    pub worker: u32,
    pub id: QueueId,
    pub files_done: u32,
    pub bytes_done: u64,
    pub result: Result<(), TransferError>,
    pub resume: Option<Resume>,
    pub connected: bool,
}

#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Finished(Finished),
    Exited { worker: u32 },
}

/// What every worker shares.
pub(crate) struct WorkerShared {
    pub hosts: Arc<StatusArray<HostStatus>>,
    pub registry: AdapterRegistry,
    pub pool: Pool,
    pub archive: Archive,
    pub logs: RecordLogs,
    pub clock: Arc<dyn Clock>,
    /// Set on shutdown; workers stop after the file in flight.
    pub stopping: AtomicBool,
}

pub(crate) struct Worker {
    pub id: u32,
    pub host_alias: String,
    pub slot: usize,
    pub shared: Arc<WorkerShared>,
    pub commands: Receiver<WorkerCommand>,
    pub events: Sender<WorkerEvent>,
}

impl Worker {
    pub(crate) fn spawn(self, first: Assignment) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("fd-{}-{}", self.host_alias, self.slot))
            .spawn(move || self.run(first))
    }

    fn run(self, first: Assignment) {
        let mut session: Option<Box<dyn Session>> = None;
        let mut next = Some(first);
        while let Some(assignment) = next.take() {
            let finished = self.deliver(&mut session, &assignment);
            let failed = finished.result.is_err();
            if failed {
                self.drop_session(&mut session);
            }
            if self.events.send(WorkerEvent::Finished(finished)).is_err() || failed {
                break;
            }
            match self.commands.recv() {
                Ok(WorkerCommand::Run(assignment)) => next = Some(*assignment),
                Ok(WorkerCommand::Close) | Err(_) => {}
            }
        }
        if let Some(session) = session {
            self.set_status(ConnectStatus::Closing);
            self.close(session);
        }
        let _ = self.events.send(WorkerEvent::Exited { worker: self.id });
    }

    fn drop_session(&self, session: &mut Option<Box<dyn Session>>) {
        if let Some(open) = session.take() {
            self.close(open);
        }
    }

    fn close(&self, session: Box<dyn Session>) {
        if let Err(error) = session.disconnect() {
            tracing::debug!(host = %self.host_alias, %error, "disconnect failed");
        }
    }

    fn set_status(&self, connect_status: ConnectStatus) {
        let slot = self.slot;
        let updated = self
            .shared
            .hosts
            .update_by_alias(&self.host_alias, HostStatus::lock_job(slot), |host| {
                host.job_status[slot].connect_status = connect_status;
            });
        if let Err(error) = updated {
            tracing::debug!(host = %self.host_alias, %error, "job status not updated");
        }
    }

    fn deliver(&self, session: &mut Option<Box<dyn Session>>, assignment: &Assignment) -> Finished {
        let mut finished = Finished {
            worker: self.id,
            id: assignment.id,
            files_done: 0,
            bytes_done: 0,
            result: Ok(()),
            resume: None,
            connected: false,
        };
        let alias = self.host_alias.as_str();
        let name = assignment.message.name;

        if session
            .as_ref()
            .is_some_and(|open| *open.key() != assignment.target.connection_key())
        {
            self.drop_session(session);
        }
        match session.as_mut() {
            Some(open) => {
                if let Err(error) = open.change_target(&assignment.target) {
                    finished.result = Err(error);
                    return finished;
                }
            }
            None => {
                self.set_status(ConnectStatus::Connecting);
                match self
                    .shared
                    .registry
                    .connect(&assignment.target, &assignment.options, assignment.simulate)
                {
                    Ok(opened) => {
                        finished.connected = true;
                        *session = Some(opened);
                    }
                    Err(error) => {
                        finished.result = Err(error);
                        return finished;
                    }
                }
            }
        }
        let Some(open) = session.as_mut() else {
            return finished;
        };

        let files = match self.shared.pool.files(&name) {
            Ok(files) => files,
            Err(source) => {
                finished.result = Err(TransferError::OpenLocal {
                    path: self.shared.pool.batch_path(&name),
                    source,
                });
                return finished;
            }
        };
        let slot = self.slot;
        let total: u64 = files.iter().map(|file| file.size).sum();
        let running = if assignment.burst {
            ConnectStatus::Burst
        } else {
            ConnectStatus::Transferring
        };
        let _ = self
            .shared
            .hosts
            .update_by_alias(alias, HostStatus::lock_job(slot), |host| {
                let job = &mut host.job_status[slot];
                job.connect_status = running;
                job.no_of_files = files.len() as u32;
                job.no_of_files_done = 0;
                job.file_size = total;
                job.file_size_done = 0;
            });

        let job = &assignment.job;
        for file in &files {
            if self.shared.stopping.load(Ordering::Relaxed) {
                finished.result = Err(TransferError::Interrupted);
                return finished;
            }
            let resume_offset = assignment
                .resume
                .as_ref()
                .filter(|resume| resume.file_name == file.name)
                .map_or(0, |resume| resume.offset);
            let local = names::local_name(&job.options.names, &assignment.rules, &file.name);
            if local != file.name {
                self.shared.logs.production(ProductionRecord {
                    time: self.shared.clock.unix_time(),
                    ratio: "1:1".to_string(),
                    job_id: job.job_id,
                    original_name: file.name.clone(),
                    new_name: local.clone(),
                    command: names::conversion(&job.options.names),
                });
            }
            let remote = names::remote_name(&job.options.names, &assignment.rules, &local);
            let request = SendRequest {
                local_path: &file.path,
                remote_name: &remote,
                resume_offset,
                lock: &job.options.lock,
                mode: job.options.chmod,
            };
            let mut progress = SlotProgress {
                hosts: &self.shared.hosts,
                host_alias: alias,
                slot,
                sent: 0,
            };
            let sent = match open.send_file(&request, &mut progress) {
                Ok(sent) => sent,
                Err(error) => {
                    finished.resume = Some(Resume {
                        file_name: file.name.clone(),
                        offset: resume_offset + progress.sent,
                    });
                    finished.result = Err(error);
                    return finished;
                }
            };
            let now = self.shared.clock.unix_time();
            if assignment.options.debug {
                trans_db_log!(debug, "{alias}: {} -> {remote} ({sent} bytes on the wire)", file.name);
            }
            transfer_log!(
                info,
                "{alias}: {remote} [{} bytes]{}",
                file.size,
                if assignment.burst { " [BURST]" } else { "" }
            );

            let archive_dir = match job.options.archive_time {
                Some(_) => match self.shared.archive.store(job, &file.path, &local, now) {
                    Ok(relative) => Some(relative.display().to_string()),
                    Err(error) => {
                        transfer_log!(warn, "{alias}: failed to archive {local}: {error}");
                        None
                    }
                },
                None => None,
            };
            if archive_dir.is_none() {
                match std::fs::remove_file(&file.path) {
                    Err(error) if error.kind() != io::ErrorKind::NotFound => {
                        tracing::warn!(path = %file.path.display(), %error, "delivered file not removed");
                    }
                    _ => {}
                }
            }
            self.shared.logs.output(OutputRecord {
                time: now,
                job_id: job.job_id,
                dir_id: assignment.message.dir_id,
                input_time: name.creation_time,
                split_job_counter: name.split_job_counter,
                unique_number: name.unique_number,
                file_size: file.size,
                host_name: alias.to_string(),
                output_type: OutputType::NormalDelivered,
                file_name: remote,
                archive_dir,
            });
            finished.files_done += 1;
            finished.bytes_done += file.size;
        }

        if let Err(error) = self.shared.pool.remove_batch(&name) {
            tracing::warn!(batch = %name, %error, "delivered batch not removed");
        }
        finished
    }
}

/// Mirrors a running transfer into the worker's job-status slot.
struct SlotProgress<'a> {
    hosts: &'a StatusArray<HostStatus>,
    host_alias: &'a str,
    slot: usize,
    sent: u64,
}

impl SlotProgress<'_> {
    fn update(&self, f: impl FnOnce(&mut status::JobStatus)) {
        let slot = self.slot;
        let updated = self
            .hosts
            .update_by_alias(self.host_alias, HostStatus::lock_job(slot), |host| {
                f(&mut host.job_status[slot]);
            });
        if let Err(error) = updated {
            tracing::debug!(host = self.host_alias, %error, "progress not recorded");
        }
    }
}

impl Progress for SlotProgress<'_> {
    fn file_started(&mut self, name: &str, size: u64) {
        self.update(|job| {
            job.file_name_in_use = name.to_string();
            job.file_size_in_use = size;
            job.file_size_in_use_done = 0;
        });
    }

    fn transferred(&mut self, bytes: u64) {
        self.sent += bytes;
        self.update(|job| {
            job.file_size_in_use_done += bytes;
            job.file_size_done += bytes;
            job.bytes_send += bytes;
        });
    }

    fn file_finished(&mut self) {
        self.update(|job| {
            job.no_of_files_done += 1;
            job.file_name_in_use.clear();
        });
    }
}
