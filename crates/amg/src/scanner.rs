//! One scan of one source directory.
//!
//! A scan walks `Idle → Scanning → Collecting → Dispatching → Idle` and
//! records each step in the directory's DSA record:
//!
//! - **Scanning** fetches remote sources into the incoming directory and
//!   lists the (local or incoming) directory once.
//! - **Collecting** classifies every file, deletes what the delete policy
//!   asks for, applies directory-level dupcheck and the copy limits, and
//!   holds the selection back while `accumulate` thresholds are unmet.
//! - **Dispatching** links the selection into one pool batch per job and
//!   emits one message per batch.
//!
//! Failures are counted in `error_counter`; three in a row set
//! `DIR_ERROR_SET`.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use config::{CompiledConfig, CompiledDir};
use logging::{
    DeleteReason, DeleteRecord, DistributionRecord, InputRecord, NO_HOST, RecordLogs,
    receive_log, system_log,
};
use protocol::AdapterRegistry;
use status::{
    Clock, DirStatus, HostStatus, RetrieveList, ScanState, StatusArray, StatusError, WorkDir,
    dir_flag, dir_options,
};

use crate::classify::{Candidate, Verdict, classify, queued_too_long};
use crate::dupcheck::{DupAction, DupFile, DupcheckStore};
use crate::error::ScanError;
use crate::message::{BATCHES_PER_COUNTER, JobMessage, MessageName, msg_flag};
use crate::pool::{Pool, link_or_copy, move_file};
use crate::retrieve::{RetrieveContext, retrieve};
use crate::schedule::next_check_time;
use crate::sink::MessageSink;

/// Consecutive failed scans that flag a directory as erroneous.
pub const SCAN_ERROR_THRESHOLD: u32 = 3;

/// Name recorded as `proc_user` in delete log entries written by scans.
const PROC_USER: &str = "amg";

/// State shared by every scanner thread.
pub struct ScanContext {
    /// Work directory.
    pub work: WorkDir,
    /// Directory status array, opened read-write.
    pub dsa: StatusArray<DirStatus>,
    /// Host status array, for retrieving directories.
    pub hosts: Option<StatusArray<HostStatus>>,
    /// Compiled configuration.
    pub config: Arc<CompiledConfig>,
    /// Pool directory.
    pub pool: Pool,
    /// Message destination.
    pub sink: Arc<dyn MessageSink>,
    /// Record logs.
    pub logs: RecordLogs,
    /// Duplicate store.
    pub dupcheck: DupcheckStore,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Connectors for retrieving directories.
    pub registry: AdapterRegistry,
    /// `FULL_SCAN_TIMEOUT` in seconds, 0 for none.
    pub full_scan_timeout: u64,
    unique: AtomicU32,
}

impl std::fmt::Debug for ScanContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanContext")
            .field("work", &self.work)
            .field("dirs", &self.config.dirs.len())
            .field("full_scan_timeout", &self.full_scan_timeout)
            .finish_non_exhaustive()
    }
}

impl ScanContext {
    /// Context for `config` inside `work`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        work: WorkDir,
        dsa: StatusArray<DirStatus>,
        hosts: Option<StatusArray<HostStatus>>,
        config: Arc<CompiledConfig>,
        sink: Arc<dyn MessageSink>,
        logs: RecordLogs,
        clock: Arc<dyn Clock>,
        registry: AdapterRegistry,
    ) -> Self {
        let pool = Pool::new(work.pool_dir());
        let seed = clock.unix_time() as u32 & 0xffff;
        Self {
            work,
            dsa,
            hosts,
            config,
            pool,
            sink,
            logs,
            dupcheck: DupcheckStore::new(),
            clock,
            registry,
            full_scan_timeout: 0,
            unique: AtomicU32::new(seed),
        }
    }

    fn next_unique(&self) -> u32 {
        self.unique.fetch_add(1, Ordering::Relaxed)
    }
}

/// Summary of one scan.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ScanReport {
    /// The directory was disabled or stopped.
    pub skipped: bool,
    /// Regular files seen.
    pub files_in_dir: u32,
    /// Bytes seen.
    pub bytes_in_dir: u64,
    /// Files picked up.
    pub files_taken: u32,
    /// Bytes picked up.
    pub bytes_taken: u64,
    /// Files removed by the delete policy or dupcheck.
    pub files_deleted: u32,
    /// Messages emitted.
    pub messages: u32,
    /// File entries across all emitted batches.
    pub files_queued: u32,
    /// Bytes across all emitted batches.
    pub bytes_queued: u64,
    /// Batches that could not be created.
    pub failed_batches: u32,
    /// `max_copied_files` or `max_copied_file_size` cut the scan short.
    pub max_copied: bool,
    /// The selection is held back by `accumulate`.
    pub accumulating: bool,
    /// Files fetched from the remote source first.
    pub retrieved: u32,
}

struct Listed {
    candidate: Candidate,
    path: PathBuf,
}

struct Selected {
    listed: Listed,
    groups: Vec<usize>,
    /// Directory dupcheck checksum, recorded once the file is dispatched.
    dup_crc: Option<u32>,
}

/// Scanner state kept between scans of one directory.
#[derive(Debug)]
pub struct DirScanner {
    alias: String,
    dir: usize,
    accumulating_since: Option<i64>,
    pub(crate) forced: bool,
}

impl DirScanner {
    /// Scanner for `config.dirs[dir]`.
    #[must_use]
    pub fn new(config: &CompiledConfig, dir: usize) -> Self {
        Self {
            alias: config.dirs[dir].status.dir_alias.clone(),
            dir,
            accumulating_since: None,
            forced: false,
        }
    }

    /// Directory alias.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub(crate) const fn dir_index(&self) -> usize {
        self.dir
    }

    pub(crate) fn rebind(&mut self, dir: usize) {
        self.dir = dir;
    }

    /// Whether the directory must be scanned at `now`.
    pub fn is_due(&self, ctx: &ScanContext, now: i64) -> bool {
        if self.forced {
            return true;
        }
        ctx.dsa
            .get_by_alias(&self.alias)
            .is_ok_and(|status| status.next_check_time <= now)
    }

    /// Runs one scan and records its outcome in the DSA.
    ///
    /// `paused` reflects `PAUSE_DISTRIBUTION`: nothing is dispatched and
    /// only queued-file deletion runs.
    pub fn scan(&mut self, ctx: &ScanContext, paused: bool) -> Result<ScanReport, ScanError> {
        self.forced = false;
        let now = ctx.clock.unix_time();
        let index = ctx.dsa.position(&self.alias).ok_or_else(|| StatusError::UnknownAlias {
            alias: self.alias.clone(),
        })?;
        let status = ctx.dsa.get(index)?;
        if status.has_flag(dir_flag::DIR_DISABLED | dir_flag::DIR_STOPPED) {
            ctx.dsa.update(index, DirStatus::LOCK_QUEUE, |dir| {
                dir.next_check_time = next_check_time(dir, now);
            })?;
            return Ok(ScanReport {
                skipped: true,
                ..ScanReport::default()
            });
        }
        let Some(compiled) = ctx.config.dirs.get(self.dir) else {
            return Err(StatusError::UnknownAlias {
                alias: self.alias.clone(),
            }
            .into());
        };

        set_state(ctx, index, ScanState::Scanning)?;
        let result = self.run(ctx, compiled, &status, index, paused, now);
        let finished = ctx.clock.unix_time();
        match &result {
            Ok(report) => record_success(ctx, index, report, finished)?,
            Err(error) => record_failure(ctx, index, error, finished)?,
        }
        result
    }

    fn run(
        &mut self,
        ctx: &ScanContext,
        compiled: &CompiledDir,
        status: &DirStatus,
        index: usize,
        paused: bool,
        now: i64,
    ) -> Result<ScanReport, ScanError> {
        let deadline = (ctx.full_scan_timeout > 0)
            .then(|| ctx.clock.unix_millis() + ctx.full_scan_timeout as i64 * 1000);
        let check_deadline = || match deadline {
            Some(limit) if ctx.clock.unix_millis() > limit => Err(ScanError::Timeout {
                dir_alias: self.alias.clone(),
                seconds: ctx.full_scan_timeout,
            }),
            _ => Ok(()),
        };

        let mut report = ScanReport::default();
        let remote = compiled.remote.is_some();
        let source = if remote {
            if !paused {
                let fetched = retrieve(
                    RetrieveContext {
                        work: &ctx.work,
                        registry: &ctx.registry,
                        hosts: ctx.hosts.as_ref(),
                    },
                    compiled,
                    status,
                    now,
                )?;
                report.retrieved = fetched.fetched as u32;
            }
            ctx.work.incoming_dir().join(&self.alias)
        } else {
            PathBuf::from(&compiled.location)
        };

        let listed = list_dir(&source, status.end_character >= 0, &check_deadline)?;
        report.files_in_dir = listed.len() as u32;
        report.bytes_in_dir = listed.iter().map(|entry| entry.candidate.size).sum();

        set_state(ctx, index, ScanState::Collecting)?;
        // Local directories that keep their files remember what was taken.
        let keeps_files = !remote && status.has_option(dir_options::DO_NOT_REMOVE);
        let mut seen = if keeps_files {
            let mut list = RetrieveList::load(&ctx.work.retrieve_list(&self.alias), now)?;
            list.begin_listing();
            Some(list)
        } else {
            None
        };

        let mut selected: Vec<Selected> = Vec::new();
        let mut selected_bytes = 0_u64;
        for entry in listed {
            check_deadline()?;
            if paused {
                if queued_too_long(status, &entry.candidate, now) {
                    delete_input(ctx, status, &entry, DeleteReason::DelQueuedFile, 0, now);
                    report.files_deleted += 1;
                }
                continue;
            }
            let groups = match classify(status, &compiled.groups, &entry.candidate, now) {
                Verdict::Take(groups) => groups,
                Verdict::Hold | Verdict::Ignore => continue,
                Verdict::Delete(reason) => {
                    delete_input(ctx, status, &entry, reason, 0, now);
                    report.files_deleted += 1;
                    continue;
                }
            };
            if let Some(list) = seen.as_mut() {
                let candidate = &entry.candidate;
                if !list.observe(&candidate.name, candidate.size as i64, Some(candidate.mtime), status.stupid_mode) {
                    continue;
                }
            }
            let mut dup_crc = None;
            if status.dup_check_timeout > 0 && status.dup_check_flag != 0 {
                let (crc, remembered) = ctx
                    .dupcheck
                    .lookup(
                        status.dir_id,
                        status.dup_check_flag,
                        DupFile {
                            name: &entry.candidate.name,
                            size: entry.candidate.size,
                            path: &entry.path,
                        },
                        now,
                    )
                    .map_err(|error| ScanError::pool("checksum", &entry.path, error))?;
                if remembered {
                    ctx.dupcheck.remember(status.dir_id, crc, status.dup_check_timeout, now);
                }
                let duplicate = remembered || selected.iter().any(|file| file.dup_crc == Some(crc));
                if duplicate && handle_duplicate(ctx, status, &entry, DupAction::from_flags(status.dup_check_flag), 0, now) {
                    report.files_deleted += 1;
                    continue;
                }
                dup_crc = Some(crc);
            }
            let size = entry.candidate.size;
            let files_full = status.max_copied_files > 0 && selected.len() >= status.max_copied_files as usize;
            let size_full = status.max_copied_file_size > 0
                && !selected.is_empty()
                && selected_bytes + size > status.max_copied_file_size as u64;
            if files_full || size_full {
                report.max_copied = true;
                break;
            }
            selected_bytes += size;
            selected.push(Selected {
                listed: entry,
                groups,
                dup_crc,
            });
        }

        if self.held_back(status, selected.len(), selected_bytes, now) {
            report.accumulating = true;
            return Ok(report);
        }
        if selected.is_empty() {
            if let Some(list) = seen.as_mut() {
                list.prune_unlisted();
                list.save()?;
            }
            return Ok(report);
        }

        set_state(ctx, index, ScanState::Dispatching)?;
        for crc in selected.iter().filter_map(|file| file.dup_crc) {
            ctx.dupcheck.remember(status.dir_id, crc, status.dup_check_timeout, now);
        }
        self.dispatch(ctx, compiled, status, &selected, now, &mut report)?;
        if let Some(list) = seen.as_mut() {
            for file in &selected {
                list.mark_retrieved(&file.listed.candidate.name);
            }
            list.prune_unlisted();
            list.save()?;
        }
        Ok(report)
    }

    /// Applies `accumulate` and `accumulate_size`. Either threshold
    /// releases the selection; so does `info_time` passing since the
    /// selection was first held.
    fn held_back(&mut self, status: &DirStatus, files: usize, bytes: u64, now: i64) -> bool {
        if status.accumulate == 0 && status.accumulate_size <= 0 {
            return false;
        }
        if files == 0 {
            self.accumulating_since = None;
            return false;
        }
        let count_met = status.accumulate > 0 && files >= status.accumulate as usize;
        let size_met = status.accumulate_size > 0 && bytes >= status.accumulate_size as u64;
        if count_met || size_met {
            self.accumulating_since = None;
            return false;
        }
        let since = *self.accumulating_since.get_or_insert(now);
        if status.info_time > 0 && now - since >= status.info_time {
            self.accumulating_since = None;
            return false;
        }
        true
    }

    fn dispatch(
        &self,
        ctx: &ScanContext,
        compiled: &CompiledDir,
        status: &DirStatus,
        selected: &[Selected],
        now: i64,
        report: &mut ScanReport,
    ) -> Result<(), ScanError> {
        let unique_number = ctx.next_unique();
        let counter = unique_number / BATCHES_PER_COUNTER;
        let dev = ctx.pool.device();
        let flag = if compiled.remote.is_some() {
            msg_flag::FROM_RETRIEVE
        } else {
            0
        };
        for file in selected {
            ctx.logs.input(InputRecord {
                time: now,
                dir_id: status.dir_id,
                file_size: file.listed.candidate.size,
                file_name: file.listed.candidate.name.clone(),
            });
            report.files_taken += 1;
            report.bytes_taken += file.listed.candidate.size;
        }

        // Per selected file: jobs it was queued for, and whether any batch failed.
        let mut job_ids: Vec<Vec<u32>> = vec![Vec::new(); selected.len()];
        let mut failed: Vec<bool> = vec![false; selected.len()];
        let mut split_job_counter = 0_u32;
        for (group_index, group) in compiled.groups.iter().enumerate() {
            let members: Vec<usize> = selected
                .iter()
                .enumerate()
                .filter(|(_, file)| file.groups.contains(&group_index))
                .map(|(position, _)| position)
                .collect();
            if members.is_empty() {
                continue;
            }
            for &job_id in &group.jobs {
                let Some(job) = ctx.config.job(job_id) else {
                    continue;
                };
                let mut batch: Vec<usize> = Vec::with_capacity(members.len());
                for &position in &members {
                    let listed = &selected[position].listed;
                    if let Some(dupcheck) = job.options.dupcheck {
                        let duplicate = ctx
                            .dupcheck
                            .check(
                                job_id,
                                dupcheck.flags,
                                dupcheck.timeout,
                                DupFile {
                                    name: &listed.candidate.name,
                                    size: listed.candidate.size,
                                    path: &listed.path,
                                },
                                now,
                            )
                            .map_err(|error| ScanError::pool("checksum", &listed.path, error))?;
                        if duplicate
                            && job_duplicate(ctx, status, listed, DupAction::from_flags(dupcheck.flags), job_id, now)
                        {
                            continue;
                        }
                    }
                    batch.push(position);
                }
                if batch.is_empty() {
                    continue;
                }

                let name = MessageName {
                    job_id,
                    counter,
                    creation_time: now,
                    unique_number,
                    split_job_counter,
                };
                split_job_counter += 1;
                let paths: Vec<&Path> = batch.iter().map(|&position| selected[position].listed.path.as_path()).collect();
                let files = match ctx.pool.create_batch(&name, &paths) {
                    Ok(files) => files,
                    Err(error) => {
                        system_log!(error, "{}: batch {name} for job {job_id:x} failed: {error}", self.alias);
                        report.failed_batches += 1;
                        for &position in &batch {
                            failed[position] = true;
                        }
                        continue;
                    }
                };
                let file_size: u64 = files.iter().map(|file| file.size).sum();
                let message = JobMessage {
                    name,
                    dev,
                    dir_id: status.dir_id,
                    file_size,
                    files: files.len() as u32,
                    priority: job.options.priority,
                    flag,
                };
                if let Err(source) = ctx.sink.send(&message) {
                    if let Err(cleanup) = ctx.pool.remove_batch(&name) {
                        tracing::warn!(batch = %name, %cleanup, "failed to remove unsent batch");
                    }
                    return Err(ScanError::Emit {
                        msg_name: name.to_string(),
                        source,
                    });
                }
                tracing::debug!(dir = %self.alias, msg = %name, files = files.len(), "message emitted");
                report.messages += 1;
                report.files_queued += files.len() as u32;
                report.bytes_queued += file_size;
                for &position in &batch {
                    job_ids[position].push(job_id);
                }
            }
        }

        let removes = compiled.remote.is_some() || !status.has_option(dir_options::DO_NOT_REMOVE);
        for (position, file) in selected.iter().enumerate() {
            let candidate = &file.listed.candidate;
            if !job_ids[position].is_empty() {
                ctx.logs.distribution(DistributionRecord {
                    time: now,
                    dir_id: status.dir_id,
                    unique_number,
                    file_size: candidate.size,
                    job_ids: job_ids[position].clone(),
                    file_name: candidate.name.clone(),
                });
            }
            // Keep a file whose every batch failed so the next scan retries it.
            let keep = failed[position] && job_ids[position].is_empty();
            if removes && !keep {
                if let Err(error) = fs::remove_file(&file.listed.path) {
                    receive_log!(warn, "{}: failed to remove {}: {error}", self.alias, candidate.name);
                }
            }
        }
        if report.messages > 0 {
            receive_log!(
                info,
                "{}: {} files ({} bytes) queued in {} messages",
                self.alias,
                report.files_taken,
                report.bytes_taken,
                report.messages
            );
        }
        Ok(())
    }
}

fn set_state(ctx: &ScanContext, index: usize, state: ScanState) -> Result<(), StatusError> {
    ctx.dsa
        .update(index, DirStatus::LOCK_QUEUE, |dir| dir.dir_status = state)
}

fn list_dir(
    source: &Path,
    wants_last_byte: bool,
    check_deadline: &dyn Fn() -> Result<(), ScanError>,
) -> Result<Vec<Listed>, ScanError> {
    let read_error = |error| ScanError::ReadDir {
        path: source.to_path_buf(),
        source: error,
    };
    let mut listed = Vec::new();
    for entry in fs::read_dir(source).map_err(read_error)? {
        check_deadline()?;
        let entry = entry.map_err(read_error)?;
        let path = entry.path();
        // Entries vanishing mid-scan are expected.
        let Ok(meta) = fs::metadata(&path) else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let opened = File::open(&path);
        let last_byte = match (&opened, wants_last_byte) {
            (Ok(file), true) => read_last_byte(file, meta.len()),
            _ => None,
        };
        listed.push(Listed {
            candidate: Candidate {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: meta.len(),
                mtime: meta.mtime(),
                readable: opened.is_ok(),
                last_byte,
            },
            path,
        });
    }
    listed.sort_by(|a, b| {
        (a.candidate.mtime, &a.candidate.name).cmp(&(b.candidate.mtime, &b.candidate.name))
    });
    Ok(listed)
}

fn read_last_byte(mut file: &File, len: u64) -> Option<u8> {
    if len == 0 {
        return None;
    }
    file.seek(SeekFrom::End(-1)).ok()?;
    let mut byte = [0_u8; 1];
    file.read_exact(&mut byte).ok()?;
    Some(byte[0])
}

fn delete_input(
    ctx: &ScanContext,
    status: &DirStatus,
    entry: &Listed,
    reason: DeleteReason,
    job_id: u32,
    now: i64,
) {
    if let Err(error) = fs::remove_file(&entry.path) {
        receive_log!(warn, "{}: failed to delete {}: {error}", status.dir_alias, entry.candidate.name);
        return;
    }
    receive_log!(
        info,
        "{}: deleted {} ({})",
        status.dir_alias,
        entry.candidate.name,
        reason.as_str()
    );
    ctx.logs.delete(DeleteRecord {
        time: now,
        host_name: NO_HOST.to_string(),
        file_size: entry.candidate.size,
        job_id,
        dir_id: status.dir_id,
        reason,
        file_name: entry.candidate.name.clone(),
        proc_user: PROC_USER.to_string(),
    });
}

/// Handles a directory-level duplicate; `true` when the file left the directory.
fn handle_duplicate(
    ctx: &ScanContext,
    status: &DirStatus,
    entry: &Listed,
    action: DupAction,
    job_id: u32,
    now: i64,
) -> bool {
    match action {
        DupAction::Delete => {
            delete_input(ctx, status, entry, DeleteReason::DupInput, job_id, now);
            true
        }
        DupAction::Store => {
            let target = store_path(ctx, status, &entry.candidate.name);
            match target.and_then(|target| move_file(&entry.path, &target)) {
                Ok(()) => receive_log!(warn, "{}: duplicate {} moved to store", status.dir_alias, entry.candidate.name),
                Err(error) => receive_log!(warn, "{}: failed to store duplicate {}: {error}", status.dir_alias, entry.candidate.name),
            }
            true
        }
        DupAction::Warn => {
            receive_log!(warn, "{}: duplicate {} passed on", status.dir_alias, entry.candidate.name);
            false
        }
    }
}

/// Handles a job-level duplicate; `true` when the job must skip the file.
///
/// The source file is shared with other jobs, so it is never removed here.
fn job_duplicate(
    ctx: &ScanContext,
    status: &DirStatus,
    entry: &Listed,
    action: DupAction,
    job_id: u32,
    now: i64,
) -> bool {
    let log_delete = || {
        ctx.logs.delete(DeleteRecord {
            time: now,
            host_name: NO_HOST.to_string(),
            file_size: entry.candidate.size,
            job_id,
            dir_id: status.dir_id,
            reason: DeleteReason::DupInput,
            file_name: entry.candidate.name.clone(),
            proc_user: PROC_USER.to_string(),
        });
    };
    match action {
        DupAction::Delete => {
            log_delete();
            true
        }
        DupAction::Store => {
            let stored = store_path(ctx, status, &entry.candidate.name)
                .and_then(|target| link_or_copy(&entry.path, &target));
            if let Err(error) = stored {
                receive_log!(warn, "{}: failed to store duplicate {}: {error}", status.dir_alias, entry.candidate.name);
            }
            log_delete();
            true
        }
        DupAction::Warn => {
            receive_log!(warn, "{}: duplicate {} for job {job_id:x} passed on", status.dir_alias, entry.candidate.name);
            false
        }
    }
}

fn store_path(ctx: &ScanContext, status: &DirStatus, name: &str) -> std::io::Result<PathBuf> {
    let dir = ctx.work.store_dir().join(&status.dir_alias);
    fs::create_dir_all(&dir)?;
    Ok(dir.join(name))
}

fn record_success(
    ctx: &ScanContext,
    index: usize,
    report: &ScanReport,
    now: i64,
) -> Result<(), StatusError> {
    ctx.dsa.update(index, DirStatus::LOCK_QUEUE, |dir| {
        dir.dir_status = ScanState::Idle;
        dir.files_in_dir = report.files_in_dir;
        dir.bytes_in_dir = report.bytes_in_dir;
        dir.files_received = dir.files_received.saturating_add(report.files_taken);
        dir.bytes_received = dir.bytes_received.saturating_add(report.bytes_taken);
        dir.queue_files(report.files_queued, report.bytes_queued);

        if dir.has_flag(dir_flag::DIR_ERROR_SET) {
            system_log!(info, "{}: scanning works again", dir.dir_alias);
        }
        dir.error_counter = 0;
        dir.dir_flag &= !dir_flag::DIR_ERROR_SET;

        if dir.last_retrieval == 0 {
            dir.last_retrieval = now;
        }
        if report.files_taken > 0 {
            dir.last_retrieval = now;
            if dir.has_flag(dir_flag::WARN_TIME_REACHED) {
                system_log!(info, "{}: receiving files again", dir.dir_alias);
            }
            dir.dir_flag &= !(dir_flag::WARN_TIME_REACHED | dir_flag::INFO_TIME_REACHED);
        } else {
            let quiet = now - dir.last_retrieval;
            if dir.warn_time > 0 && quiet > dir.warn_time && !dir.has_flag(dir_flag::WARN_TIME_REACHED) {
                dir.dir_flag |= dir_flag::WARN_TIME_REACHED;
                system_log!(warn, "{}: no files received for {quiet}s", dir.dir_alias);
            }
            if dir.info_time > 0 && quiet > dir.info_time && !dir.has_flag(dir_flag::INFO_TIME_REACHED) {
                dir.dir_flag |= dir_flag::INFO_TIME_REACHED;
                receive_log!(info, "{}: no files received for {quiet}s", dir.dir_alias);
            }
        }

        set_bit(&mut dir.dir_flag, dir_flag::MAX_COPIED, report.max_copied);
        set_bit(&mut dir.dir_flag, dir_flag::ACCUMULATE_PENDING, report.accumulating);
        dir.next_check_time = if report.max_copied {
            now
        } else {
            next_check_time(dir, now)
        };
    })
}

fn record_failure(
    ctx: &ScanContext,
    index: usize,
    error: &ScanError,
    now: i64,
) -> Result<(), StatusError> {
    ctx.dsa.update(index, DirStatus::LOCK_QUEUE, |dir| {
        dir.dir_status = ScanState::Idle;
        dir.error_counter = dir.error_counter.saturating_add(1);
        system_log!(error, "{}: scan failed: {error}", dir.dir_alias);
        if dir.error_counter >= SCAN_ERROR_THRESHOLD && !dir.has_flag(dir_flag::DIR_ERROR_SET) {
            dir.dir_flag |= dir_flag::DIR_ERROR_SET;
            system_log!(
                warn,
                "{}: {} consecutive scan failures, directory flagged",
                dir.dir_alias,
                dir.error_counter
            );
        }
        dir.next_check_time = next_check_time(dir, now);
    })
}

fn set_bit(word: &mut u32, bit: u32, on: bool) {
    if on {
        *word |= bit;
    } else {
        *word &= !bit;
    }
}
