//! Turning parsed DIR_CONFIG blocks into jobs.
//!
//! Every `(directory, file group, recipient, options, host)` tuple becomes
//! one [`Job`] whose id is the CRC-32 of that tuple. If two different
//! tuples hash to the same id, the later one gets a salt byte appended to
//! its hashed option string and is rehashed until the id is free.

use std::path::Path;
use std::sync::Arc;

use checksums::JobKey;
use filters::FileMaskSet;
use rustc_hash::{FxHashMap, FxHashSet};
use status::{DirNameRecord, DirStatus, FileMaskRecord, JobIdRecord};

use crate::afd_config::AfdConfig;
use crate::dir_config::DirConfig;
use crate::error::Diagnostics;
use crate::options::{JobOptions, OptionDefaults};
use crate::recipient::Recipient;
use crate::rename::RenameRules;

/// One compiled job.
#[derive(Clone, Debug)]
pub struct Job {
    /// Identifier.
    pub job_id: u32,
    /// Source directory id.
    pub dir_id: u32,
    /// Source directory alias.
    pub dir_alias: String,
    /// Mask set id.
    pub file_mask_id: u32,
    /// DIR_CONFIG the job came from.
    pub dir_config_id: u32,
    /// Destination.
    pub recipient: Recipient,
    /// Options.
    pub options: JobOptions,
    /// Collision salt, 0 when none was needed.
    pub salt: u8,
}

impl Job {
    /// Destination host alias.
    #[must_use]
    pub fn host_alias(&self) -> &str {
        &self.recipient.host_alias
    }

    /// Registry record for this job.
    #[must_use]
    pub fn record(&self, dir_pos: i32) -> JobIdRecord {
        let mut soptions = self.options.soptions.join("\n");
        if self.salt != 0 {
            soptions.push(char::from(self.salt));
        }
        JobIdRecord {
            job_id: self.job_id,
            dir_id: self.dir_id,
            dir_pos,
            file_mask_id: self.file_mask_id,
            dir_config_id: self.dir_config_id,
            host_id: checksums::host_id(self.host_alias()),
            priority: self.options.priority,
            no_of_loptions: self.options.loptions.len() as u8,
            no_of_soptions: self.options.soptions.len() as u8,
            recipient: self.recipient.canonical(),
            host_alias: self.host_alias().to_string(),
            loptions: self.options.loptions.join("\n"),
            soptions,
        }
    }
}

/// Masks of one `[files]` group and the jobs fed by it.
#[derive(Clone, Debug)]
pub struct CompiledGroup {
    /// Mask set id.
    pub file_mask_id: u32,
    /// Compiled masks.
    pub masks: Arc<FileMaskSet>,
    /// Jobs in configured order.
    pub jobs: Vec<u32>,
}

/// One source directory with its groups.
#[derive(Clone, Debug)]
pub struct CompiledDir {
    /// DSA template: configured settings without counters.
    pub status: DirStatus,
    /// Path or URL.
    pub location: String,
    /// Remote source, for retrieving directories.
    pub remote: Option<Recipient>,
    /// File groups in configured order.
    pub groups: Vec<CompiledGroup>,
}

/// The whole compiled configuration.
#[derive(Clone, Debug, Default)]
pub struct CompiledConfig {
    /// Directories in configured order.
    pub dirs: Vec<CompiledDir>,
    /// Every job.
    pub jobs: Vec<Job>,
    /// Hosts referenced by recipients or remote directories, first use first.
    pub hosts: Vec<String>,
    /// Protocol bits used per host alias.
    pub host_protocols: FxHashMap<String, u32>,
    index: FxHashMap<u32, usize>,
}

impl CompiledConfig {
    /// Job by id.
    #[must_use]
    pub fn job(&self, job_id: u32) -> Option<&Job> {
        self.index.get(&job_id).map(|&position| &self.jobs[position])
    }

    /// Directory by alias.
    #[must_use]
    pub fn dir(&self, alias: &str) -> Option<&CompiledDir> {
        self.dirs.iter().find(|dir| dir.status.dir_alias == alias)
    }

    /// Directory by id.
    #[must_use]
    pub fn dir_by_id(&self, dir_id: u32) -> Option<&CompiledDir> {
        self.dirs.iter().find(|dir| dir.status.dir_id == dir_id)
    }

    /// Registry records for `job_id_data`.
    #[must_use]
    pub fn job_records(&self) -> Vec<JobIdRecord> {
        self.jobs
            .iter()
            .map(|job| {
                let dir_pos = self
                    .dirs
                    .iter()
                    .position(|dir| dir.status.dir_id == job.dir_id)
                    .map_or(-1, |position| position as i32);
                job.record(dir_pos)
            })
            .collect()
    }

    /// Registry records for `directory_names`.
    #[must_use]
    pub fn dir_name_records(&self) -> Vec<DirNameRecord> {
        self.dirs
            .iter()
            .map(|dir| DirNameRecord {
                dir_id: dir.status.dir_id,
                dir_alias: dir.status.dir_alias.clone(),
                dir_name: dir.location.clone(),
            })
            .collect()
    }

    /// Registry records for `file_masks`, one per distinct mask set.
    #[must_use]
    pub fn file_mask_records(&self) -> Vec<FileMaskRecord> {
        let mut seen = FxHashSet::default();
        self.dirs
            .iter()
            .flat_map(|dir| dir.groups.iter())
            .filter(|group| seen.insert(group.file_mask_id))
            .map(|group| FileMaskRecord {
                file_mask_id: group.file_mask_id,
                masks: group.masks.texts().map(str::to_string).collect(),
            })
            .collect()
    }
}

/// Compiles parsed DIR_CONFIG files.
pub fn compile(
    configs: &[DirConfig],
    afd: &AfdConfig,
    rename_rules: &RenameRules,
    diagnostics: &mut Diagnostics,
) -> CompiledConfig {
    let mut compiled = CompiledConfig::default();
    let mut keys: FxHashMap<u32, String> = FxHashMap::default();
    let defaults = OptionDefaults {
        priority: afd.default_priority,
        archive_unit: afd.archive_unit,
        create_target_dir: afd.create_target_dir,
        age_limit: afd.default_age_limit,
    };

    for config in configs {
        let path = config.path.as_path();
        for block in &config.directories {
            let status = block.to_status();
            if let Some(remote) = &block.remote {
                note_host(&mut compiled, &remote.host_alias, remote.scheme.protocol_bit());
            }
            let mut groups = Vec::new();
            for group in &block.groups {
                let masks = match FileMaskSet::new(group.masks.iter()) {
                    Ok(masks) => Arc::new(masks),
                    Err(error) => {
                        diagnostics.error(
                            path,
                            group.line,
                            format!("invalid file mask in '{}': {error}", block.alias),
                        );
                        continue;
                    }
                };
                let file_mask_id = checksums::file_mask_id(&group.masks);
                let mut job_ids = Vec::new();
                for destination in &group.destinations {
                    let options = JobOptions::parse(
                        destination
                            .options
                            .iter()
                            .map(|line| (line.number, line.text.as_str())),
                        defaults,
                        path,
                        diagnostics,
                    );
                    check_rules(&options, rename_rules, path, destination.line, diagnostics);
                    for line in &destination.recipients {
                        let recipient = match Recipient::parse(&line.text) {
                            Ok(recipient) => recipient,
                            Err(errors) => {
                                diagnostics.error(
                                    path,
                                    line.number,
                                    format!("recipient '{}' ignored: {errors}", line.text),
                                );
                                continue;
                            }
                        };
                        let job = Job {
                            job_id: 0,
                            dir_id: status.dir_id,
                            dir_alias: block.alias.clone(),
                            file_mask_id,
                            dir_config_id: config.dir_config_id,
                            recipient,
                            options: options.clone(),
                            salt: 0,
                        };
                        match register(&mut compiled, &mut keys, job) {
                            Some(job_id) => job_ids.push(job_id),
                            None => diagnostics.warn(
                                path,
                                line.number,
                                format!("recipient '{}' listed twice for the same files", line.text),
                            ),
                        }
                    }
                }
                if !job_ids.is_empty() {
                    groups.push(CompiledGroup {
                        file_mask_id,
                        masks,
                        jobs: job_ids,
                    });
                }
            }
            compiled.dirs.push(CompiledDir {
                status,
                location: block.location.clone(),
                remote: block.remote.clone(),
                groups,
            });
        }
    }
    compiled
}

fn note_host(compiled: &mut CompiledConfig, alias: &str, protocol_bit: u32) {
    match compiled.host_protocols.get_mut(alias) {
        Some(bits) => *bits |= protocol_bit,
        None => {
            compiled.hosts.push(alias.to_string());
            compiled.host_protocols.insert(alias.to_string(), protocol_bit);
        }
    }
}

/// Adds `job`, resolving id collisions. `None` when the identical tuple is
/// already registered.
fn register(
    compiled: &mut CompiledConfig,
    keys: &mut FxHashMap<u32, String>,
    mut job: Job,
) -> Option<u32> {
    let recipient = job.recipient.canonical();
    let options = job.options.id_string();
    let identity = format!(
        "{:x}\0{:x}\0{recipient}\0{options}\0{}",
        job.dir_id,
        job.file_mask_id,
        job.host_alias()
    );
    let mut salt = 0_u8;
    let job_id = loop {
        let candidate = JobKey {
            dir_id: job.dir_id,
            file_mask_id: job.file_mask_id,
            recipient: &recipient,
            options: &options,
            host_alias: job.host_alias(),
            salt,
        }
        .job_id();
        match keys.get(&candidate) {
            None => break candidate,
            Some(existing) if *existing == identity => return None,
            Some(_) => {
                // Printable salts keep the record readable.
                salt = if salt == 0 { b'!' } else { salt.checked_add(1)? };
                tracing::debug!(job_id = candidate, salt, "job id collision");
            }
        }
    };
    keys.insert(job_id, identity);
    job.job_id = job_id;
    job.salt = salt;
    note_host(compiled, job.host_alias(), job.recipient.scheme.protocol_bit());
    compiled.index.insert(job_id, compiled.jobs.len());
    compiled.jobs.push(job);
    Some(job_id)
}

fn check_rules(
    options: &JobOptions,
    rules: &RenameRules,
    path: &Path,
    line: usize,
    diagnostics: &mut Diagnostics,
) {
    for rule in [&options.names.rename, &options.names.trans_rename]
        .into_iter()
        .flatten()
    {
        if !rules.contains(rule) {
            diagnostics.warn(path, line, format!("rename rule '{rule}' is not defined"));
        }
    }
}
