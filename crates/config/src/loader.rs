//! Reading every configuration file of a work directory and publishing the
//! result into the shared status files.

use std::path::{Path, PathBuf};

use status::{
    Access, DirNameRecord, DirStatus, FileMaskRecord, HostStatus, JobIdRecord, Record,
    StatusArray, WorkDir,
};

use crate::afd_config::AfdConfig;
use crate::compile::{CompiledConfig, compile};
use crate::dir_config::{DirConfig, DirDefaults};
use crate::error::{ConfigError, Diagnostics};
use crate::host_config::{HostEntry, load_host_config, write_host_config};
use crate::reload::{
    DirConfigResult, HostConfigResult, JobDiff, compare_hosts, complete_host_entries, diff_jobs,
    dirs_changed, merge_dirs, merge_hosts,
};
use crate::rename::RenameRules;

/// Everything read from `etc/`.
#[derive(Clone, Debug)]
pub struct LoadedConfig {
    /// AFD_CONFIG.
    pub afd: AfdConfig,
    /// HOST_CONFIG entries followed by hosts only DIR_CONFIG mentions.
    pub hosts: Vec<HostEntry>,
    /// Jobs and directories.
    pub compiled: CompiledConfig,
    /// Rename rules.
    pub rename_rules: RenameRules,
    /// Warnings and errors from all files.
    pub diagnostics: Diagnostics,
}

/// Reads AFD_CONFIG, HOST_CONFIG, the rename rules and every DIR_CONFIG.
///
/// A missing HOST_CONFIG is not an error; hosts then start from defaults.
/// The main DIR_CONFIG must exist and must yield at least one job.
pub fn load(work: &WorkDir) -> Result<LoadedConfig, ConfigError> {
    let mut diagnostics = Diagnostics::new();
    let afd = AfdConfig::load(&work.afd_config(), &mut diagnostics)?;
    let rename_rules = RenameRules::load(&work.rename_rule(), &mut diagnostics)?;
    let host_path = work.host_config();
    let entries = if host_path.exists() {
        load_host_config(&host_path, &mut diagnostics)?
    } else {
        Vec::new()
    };

    let defaults = DirDefaults {
        max_copied_files: afd.max_copied_files,
        max_copied_file_size: afd.max_copied_file_size,
        remote_file_check_interval: afd.remote_file_check_interval,
    };
    let main = work.dir_config();
    let mut configs = vec![DirConfig::load(&main, defaults, &mut diagnostics)?];
    for extra in &afd.dir_configs {
        let path = resolve(work.etc_dir(), extra);
        match DirConfig::load(&path, defaults, &mut diagnostics) {
            Ok(config) => configs.push(config),
            Err(error) => diagnostics.error(&path, 0, error.to_string()),
        }
    }

    if configs.iter().all(|config| config.blocks_seen == 0) {
        return Err(ConfigError::Empty { path: main });
    }
    let compiled = compile(&configs, &afd, &rename_rules, &mut diagnostics);
    if compiled.jobs.is_empty() {
        return Err(ConfigError::NoValidData { path: main });
    }

    let hosts = complete_host_entries(&entries, &compiled);
    tracing::debug!(
        jobs = compiled.jobs.len(),
        dirs = compiled.dirs.len(),
        hosts = hosts.len(),
        warnings = diagnostics.warnings(),
        errors = diagnostics.errors(),
        "configuration loaded"
    );
    Ok(LoadedConfig {
        afd,
        hosts,
        compiled,
        rename_rules,
        diagnostics,
    })
}

fn resolve(etc: PathBuf, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        etc.join(path)
    }
}

/// What publishing changed.
#[derive(Clone, Debug)]
pub struct Published {
    /// Host array outcome.
    pub host_result: HostConfigResult,
    /// Directory and job outcome.
    pub dir_result: DirConfigResult,
    /// Job-level changes.
    pub jobs: JobDiff,
    /// Host array as written.
    pub hosts: Vec<HostStatus>,
    /// Directory array as written.
    pub dirs: Vec<DirStatus>,
}

/// Writes host and directory arrays plus the job registry.
///
/// Existing arrays are rebuilt in place so readers see the stale marker and
/// reattach; counters of hosts and directories that survive are kept.
pub fn publish(work: &WorkDir, loaded: &LoadedConfig) -> Result<Published, ConfigError> {
    let current_hosts: Vec<HostStatus> = existing(&work.fsa_status())?;
    let current_dirs: Vec<DirStatus> = existing(&work.fra_status())?;
    let current_jobs: Vec<JobIdRecord> = existing(&work.job_id_data())?;

    let host_result = compare_hosts(&current_hosts, &loaded.hosts);
    let hosts = merge_hosts(&current_hosts, &loaded.hosts, &loaded.compiled);
    let dirs = merge_dirs(&current_dirs, &loaded.compiled, &hosts);
    let records = loaded.compiled.job_records();
    let jobs = diff_jobs(&current_jobs, &records);

    let dir_result = if jobs.is_empty() && !dirs_changed(&current_dirs, &dirs) {
        DirConfigResult::NoChange
    } else if loaded.diagnostics.errors() > 0 {
        DirConfigResult::UpdatedDcProblems
    } else {
        DirConfigResult::Updated
    };

    install(&work.fsa_status(), &hosts)?;
    install(&work.fra_status(), &dirs)?;
    install::<JobIdRecord>(&work.job_id_data(), &records)?;
    install::<DirNameRecord>(&work.directory_names(), &loaded.compiled.dir_name_records())?;
    install::<FileMaskRecord>(&work.file_masks(), &loaded.compiled.file_mask_records())?;

    logging::system_log!(
        info,
        "{} jobs in {} directories for {} hosts ({}, {})",
        records.len(),
        dirs.len(),
        hosts.len(),
        dir_result,
        host_result
    );
    Ok(Published {
        host_result,
        dir_result,
        jobs,
        hosts,
        dirs,
    })
}

/// Writes the current host array back to HOST_CONFIG (`uhc -w`), including
/// hosts only DIR_CONFIG names and the persisted status bits.
pub fn save_host_config(work: &WorkDir) -> Result<(), ConfigError> {
    let hosts: Vec<HostStatus> = existing(&work.fsa_status())?;
    if hosts.is_empty() {
        return Ok(());
    }
    let entries: Vec<HostEntry> = hosts.iter().map(HostEntry::from_status).collect();
    write_host_config(&work.host_config(), &entries)
}

fn existing<R: Record>(path: &Path) -> Result<Vec<R>, ConfigError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    match StatusArray::<R>::open(path, Access::ReadOnly) {
        Ok(array) => Ok(array.snapshot()),
        // A file from an incompatible layout is replaced, not merged.
        Err(error) if error.is_invariant_violation() => Ok(Vec::new()),
        Err(error) => Err(error.into()),
    }
}

fn install<R: Record>(path: &Path, records: &[R]) -> Result<(), ConfigError> {
    let replaced = if path.exists() {
        match StatusArray::<R>::open(path, Access::ReadWrite) {
            Ok(array) => {
                array.rebuild(records)?;
                true
            }
            Err(error) if error.is_invariant_violation() => false,
            Err(error) => return Err(error.into()),
        }
    } else {
        false
    };
    if !replaced {
        StatusArray::create(path, records)?;
    }
    Ok(())
}
