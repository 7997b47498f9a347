//! Comparing a new configuration with the running one.
//!
//! The results and counts produced here are what `udc` and `uhc` print and
//! what the DB-update reply fifo carries.

use rustc_hash::{FxHashMap, FxHashSet};
use status::{DirStatus, HostStatus, JobIdRecord, host_status, special_flag};

use crate::compile::CompiledConfig;
use crate::error::ConfigError;
use crate::host_config::HostEntry;

/// Outcome of re-reading DIR_CONFIG.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum DirConfigResult {
    /// Same jobs and directory settings as before.
    NoChange = 1,
    /// Jobs or directories changed.
    Updated = 2,
    /// Changed, but some blocks or recipients were rejected.
    UpdatedDcProblems = 3,
    /// No `[directory]` block at all.
    Empty = 4,
    /// A DIR_CONFIG could not be read.
    AccessError = 5,
    /// Directory blocks exist but none yields a job.
    NoValidData = 6,
}

/// Outcome of re-reading HOST_CONFIG.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum HostConfigResult {
    /// Same hosts, same order, same settings.
    NoChange = 10,
    /// Hosts were added or removed.
    Recreated = 11,
    /// Settings of some hosts changed.
    DataChanged = 12,
    /// Settings and order changed.
    DataOrderChanged = 13,
    /// Only the order changed.
    OrderChanged = 14,
}

macro_rules! result_codes {
    ($name:ident { $($variant:ident = $text:literal),+ $(,)? }) => {
        impl $name {
            /// Wire value.
            #[must_use]
            pub const fn code(self) -> i32 {
                self as i32
            }

            /// Variant for a wire value.
            #[must_use]
            pub const fn from_code(code: i32) -> Option<Self> {
                $(if code == Self::$variant as i32 {
                    return Some(Self::$variant);
                })+
                None
            }

            /// Operator-facing name.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

result_codes!(DirConfigResult {
    NoChange = "NO_CHANGE_IN_DIR_CONFIG",
    Updated = "DIR_CONFIG_UPDATED",
    UpdatedDcProblems = "DIR_CONFIG_UPDATED_DC_PROBLEMS",
    Empty = "DIR_CONFIG_EMPTY",
    AccessError = "DIR_CONFIG_ACCESS_ERROR",
    NoValidData = "DIR_CONFIG_NO_VALID_DATA",
});

result_codes!(HostConfigResult {
    NoChange = "NO_CHANGE_IN_HOST_CONFIG",
    Recreated = "HOST_CONFIG_RECREATED",
    DataChanged = "HOST_CONFIG_DATA_CHANGED",
    DataOrderChanged = "HOST_CONFIG_DATA_ORDER_CHANGED",
    OrderChanged = "HOST_CONFIG_ORDER_CHANGED",
});

impl DirConfigResult {
    /// Result for a load failure.
    #[must_use]
    pub fn from_error(error: &ConfigError) -> Self {
        match error {
            ConfigError::Empty { .. } => Self::Empty,
            ConfigError::NoValidData { .. } => Self::NoValidData,
            _ => Self::AccessError,
        }
    }

    /// Whether the new configuration was not installed.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Empty | Self::AccessError | Self::NoValidData)
    }
}

/// Reply to a HOST_CONFIG reload: two little-endian `i32`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HostReloadReply {
    /// Outcome.
    pub result: HostConfigResult,
    /// Warnings produced.
    pub warnings: i32,
}

impl HostReloadReply {
    /// Encoded length.
    pub const LEN: usize = 8;

    /// Wire bytes.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut bytes = [0_u8; Self::LEN];
        bytes[..4].copy_from_slice(&self.result.code().to_le_bytes());
        bytes[4..].copy_from_slice(&self.warnings.to_le_bytes());
        bytes
    }

    /// Decodes wire bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let [result, warnings] = read_i32s::<2>(bytes)?;
        Some(Self {
            result: HostConfigResult::from_code(result)?,
            warnings,
        })
    }
}

/// Reply to a DIR_CONFIG reload: four little-endian `i32`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DirReloadReply {
    /// Outcome.
    pub result: DirConfigResult,
    /// Warnings produced.
    pub warnings: i32,
    /// Jobs that are new or whose definition changed.
    pub jobs_added_or_changed: i32,
    /// Jobs no longer configured.
    pub jobs_removed: i32,
}

impl DirReloadReply {
    /// Encoded length.
    pub const LEN: usize = 16;

    /// Wire bytes.
    #[must_use]
    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut bytes = [0_u8; Self::LEN];
        for (chunk, value) in bytes.chunks_exact_mut(4).zip([
            self.result.code(),
            self.warnings,
            self.jobs_added_or_changed,
            self.jobs_removed,
        ]) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    /// Decodes wire bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let [result, warnings, added, removed] = read_i32s::<4>(bytes)?;
        Some(Self {
            result: DirConfigResult::from_code(result)?,
            warnings,
            jobs_added_or_changed: added,
            jobs_removed: removed,
        })
    }
}

fn read_i32s<const N: usize>(bytes: &[u8]) -> Option<[i32; N]> {
    if bytes.len() < N * 4 {
        return None;
    }
    Some(std::array::from_fn(|index| {
        let start = index * 4;
        i32::from_le_bytes([
            bytes[start],
            bytes[start + 1],
            bytes[start + 2],
            bytes[start + 3],
        ])
    }))
}

/// Job-level difference between two registries.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct JobDiff {
    /// Jobs with no predecessor.
    pub added: usize,
    /// Jobs replacing one with the same directory, recipient and host.
    pub changed: usize,
    /// Jobs gone without replacement.
    pub removed: usize,
}

impl JobDiff {
    /// Whether nothing changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added == 0 && self.changed == 0 && self.removed == 0
    }
}

/// Compares the previous registry with a new one.
#[must_use]
pub fn diff_jobs(old: &[JobIdRecord], new: &[JobIdRecord]) -> JobDiff {
    let old_ids: FxHashSet<u32> = old.iter().map(|record| record.job_id).collect();
    let new_ids: FxHashSet<u32> = new.iter().map(|record| record.job_id).collect();

    let slot = |record: &JobIdRecord| (record.dir_id, record.recipient.clone(), record.host_id);
    let mut vanished: FxHashMap<(u32, String, u32), usize> = FxHashMap::default();
    for record in old.iter().filter(|record| !new_ids.contains(&record.job_id)) {
        *vanished.entry(slot(record)).or_default() += 1;
    }
    let removed_total: usize = vanished.values().sum();

    let mut diff = JobDiff::default();
    for record in new.iter().filter(|record| !old_ids.contains(&record.job_id)) {
        match vanished.get_mut(&slot(record)) {
            Some(count) if *count > 0 => {
                *count -= 1;
                diff.changed += 1;
            }
            _ => diff.added += 1,
        }
    }
    diff.removed = removed_total - diff.changed;
    diff
}

/// Classifies the difference between running hosts and new entries.
#[must_use]
pub fn compare_hosts(current: &[HostStatus], entries: &[HostEntry]) -> HostConfigResult {
    let old: Vec<HostEntry> = current.iter().map(HostEntry::from_status).collect();
    let old_aliases: FxHashSet<&str> = old.iter().map(|entry| entry.alias.as_str()).collect();
    let new_aliases: FxHashSet<&str> = entries.iter().map(|entry| entry.alias.as_str()).collect();
    if old_aliases != new_aliases {
        return HostConfigResult::Recreated;
    }
    let order_changed = old
        .iter()
        .zip(entries)
        .any(|(before, after)| before.alias != after.alias);
    let data_changed = entries.iter().any(|after| {
        old.iter()
            .find(|before| before.alias == after.alias)
            .is_some_and(|before| !before.same_settings(after))
    });
    match (data_changed, order_changed) {
        (false, false) => HostConfigResult::NoChange,
        (true, false) => HostConfigResult::DataChanged,
        (false, true) => HostConfigResult::OrderChanged,
        (true, true) => HostConfigResult::DataOrderChanged,
    }
}

/// Host entries in final order: HOST_CONFIG order, then hosts only
/// referenced from DIR_CONFIG with defaults.
#[must_use]
pub fn complete_host_entries(entries: &[HostEntry], compiled: &CompiledConfig) -> Vec<HostEntry> {
    let mut complete = entries.to_vec();
    for alias in &compiled.hosts {
        if !complete.iter().any(|entry| &entry.alias == alias) {
            complete.push(HostEntry::new(alias));
        }
    }
    complete
}

/// New host status array: settings from `entries`, running counters and
/// operator status bits from `current` matched by alias.
#[must_use]
pub fn merge_hosts(
    current: &[HostStatus],
    entries: &[HostEntry],
    compiled: &CompiledConfig,
) -> Vec<HostStatus> {
    entries
        .iter()
        .map(|entry| {
            let mut status = match current.iter().find(|host| host.host_alias == entry.alias) {
                Some(existing) => {
                    let mut status = existing.clone();
                    entry.apply(&mut status, false);
                    status
                }
                None => entry.to_status(),
            };
            match compiled.host_protocols.get(&entry.alias) {
                Some(bits) => {
                    status.protocol = *bits;
                    status.special_flag |= special_flag::HOST_IN_DIR_CONFIG;
                    status.host_status &= !host_status::HOST_NOT_IN_DIR_CONFIG;
                }
                None => {
                    status.protocol = 0;
                    status.special_flag &= !special_flag::HOST_IN_DIR_CONFIG;
                    status.host_status |= host_status::HOST_NOT_IN_DIR_CONFIG;
                }
            }
            status
        })
        .collect()
}

/// New directory status array: settings from `compiled`, counters and
/// flags from `current` matched by alias.
#[must_use]
pub fn merge_dirs(
    current: &[DirStatus],
    compiled: &CompiledConfig,
    hosts: &[HostStatus],
) -> Vec<DirStatus> {
    compiled
        .dirs
        .iter()
        .map(|dir| {
            let template = &dir.status;
            let mut status = match current
                .iter()
                .find(|existing| existing.dir_alias == template.dir_alias)
            {
                Some(existing) if existing.dir_id == template.dir_id => {
                    let mut status = existing.clone();
                    copy_settings(template, &mut status);
                    status
                }
                _ => template.clone(),
            };
            status.fsa_pos = hosts
                .iter()
                .position(|host| !status.host_alias.is_empty() && host.host_alias == status.host_alias)
                .map_or(-1, |position| position as i32);
            status
        })
        .collect()
}

fn copy_settings(template: &DirStatus, status: &mut DirStatus) {
    status.url.clone_from(&template.url);
    status.host_alias.clone_from(&template.host_alias);
    status.dir_options = template.dir_options;
    status.priority = template.priority;
    status.delete_files_flag = template.delete_files_flag;
    status.stupid_mode = template.stupid_mode;
    status.end_character = template.end_character;
    status.gt_lt_sign = template.gt_lt_sign;
    status.max_copied_files = template.max_copied_files;
    status.ignore_size = template.ignore_size;
    status.ignore_file_time = template.ignore_file_time;
    status.accumulate = template.accumulate;
    status.max_copied_file_size = template.max_copied_file_size;
    status.accumulate_size = template.accumulate_size;
    status.unknown_file_time = template.unknown_file_time;
    status.queued_file_time = template.queued_file_time;
    status.locked_file_time = template.locked_file_time;
    status.unreadable_file_time = template.unreadable_file_time;
    status.warn_time = template.warn_time;
    status.info_time = template.info_time;
    status.dup_check_timeout = template.dup_check_timeout;
    status.dup_check_flag = template.dup_check_flag;
    status.remote_file_check_interval = template.remote_file_check_interval;
    status.no_of_time_entries = template.no_of_time_entries;
    status.time_entries = template.time_entries;
}

/// Whether any directory differs in its configured settings.
#[must_use]
pub fn dirs_changed(current: &[DirStatus], merged: &[DirStatus]) -> bool {
    if current.len() != merged.len() {
        return true;
    }
    current.iter().zip(merged).any(|(before, after)| {
        let mut settled = before.clone();
        copy_settings(after, &mut settled);
        settled.dir_alias != after.dir_alias || settled != *before
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(job_id: u32, dir_id: u32, recipient: &str) -> JobIdRecord {
        JobIdRecord {
            job_id,
            dir_id,
            recipient: recipient.into(),
            host_id: 7,
            ..JobIdRecord::default()
        }
    }

    #[test]
    fn reply_encodings_are_little_endian() {
        let host = HostReloadReply {
            result: HostConfigResult::DataChanged,
            warnings: 0,
        };
        let bytes = host.to_bytes();
        assert_eq!(bytes, [12, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(HostReloadReply::from_bytes(&bytes), Some(host));

        let dir = DirReloadReply {
            result: DirConfigResult::Updated,
            warnings: 1,
            jobs_added_or_changed: 3,
            jobs_removed: 258,
        };
        let bytes = dir.to_bytes();
        assert_eq!(&bytes[12..], [2, 1, 0, 0]);
        assert_eq!(DirReloadReply::from_bytes(&bytes), Some(dir));
        assert_eq!(DirReloadReply::from_bytes(&bytes[..12]), None);
    }

    #[test]
    fn result_names_match_operator_vocabulary() {
        assert_eq!(HostConfigResult::NoChange.to_string(), "NO_CHANGE_IN_HOST_CONFIG");
        assert_eq!(
            DirConfigResult::from_code(3),
            Some(DirConfigResult::UpdatedDcProblems)
        );
        assert_eq!(HostConfigResult::from_code(99), None);
    }

    #[test]
    fn job_diff_pairs_replacements() {
        let old = [record(1, 10, "file://H/a"), record(2, 10, "file://H/b"), record(3, 11, "x")];
        let new = [record(1, 10, "file://H/a"), record(4, 10, "file://H/b"), record(5, 12, "y")];
        assert_eq!(
            diff_jobs(&old, &new),
            JobDiff {
                added: 1,
                changed: 1,
                removed: 1
            }
        );
        assert!(diff_jobs(&new, &new).is_empty());
    }

    #[test]
    fn host_comparison_distinguishes_order_and_data() {
        let entries = vec![HostEntry::new("A"), HostEntry::new("B")];
        let current: Vec<HostStatus> = entries.iter().map(HostEntry::to_status).collect();
        assert_eq!(compare_hosts(&current, &entries), HostConfigResult::NoChange);

        let swapped = vec![entries[1].clone(), entries[0].clone()];
        assert_eq!(compare_hosts(&current, &swapped), HostConfigResult::OrderChanged);

        let mut changed = entries.clone();
        changed[0].max_errors = 5;
        assert_eq!(compare_hosts(&current, &changed), HostConfigResult::DataChanged);
        changed.swap(0, 1);
        assert_eq!(compare_hosts(&current, &changed), HostConfigResult::DataOrderChanged);

        let fewer = vec![entries[0].clone()];
        assert_eq!(compare_hosts(&current, &fewer), HostConfigResult::Recreated);
    }

    #[test]
    fn merge_keeps_counters_by_alias() {
        let mut running = HostEntry::new("H1").to_status();
        running.file_counter_done = 42;
        running.error_counter = 1;
        let mut entry = HostEntry::new("H1");
        entry.max_errors = 5;
        let compiled = CompiledConfig::default();
        let merged = merge_hosts(&[running], &[HostEntry::new("H0"), entry], &compiled);
        assert_eq!(merged[0].host_alias, "H0");
        assert_eq!(merged[1].file_counter_done, 42);
        assert_eq!(merged[1].error_counter, 1);
        assert_eq!(merged[1].max_errors, 5);
        assert!(merged[1].has_status(host_status::HOST_NOT_IN_DIR_CONFIG));
    }
}
