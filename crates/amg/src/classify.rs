//! What the scanner does with one directory entry.
//!
//! Rules apply in a fixed order: locked (dot) files, unreadable files, the
//! size and age ignore filters, file masks, then the end character. A rule
//! that rejects a file either leaves it in place or, when the directory's
//! `delete_files_flag` asks for it and the file is old enough, deletes it
//! with the matching reason.

use config::CompiledGroup;
use logging::DeleteReason;
use status::{DirStatus, delete_files, dir_options, gt_lt_sign};

/// Facts about one regular file in a source directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Candidate {
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time.
    pub mtime: i64,
    /// Whether the file can be opened for reading.
    pub readable: bool,
    /// Last byte, read only when an end character is configured.
    pub last_byte: Option<u8>,
}

impl Candidate {
    /// Seconds since the last modification, never negative.
    #[must_use]
    pub fn age(&self, now: i64) -> i64 {
        (now - self.mtime).max(0)
    }
}

/// Outcome for one candidate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// Distribute through the listed groups (indices into the directory's groups).
    Take(Vec<usize>),
    /// Leave the file for a later scan.
    Hold,
    /// Leave the file permanently because a filter ignores it.
    Ignore,
    /// Remove the file and log `reason`.
    Delete(DeleteReason),
}

/// Classifies `file` for `dir` with its mask `groups`.
#[must_use]
pub fn classify(dir: &DirStatus, groups: &[CompiledGroup], file: &Candidate, now: i64) -> Verdict {
    let age = file.age(now);
    let deletes = |bit: u8| dir.delete_files_flag & bit != 0;

    if file.name.starts_with('.') && !dir.has_option(dir_options::ACCEPT_DOT_FILES) {
        return if deletes(delete_files::OLD_LOCKED_FILES) && age > dir.locked_file_time {
            Verdict::Delete(DeleteReason::DelOldLockedFile)
        } else {
            Verdict::Hold
        };
    }
    if !file.readable {
        return if deletes(delete_files::UNREADABLE_FILES) && age > dir.unreadable_file_time {
            Verdict::Delete(DeleteReason::DelUnreadableFile)
        } else {
            Verdict::Hold
        };
    }
    if ignored_by_size(dir, file.size) || ignored_by_time(dir, age) {
        return Verdict::Ignore;
    }

    let accepting: Vec<usize> = groups
        .iter()
        .enumerate()
        .filter(|(_, group)| group.masks.accepts(&file.name))
        .map(|(index, _)| index)
        .collect();
    if accepting.is_empty() {
        return if deletes(delete_files::UNKNOWN_FILES) && age > dir.unknown_file_time {
            Verdict::Delete(DeleteReason::DelUnknownFile)
        } else {
            Verdict::Ignore
        };
    }

    if dir.end_character >= 0 && file.last_byte.map(i32::from) != Some(dir.end_character) {
        return Verdict::Hold;
    }
    Verdict::Take(accepting)
}

/// Whether a file left behind while distribution is paused must go.
#[must_use]
pub fn queued_too_long(dir: &DirStatus, file: &Candidate, now: i64) -> bool {
    dir.delete_files_flag & delete_files::QUEUED_FILES != 0 && file.age(now) > dir.queued_file_time
}

fn ignored_by_size(dir: &DirStatus, size: u64) -> bool {
    if dir.ignore_size < 0 {
        return false;
    }
    let limit = dir.ignore_size as u64;
    (dir.gt_lt_sign & gt_lt_sign::ISIZE_EQUAL != 0 && size == limit)
        || (dir.gt_lt_sign & gt_lt_sign::ISIZE_LESS_THEN != 0 && size < limit)
        || (dir.gt_lt_sign & gt_lt_sign::ISIZE_GREATER_THEN != 0 && size > limit)
}

fn ignored_by_time(dir: &DirStatus, age: i64) -> bool {
    if dir.ignore_file_time == 0 {
        return false;
    }
    let limit = i64::from(dir.ignore_file_time);
    (dir.gt_lt_sign & gt_lt_sign::IFTIME_EQUAL != 0 && age == limit)
        || (dir.gt_lt_sign & gt_lt_sign::IFTIME_LESS_THEN != 0 && age < limit)
        || (dir.gt_lt_sign & gt_lt_sign::IFTIME_GREATER_THEN != 0 && age > limit)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use filters::FileMaskSet;

    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn groups(masks: &[&str]) -> Vec<CompiledGroup> {
        vec![CompiledGroup {
            file_mask_id: 1,
            masks: Arc::new(FileMaskSet::new(masks.iter().copied()).unwrap()),
            jobs: vec![7],
        }]
    }

    fn file(name: &str, size: u64, age: i64) -> Candidate {
        Candidate {
            name: name.to_string(),
            size,
            mtime: NOW - age,
            readable: true,
            last_byte: None,
        }
    }

    #[test]
    fn matching_files_are_taken() {
        let dir = DirStatus::new("in", "/in");
        let verdict = classify(&dir, &groups(&["*.dat"]), &file("x.dat", 10, 5), NOW);
        assert_eq!(verdict, Verdict::Take(vec![0]));
    }

    #[test]
    fn dot_files_are_locked_until_old() {
        let mut dir = DirStatus::new("in", "/in");
        let masks = groups(&["*"]);
        assert_eq!(classify(&dir, &masks, &file(".x.dat", 1, 10), NOW), Verdict::Hold);

        dir.delete_files_flag = delete_files::OLD_LOCKED_FILES;
        dir.locked_file_time = 60;
        assert_eq!(
            classify(&dir, &masks, &file(".x.dat", 1, 61), NOW),
            Verdict::Delete(DeleteReason::DelOldLockedFile)
        );

        dir.dir_options |= dir_options::ACCEPT_DOT_FILES;
        assert_eq!(classify(&dir, &masks, &file(".x.dat", 1, 61), NOW), Verdict::Take(vec![0]));
    }

    #[test]
    fn unknown_files_are_deleted_only_when_asked() {
        let mut dir = DirStatus::new("in", "/in");
        let masks = groups(&["*.dat"]);
        assert_eq!(classify(&dir, &masks, &file("x.txt", 1, 100_000), NOW), Verdict::Ignore);
        dir.delete_files_flag = delete_files::UNKNOWN_FILES;
        dir.unknown_file_time = 3600;
        assert_eq!(classify(&dir, &masks, &file("x.txt", 1, 60), NOW), Verdict::Ignore);
        assert_eq!(
            classify(&dir, &masks, &file("x.txt", 1, 3601), NOW),
            Verdict::Delete(DeleteReason::DelUnknownFile)
        );
    }

    #[test]
    fn unreadable_files_wait_for_their_age() {
        let mut dir = DirStatus::new("in", "/in");
        dir.delete_files_flag = delete_files::UNREADABLE_FILES;
        dir.unreadable_file_time = 10;
        let mut locked = file("x.dat", 1, 5);
        locked.readable = false;
        let masks = groups(&["*"]);
        assert_eq!(classify(&dir, &masks, &locked, NOW), Verdict::Hold);
        locked.mtime = NOW - 11;
        assert_eq!(
            classify(&dir, &masks, &locked, NOW),
            Verdict::Delete(DeleteReason::DelUnreadableFile)
        );
    }

    #[test]
    fn size_and_time_filters_ignore() {
        let mut dir = DirStatus::new("in", "/in");
        let masks = groups(&["*"]);
        dir.ignore_size = 100;
        dir.gt_lt_sign = gt_lt_sign::ISIZE_LESS_THEN;
        assert_eq!(classify(&dir, &masks, &file("a", 99, 0), NOW), Verdict::Ignore);
        assert_eq!(classify(&dir, &masks, &file("a", 100, 0), NOW), Verdict::Take(vec![0]));

        dir.ignore_size = -1;
        dir.ignore_file_time = 30;
        dir.gt_lt_sign = gt_lt_sign::IFTIME_GREATER_THEN;
        assert_eq!(classify(&dir, &masks, &file("a", 1, 31), NOW), Verdict::Ignore);
        assert_eq!(classify(&dir, &masks, &file("a", 1, 30), NOW), Verdict::Take(vec![0]));
    }

    #[test]
    fn end_character_holds_incomplete_files() {
        let mut dir = DirStatus::new("in", "/in");
        dir.end_character = 3;
        let masks = groups(&["*"]);
        let mut incomplete = file("bulletin", 10, 0);
        incomplete.last_byte = Some(b'x');
        assert_eq!(classify(&dir, &masks, &incomplete, NOW), Verdict::Hold);
        incomplete.last_byte = Some(3);
        assert_eq!(classify(&dir, &masks, &incomplete, NOW), Verdict::Take(vec![0]));
    }

    #[test]
    fn paused_queue_deletion_follows_queued_file_time() {
        let mut dir = DirStatus::new("in", "/in");
        assert!(!queued_too_long(&dir, &file("a", 1, 1_000_000), NOW));
        dir.delete_files_flag = delete_files::QUEUED_FILES;
        dir.queued_file_time = 100;
        assert!(queued_too_long(&dir, &file("a", 1, 101), NOW));
        assert!(!queued_too_long(&dir, &file("a", 1, 99), NOW));
    }
}
