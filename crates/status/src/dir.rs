//! Directory Status Array (DSA) records.

use serde::Serialize;

use crate::codec::{
    get_i32, get_i64, get_str, get_u8, get_u16, get_u32, get_u64, put_i32, put_i64, put_str,
    put_u8, put_u16, put_u32, put_u64,
};
use crate::host::MAX_HOSTNAME_LENGTH;
use crate::region::{LockSlot, Record};

/// Field width of a directory alias.
pub const MAX_DIR_ALIAS_LENGTH: usize = 32;
/// Field width of a directory URL.
pub const MAX_RECIPIENT_LENGTH: usize = 256;
/// Maximum `time` entries per directory.
pub const MAX_FRA_TIME_ENTRIES: usize = 12;

/// Bits of [`DirStatus::dir_flag`].
pub mod dir_flag {
    /// Directory disabled in DIR_CONFIG or by the operator.
    pub const DIR_DISABLED: u32 = 1 << 0;
    /// Scanning stopped by the operator.
    pub const DIR_STOPPED: u32 = 1 << 1;
    /// At least one file of this directory waits in the queue.
    pub const FILES_IN_QUEUE: u32 = 1 << 2;
    /// Scanning failed repeatedly.
    pub const DIR_ERROR_SET: u32 = 1 << 3;
    /// No file arrived within `warn_time`.
    pub const WARN_TIME_REACHED: u32 = 1 << 4;
    /// The last scan stopped at a `max copied` limit.
    pub const MAX_COPIED: u32 = 1 << 5;
    /// No file arrived within `info_time`.
    pub const INFO_TIME_REACHED: u32 = 1 << 6;
    /// Files are held back by `accumulate`.
    pub const ACCUMULATE_PENDING: u32 = 1 << 7;
    /// Operator acknowledged the directory error.
    pub const DIR_ERROR_ACKN: u32 = 1 << 8;
    /// Directory declared offline.
    pub const DIR_ERROR_OFFLINE: u32 = 1 << 9;
}

/// Bits of [`DirStatus::dir_options`].
pub mod dir_options {
    /// Files starting with `.` are candidates.
    pub const ACCEPT_DOT_FILES: u32 = 1 << 0;
    /// Remote directory is not listed; names come from the URL.
    pub const DONT_GET_DIR_LIST: u32 = 1 << 1;
    /// Scanned by a dedicated thread.
    pub const ONE_PROCESS_JUST_SCANNING: u32 = 1 << 2;
    /// Retrieval URL names the file.
    pub const URL_CREATES_FILE_NAME: u32 = 1 << 3;
    /// Files are copied, not moved, out of the directory.
    pub const DO_NOT_REMOVE: u32 = 1 << 4;
    /// Rescan even when the directory mtime did not change.
    pub const FORCE_REREAD: u32 = 1 << 5;
    /// Source is remote and retrieved through an adapter.
    pub const REMOTE_DIR: u32 = 1 << 6;
}

/// Bits of [`DirStatus::delete_files_flag`].
pub mod delete_files {
    /// Delete files no `[files]` block selects.
    pub const UNKNOWN_FILES: u8 = 1 << 0;
    /// Delete files queued for longer than the limit.
    pub const QUEUED_FILES: u8 = 1 << 1;
    /// Delete locked (dot) files older than the limit.
    pub const OLD_LOCKED_FILES: u8 = 1 << 2;
    /// Delete files that cannot be read.
    pub const UNREADABLE_FILES: u8 = 1 << 3;
    /// Delete remote locked files older than the limit.
    pub const OLD_RLOCKED_FILES: u8 = 1 << 4;
}

/// Bits of [`DirStatus::gt_lt_sign`].
pub mod gt_lt_sign {
    /// Ignore files whose size equals `ignore_size`.
    pub const ISIZE_EQUAL: u32 = 1 << 0;
    /// Ignore files smaller than `ignore_size`.
    pub const ISIZE_LESS_THEN: u32 = 1 << 1;
    /// Ignore files larger than `ignore_size`.
    pub const ISIZE_GREATER_THEN: u32 = 1 << 2;
    /// Ignore files whose age equals `ignore_file_time`.
    pub const IFTIME_EQUAL: u32 = 1 << 3;
    /// Ignore files younger than `ignore_file_time`.
    pub const IFTIME_LESS_THEN: u32 = 1 << 4;
    /// Ignore files older than `ignore_file_time`.
    pub const IFTIME_GREATER_THEN: u32 = 1 << 5;
}

/// Retrieval list handling of a remote directory.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StupidMode {
    /// Compare against the retrieve list and fetch changed entries.
    #[default]
    No,
    /// Fetch everything, keep no list.
    Yes,
    /// Fetch each name once, ignoring later size or time changes.
    GetOnceOnly,
    /// Compare names only; size and time are not exact.
    NotExact,
}

impl StupidMode {
    /// Stored byte.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::No => 0,
            Self::Yes => 1,
            Self::GetOnceOnly => 2,
            Self::NotExact => 3,
        }
    }

    /// Parses a stored byte.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Yes,
            2 => Self::GetOnceOnly,
            3 => Self::NotExact,
            _ => Self::No,
        }
    }
}

/// Where a directory is in its scan cycle.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// Waiting for `next_check_time`.
    #[default]
    Idle,
    /// Listing entries.
    Scanning,
    /// Evaluating filters and thresholds.
    Collecting,
    /// Moving files to the pool and emitting messages.
    Dispatching,
}

impl ScanState {
    /// Stored byte.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Scanning => 1,
            Self::Collecting => 2,
            Self::Dispatching => 3,
        }
    }

    /// Parses a stored byte.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Scanning,
            2 => Self::Collecting,
            3 => Self::Dispatching,
            _ => Self::Idle,
        }
    }
}

/// One cron-like schedule entry as bitmaps.
///
/// Bit `n` of `minute` stands for minute `n`; `day_of_month` bit 0 is the
/// first day, `month` bit 0 is January, `day_of_week` bit 0 is Monday.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct TimeEntry {
    /// Minutes 0..59.
    pub minute: u64,
    /// Seconds 0..59, used when `has_seconds`.
    pub second: u64,
    /// Hours 0..23.
    pub hour: u32,
    /// Days 1..31.
    pub day_of_month: u32,
    /// Months 1..12.
    pub month: u16,
    /// Weekdays Monday..Sunday.
    pub day_of_week: u8,
    /// Whether `second` is significant.
    pub has_seconds: bool,
}

impl TimeEntry {
    /// Encoded size.
    pub const SIZE: usize = 32;

    /// Entry matching every minute.
    pub const EVERY_MINUTE: Self = Self {
        minute: (1 << 60) - 1,
        second: 1,
        hour: (1 << 24) - 1,
        day_of_month: (1 << 31) - 1,
        month: (1 << 12) - 1,
        day_of_week: (1 << 7) - 1,
        has_seconds: false,
    };

    fn decode(bytes: &[u8]) -> Self {
        Self {
            minute: get_u64(bytes, 0),
            second: get_u64(bytes, 8),
            hour: get_u32(bytes, 16),
            day_of_month: get_u32(bytes, 20),
            month: get_u16(bytes, 24),
            day_of_week: get_u8(bytes, 26),
            has_seconds: get_u8(bytes, 27) != 0,
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        put_u64(bytes, 0, self.minute);
        put_u64(bytes, 8, self.second);
        put_u32(bytes, 16, self.hour);
        put_u32(bytes, 20, self.day_of_month);
        put_u16(bytes, 24, self.month);
        put_u8(bytes, 26, self.day_of_week);
        put_u8(bytes, 27, u8::from(self.has_seconds));
    }
}

/// Operational state of one source directory.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct DirStatus {
    /// Unique alias.
    pub dir_alias: String,
    /// Host alias for remote directories.
    pub host_alias: String,
    /// Local path or retrieval URL.
    pub url: String,
    /// CRC-32 of the configured directory.
    pub dir_id: u32,
    /// See [`dir_flag`].
    pub dir_flag: u32,
    /// See [`dir_options`].
    pub dir_options: u32,
    /// Scan state.
    pub dir_status: ScanState,
    /// Base priority `'0'..='9'` of messages from this directory.
    pub priority: u8,
    /// See [`delete_files`].
    pub delete_files_flag: u8,
    /// Retrieve list handling.
    pub stupid_mode: StupidMode,
    /// Byte that must end a file before it is picked up, −1 = none.
    pub end_character: i32,
    /// See [`gt_lt_sign`].
    pub gt_lt_sign: u32,
    /// Files moved per scan at most.
    pub max_copied_files: u32,
    /// Consecutive scan failures.
    pub error_counter: u32,
    /// Size compared by the `ignore size` option, −1 = off.
    pub ignore_size: i64,
    /// Age in seconds compared by `ignore file time`, 0 = off.
    pub ignore_file_time: u32,
    /// Files to wait for before releasing, 0 = off.
    pub accumulate: u32,
    /// Bytes moved per scan at most.
    pub max_copied_file_size: i64,
    /// Bytes to wait for before releasing, 0 = off.
    pub accumulate_size: i64,
    /// Seconds before unknown files are deleted.
    pub unknown_file_time: i64,
    /// Seconds before queued files are deleted.
    pub queued_file_time: i64,
    /// Seconds before locked files are deleted.
    pub locked_file_time: i64,
    /// Seconds before unreadable files are deleted.
    pub unreadable_file_time: i64,
    /// Seconds without input before warning, 0 = never.
    pub warn_time: i64,
    /// Seconds without input before an info line, 0 = never.
    pub info_time: i64,
    /// Time input last arrived.
    pub last_retrieval: i64,
    /// Time of the next due scan.
    pub next_check_time: i64,
    /// Bytes seen in the directory by the last scan.
    pub bytes_in_dir: u64,
    /// Bytes of this directory waiting in the queue.
    pub bytes_in_queue: u64,
    /// Bytes picked up since start.
    pub bytes_received: u64,
    /// Dupcheck timeout in seconds.
    pub dup_check_timeout: i64,
    /// Dupcheck flags.
    pub dup_check_flag: u64,
    /// Files seen in the directory by the last scan.
    pub files_in_dir: u32,
    /// Files of this directory waiting in the queue.
    pub files_queued: u32,
    /// Files picked up since start.
    pub files_received: u32,
    /// Seconds between remote listings.
    pub remote_file_check_interval: u32,
    /// Valid entries in `time_entries`, 0 = scan continuously.
    pub no_of_time_entries: u8,
    /// HSA position of `host_alias`, −1 for local directories.
    pub fsa_pos: i32,
    /// Schedule.
    pub time_entries: [TimeEntry; MAX_FRA_TIME_ENTRIES],
}

mod off {
    use super::{MAX_DIR_ALIAS_LENGTH, MAX_HOSTNAME_LENGTH, MAX_RECIPIENT_LENGTH};

    pub(super) const DIR_ALIAS: usize = 0;
    pub(super) const HOST_ALIAS: usize = DIR_ALIAS + MAX_DIR_ALIAS_LENGTH;
    pub(super) const URL: usize = HOST_ALIAS + MAX_HOSTNAME_LENGTH;
    pub(super) const DIR_ID: usize = URL + MAX_RECIPIENT_LENGTH;
    pub(super) const DIR_FLAG: usize = DIR_ID + 4;
    pub(super) const DIR_OPTIONS: usize = DIR_FLAG + 4;
    pub(super) const DIR_STATUS: usize = DIR_OPTIONS + 4;
    pub(super) const PRIORITY: usize = DIR_STATUS + 1;
    pub(super) const DELETE_FILES_FLAG: usize = PRIORITY + 1;
    pub(super) const STUPID_MODE: usize = DELETE_FILES_FLAG + 1;
    pub(super) const END_CHARACTER: usize = STUPID_MODE + 1;
    pub(super) const GT_LT_SIGN: usize = END_CHARACTER + 4;
    pub(super) const MAX_COPIED_FILES: usize = GT_LT_SIGN + 4;
    pub(super) const ERROR_COUNTER: usize = MAX_COPIED_FILES + 4;
    pub(super) const IGNORE_SIZE: usize = ERROR_COUNTER + 4;
    pub(super) const IGNORE_FILE_TIME: usize = IGNORE_SIZE + 8;
    pub(super) const ACCUMULATE: usize = IGNORE_FILE_TIME + 4;
    pub(super) const MAX_COPIED_FILE_SIZE: usize = ACCUMULATE + 4;
    pub(super) const ACCUMULATE_SIZE: usize = MAX_COPIED_FILE_SIZE + 8;
    pub(super) const UNKNOWN_FILE_TIME: usize = ACCUMULATE_SIZE + 8;
    pub(super) const QUEUED_FILE_TIME: usize = UNKNOWN_FILE_TIME + 8;
    pub(super) const LOCKED_FILE_TIME: usize = QUEUED_FILE_TIME + 8;
    pub(super) const UNREADABLE_FILE_TIME: usize = LOCKED_FILE_TIME + 8;
    pub(super) const WARN_TIME: usize = UNREADABLE_FILE_TIME + 8;
    pub(super) const INFO_TIME: usize = WARN_TIME + 8;
    pub(super) const LAST_RETRIEVAL: usize = INFO_TIME + 8;
    pub(super) const NEXT_CHECK_TIME: usize = LAST_RETRIEVAL + 8;
    pub(super) const BYTES_IN_DIR: usize = NEXT_CHECK_TIME + 8;
    pub(super) const BYTES_IN_QUEUE: usize = BYTES_IN_DIR + 8;
    pub(super) const BYTES_RECEIVED: usize = BYTES_IN_QUEUE + 8;
    pub(super) const DUP_CHECK_TIMEOUT: usize = BYTES_RECEIVED + 8;
    pub(super) const DUP_CHECK_FLAG: usize = DUP_CHECK_TIMEOUT + 8;
    pub(super) const FILES_IN_DIR: usize = DUP_CHECK_FLAG + 8;
    pub(super) const FILES_QUEUED: usize = FILES_IN_DIR + 4;
    pub(super) const FILES_RECEIVED: usize = FILES_QUEUED + 4;
    pub(super) const REMOTE_FILE_CHECK_INTERVAL: usize = FILES_RECEIVED + 4;
    pub(super) const NO_OF_TIME_ENTRIES: usize = REMOTE_FILE_CHECK_INTERVAL + 4;
    pub(super) const FSA_POS: usize = NO_OF_TIME_ENTRIES + 4;
    pub(super) const TIME_ENTRIES: usize = FSA_POS + 8;

    const _: () = assert!(TIME_ENTRIES == 500);
}

impl DirStatus {
    /// Guards `dir_flag`, `files_queued` and `bytes_in_queue` together.
    ///
    /// These fields must change atomically so `FILES_IN_QUEUE` is set
    /// exactly when `files_queued` is positive; the whole record is locked.
    pub const LOCK_QUEUE: LockSlot = LockSlot::WHOLE;

    /// Directory record with DIR_CONFIG defaults.
    #[must_use]
    pub fn new(dir_alias: &str, url: &str) -> Self {
        Self {
            dir_alias: dir_alias.to_string(),
            url: url.to_string(),
            dir_id: checksums::dir_id(url),
            priority: b'9',
            end_character: -1,
            ignore_size: -1,
            max_copied_files: 100,
            max_copied_file_size: 100 * 1024 * 1024,
            unknown_file_time: 24 * 3600,
            queued_file_time: 24 * 3600,
            locked_file_time: 24 * 3600,
            unreadable_file_time: 24 * 3600,
            remote_file_check_interval: 60,
            fsa_pos: -1,
            ..Self::default()
        }
    }

    /// Whether any of `bits` are set in `dir_flag`.
    #[must_use]
    pub const fn has_flag(&self, bits: u32) -> bool {
        self.dir_flag & bits != 0
    }

    /// Whether any of `bits` are set in `dir_options`.
    #[must_use]
    pub const fn has_option(&self, bits: u32) -> bool {
        self.dir_options & bits != 0
    }

    /// Adds queued files, keeping `FILES_IN_QUEUE` consistent.
    pub fn queue_files(&mut self, files: u32, bytes: u64) {
        self.files_queued = self.files_queued.saturating_add(files);
        self.bytes_in_queue = self.bytes_in_queue.saturating_add(bytes);
        self.sync_queue_flag();
    }

    /// Removes delivered or deleted files from the queue counters.
    pub fn unqueue_files(&mut self, files: u32, bytes: u64) {
        self.files_queued = self.files_queued.saturating_sub(files);
        self.bytes_in_queue = self.bytes_in_queue.saturating_sub(bytes);
        if self.files_queued == 0 {
            self.bytes_in_queue = 0;
        }
        self.sync_queue_flag();
    }

    fn sync_queue_flag(&mut self) {
        if self.files_queued > 0 {
            self.dir_flag |= dir_flag::FILES_IN_QUEUE;
        } else {
            self.dir_flag &= !dir_flag::FILES_IN_QUEUE;
        }
    }

    /// The configured schedule entries.
    #[must_use]
    pub fn schedule(&self) -> &[TimeEntry] {
        let count = usize::from(self.no_of_time_entries).min(MAX_FRA_TIME_ENTRIES);
        &self.time_entries[..count]
    }
}

impl Record for DirStatus {
    const SIZE: usize = off::TIME_ENTRIES + MAX_FRA_TIME_ENTRIES * TimeEntry::SIZE;
    const VERSION: u8 = 3;

    fn decode(bytes: &[u8]) -> Self {
        let time_entries = std::array::from_fn(|entry| {
            let start = off::TIME_ENTRIES + entry * TimeEntry::SIZE;
            TimeEntry::decode(&bytes[start..start + TimeEntry::SIZE])
        });
        Self {
            dir_alias: get_str(bytes, off::DIR_ALIAS, MAX_DIR_ALIAS_LENGTH),
            host_alias: get_str(bytes, off::HOST_ALIAS, MAX_HOSTNAME_LENGTH),
            url: get_str(bytes, off::URL, MAX_RECIPIENT_LENGTH),
            dir_id: get_u32(bytes, off::DIR_ID),
            dir_flag: get_u32(bytes, off::DIR_FLAG),
            dir_options: get_u32(bytes, off::DIR_OPTIONS),
            dir_status: ScanState::from_code(get_u8(bytes, off::DIR_STATUS)),
            priority: get_u8(bytes, off::PRIORITY),
            delete_files_flag: get_u8(bytes, off::DELETE_FILES_FLAG),
            stupid_mode: StupidMode::from_code(get_u8(bytes, off::STUPID_MODE)),
            end_character: get_i32(bytes, off::END_CHARACTER),
            gt_lt_sign: get_u32(bytes, off::GT_LT_SIGN),
            max_copied_files: get_u32(bytes, off::MAX_COPIED_FILES),
            error_counter: get_u32(bytes, off::ERROR_COUNTER),
            ignore_size: get_i64(bytes, off::IGNORE_SIZE),
            ignore_file_time: get_u32(bytes, off::IGNORE_FILE_TIME),
            accumulate: get_u32(bytes, off::ACCUMULATE),
            max_copied_file_size: get_i64(bytes, off::MAX_COPIED_FILE_SIZE),
            accumulate_size: get_i64(bytes, off::ACCUMULATE_SIZE),
            unknown_file_time: get_i64(bytes, off::UNKNOWN_FILE_TIME),
            queued_file_time: get_i64(bytes, off::QUEUED_FILE_TIME),
            locked_file_time: get_i64(bytes, off::LOCKED_FILE_TIME),
            unreadable_file_time: get_i64(bytes, off::UNREADABLE_FILE_TIME),
            warn_time: get_i64(bytes, off::WARN_TIME),
            info_time: get_i64(bytes, off::INFO_TIME),
            last_retrieval: get_i64(bytes, off::LAST_RETRIEVAL),
            next_check_time: get_i64(bytes, off::NEXT_CHECK_TIME),
            bytes_in_dir: get_u64(bytes, off::BYTES_IN_DIR),
            bytes_in_queue: get_u64(bytes, off::BYTES_IN_QUEUE),
            bytes_received: get_u64(bytes, off::BYTES_RECEIVED),
            dup_check_timeout: get_i64(bytes, off::DUP_CHECK_TIMEOUT),
            dup_check_flag: get_u64(bytes, off::DUP_CHECK_FLAG),
            files_in_dir: get_u32(bytes, off::FILES_IN_DIR),
            files_queued: get_u32(bytes, off::FILES_QUEUED),
            files_received: get_u32(bytes, off::FILES_RECEIVED),
            remote_file_check_interval: get_u32(bytes, off::REMOTE_FILE_CHECK_INTERVAL),
            no_of_time_entries: get_u8(bytes, off::NO_OF_TIME_ENTRIES),
            fsa_pos: get_i32(bytes, off::FSA_POS),
            time_entries,
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        put_str(bytes, off::DIR_ALIAS, MAX_DIR_ALIAS_LENGTH, &self.dir_alias);
        put_str(bytes, off::HOST_ALIAS, MAX_HOSTNAME_LENGTH, &self.host_alias);
        put_str(bytes, off::URL, MAX_RECIPIENT_LENGTH, &self.url);
        put_u32(bytes, off::DIR_ID, self.dir_id);
        put_u32(bytes, off::DIR_FLAG, self.dir_flag);
        put_u32(bytes, off::DIR_OPTIONS, self.dir_options);
        put_u8(bytes, off::DIR_STATUS, self.dir_status.code());
        put_u8(bytes, off::PRIORITY, self.priority);
        put_u8(bytes, off::DELETE_FILES_FLAG, self.delete_files_flag);
        put_u8(bytes, off::STUPID_MODE, self.stupid_mode.code());
        put_i32(bytes, off::END_CHARACTER, self.end_character);
        put_u32(bytes, off::GT_LT_SIGN, self.gt_lt_sign);
        put_u32(bytes, off::MAX_COPIED_FILES, self.max_copied_files);
        put_u32(bytes, off::ERROR_COUNTER, self.error_counter);
        put_i64(bytes, off::IGNORE_SIZE, self.ignore_size);
        put_u32(bytes, off::IGNORE_FILE_TIME, self.ignore_file_time);
        put_u32(bytes, off::ACCUMULATE, self.accumulate);
        put_i64(bytes, off::MAX_COPIED_FILE_SIZE, self.max_copied_file_size);
        put_i64(bytes, off::ACCUMULATE_SIZE, self.accumulate_size);
        put_i64(bytes, off::UNKNOWN_FILE_TIME, self.unknown_file_time);
        put_i64(bytes, off::QUEUED_FILE_TIME, self.queued_file_time);
        put_i64(bytes, off::LOCKED_FILE_TIME, self.locked_file_time);
        put_i64(bytes, off::UNREADABLE_FILE_TIME, self.unreadable_file_time);
        put_i64(bytes, off::WARN_TIME, self.warn_time);
        put_i64(bytes, off::INFO_TIME, self.info_time);
        put_i64(bytes, off::LAST_RETRIEVAL, self.last_retrieval);
        put_i64(bytes, off::NEXT_CHECK_TIME, self.next_check_time);
        put_u64(bytes, off::BYTES_IN_DIR, self.bytes_in_dir);
        put_u64(bytes, off::BYTES_IN_QUEUE, self.bytes_in_queue);
        put_u64(bytes, off::BYTES_RECEIVED, self.bytes_received);
        put_i64(bytes, off::DUP_CHECK_TIMEOUT, self.dup_check_timeout);
        put_u64(bytes, off::DUP_CHECK_FLAG, self.dup_check_flag);
        put_u32(bytes, off::FILES_IN_DIR, self.files_in_dir);
        put_u32(bytes, off::FILES_QUEUED, self.files_queued);
        put_u32(bytes, off::FILES_RECEIVED, self.files_received);
        put_u32(
            bytes,
            off::REMOTE_FILE_CHECK_INTERVAL,
            self.remote_file_check_interval,
        );
        put_u8(bytes, off::NO_OF_TIME_ENTRIES, self.no_of_time_entries);
        put_i32(bytes, off::FSA_POS, self.fsa_pos);
        for (entry, time) in self.time_entries.iter().enumerate() {
            let start = off::TIME_ENTRIES + entry * TimeEntry::SIZE;
            time.encode(&mut bytes[start..start + TimeEntry::SIZE]);
        }
    }

    fn key(&self) -> String {
        self.dir_alias.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_through_bytes() {
        let mut dir = DirStatus::new("in_a", "/in/a");
        dir.dup_check_flag = (1 << 33) | 1;
        dir.no_of_time_entries = 1;
        dir.time_entries[0] = TimeEntry::EVERY_MINUTE;
        dir.stupid_mode = StupidMode::GetOnceOnly;
        let mut bytes = vec![0_u8; DirStatus::SIZE];
        dir.encode(&mut bytes);
        assert_eq!(DirStatus::decode(&bytes), dir);
        assert_eq!(dir.schedule().len(), 1);
    }

    #[test]
    fn time_entries_follow_fsa_pos() {
        assert_eq!(DirStatus::SIZE, 500 + MAX_FRA_TIME_ENTRIES * TimeEntry::SIZE);
        let mut dir = DirStatus::new("in_a", "/in/a");
        dir.fsa_pos = -7;
        dir.no_of_time_entries = MAX_FRA_TIME_ENTRIES as u8;
        dir.time_entries[MAX_FRA_TIME_ENTRIES - 1] = TimeEntry::EVERY_MINUTE;
        let mut bytes = vec![0_u8; DirStatus::SIZE];
        dir.encode(&mut bytes);
        let decoded = DirStatus::decode(&bytes);
        assert_eq!(decoded.fsa_pos, -7);
        assert_eq!(decoded.time_entries[MAX_FRA_TIME_ENTRIES - 1], TimeEntry::EVERY_MINUTE);
    }

    #[test]
    fn queue_flag_follows_files_queued() {
        let mut dir = DirStatus::new("in_a", "/in/a");
        dir.queue_files(2, 100);
        assert!(dir.has_flag(dir_flag::FILES_IN_QUEUE));
        dir.unqueue_files(1, 60);
        assert!(dir.has_flag(dir_flag::FILES_IN_QUEUE));
        dir.unqueue_files(5, 500);
        assert_eq!((dir.files_queued, dir.bytes_in_queue), (0, 0));
        assert!(!dir.has_flag(dir_flag::FILES_IN_QUEUE));
    }
}
