//! `fd_msg_queue`: the queue written out so a restart resumes it.
//!
//! Each record is the job message followed by the queue bookkeeping; the
//! file uses the same header and rebuild-by-rename as the other status
//! files.

use std::path::Path;

use amg::{JobMessage, MAX_BIN_MSG_LENGTH};
use status::{Access, Record, StatusArray, StatusError};

use crate::queue::QueueEntry;

const MSG_NUMBER: usize = MAX_BIN_MSG_LENGTH;
const RETRIES: usize = MSG_NUMBER + 8;
const PERMANENT: usize = RETRIES + 4;
const SPECIAL_FLAG: usize = PERMANENT + 4;
const HOST_ALIAS: usize = SPECIAL_FLAG + 4;
const HOST_ALIAS_LENGTH: usize = 40;

/// One persisted queue element.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueRecord {
    /// The message, `None` when the stored bytes do not decode.
    pub message: Option<JobMessage>,
    /// Destination host alias.
    pub host_alias: String,
    /// Ordering key.
    pub msg_number: f64,
    /// Failed attempts.
    pub retries: u32,
    /// Consecutive permanent failures.
    pub permanent_failures: u32,
    /// Queue flags.
    pub special_flag: u8,
}

impl QueueRecord {
    /// Record for a live entry.
    #[must_use]
    pub fn from_entry(entry: &QueueEntry) -> Self {
        Self {
            message: Some(entry.message),
            host_alias: entry.host_alias.clone(),
            msg_number: entry.msg_number,
            retries: entry.retries,
            permanent_failures: entry.permanent_failures,
            special_flag: entry.special_flag,
        }
    }

    /// Queue entry rebuilt from this record.
    #[must_use]
    pub fn into_entry(self) -> Option<QueueEntry> {
        let message = self.message?;
        let mut entry = QueueEntry::new(message, &self.host_alias, true);
        entry.msg_number = self.msg_number;
        entry.retries = self.retries;
        entry.permanent_failures = self.permanent_failures;
        entry.special_flag = self.special_flag;
        Some(entry)
    }
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

impl Record for QueueRecord {
    const SIZE: usize = HOST_ALIAS + HOST_ALIAS_LENGTH;
    const VERSION: u8 = 1;

    fn decode(bytes: &[u8]) -> Self {
        let mut raw = [0_u8; 8];
        raw.copy_from_slice(&bytes[MSG_NUMBER..MSG_NUMBER + 8]);
        let alias = &bytes[HOST_ALIAS..HOST_ALIAS + HOST_ALIAS_LENGTH];
        let end = alias.iter().position(|&byte| byte == 0).unwrap_or(alias.len());
        Self {
            message: JobMessage::decode(&bytes[..MAX_BIN_MSG_LENGTH]),
            host_alias: String::from_utf8_lossy(&alias[..end]).into_owned(),
            msg_number: f64::from_le_bytes(raw),
            retries: u32_at(bytes, RETRIES),
            permanent_failures: u32_at(bytes, PERMANENT),
            special_flag: bytes[SPECIAL_FLAG],
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        bytes.fill(0);
        if let Some(message) = &self.message {
            bytes[..MAX_BIN_MSG_LENGTH].copy_from_slice(&message.encode());
        }
        bytes[MSG_NUMBER..MSG_NUMBER + 8].copy_from_slice(&self.msg_number.to_le_bytes());
        bytes[RETRIES..RETRIES + 4].copy_from_slice(&self.retries.to_le_bytes());
        bytes[PERMANENT..PERMANENT + 4].copy_from_slice(&self.permanent_failures.to_le_bytes());
        bytes[SPECIAL_FLAG] = self.special_flag;
        let alias = self.host_alias.as_bytes();
        let len = alias.len().min(HOST_ALIAS_LENGTH - 1);
        bytes[HOST_ALIAS..HOST_ALIAS + len].copy_from_slice(&alias[..len]);
    }

    fn key(&self) -> String {
        self.message
            .map(|message| message.name.to_string())
            .unwrap_or_default()
    }
}

/// Writes `entries` to `path`, replacing what was there.
pub fn save<'a>(path: &Path, entries: impl Iterator<Item = &'a QueueEntry>) -> Result<(), StatusError> {
    let records: Vec<QueueRecord> = entries.map(QueueRecord::from_entry).collect();
    StatusArray::create(path, &records).map(drop)
}

/// Entries stored at `path`; nothing when the file does not exist.
pub fn load(path: &Path) -> Result<Vec<QueueEntry>, StatusError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let array = StatusArray::<QueueRecord>::open(path, Access::ReadOnly)?;
    Ok(array
        .snapshot()
        .into_iter()
        .filter_map(QueueRecord::into_entry)
        .collect())
}

#[cfg(test)]
mod tests {
    use amg::MessageName;

    use super::*;

    fn entry(unique: u32) -> QueueEntry {
        let message = JobMessage {
            name: MessageName {
                job_id: 0x42,
                counter: 0,
                creation_time: 1_700_000_000,
                unique_number: unique,
                split_job_counter: 0,
            },
            dev: 0,
            dir_id: 9,
            file_size: 2048,
            files: 2,
            priority: b'3',
            flag: 0,
        };
        let mut entry = QueueEntry::new(message, "h1", true);
        entry.retries = 4;
        entry
    }

    #[test]
    fn queue_survives_a_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fd_msg_queue");
        let entries = [entry(1), entry(2)];
        save(&path, entries.iter()).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].name().unique_number, 2);
        assert_eq!(loaded[1].retries, 4);
        assert_eq!(loaded[1].host_alias, "h1");
        assert_eq!(loaded[1].msg_number, entries[1].msg_number);
        assert!(!loaded[1].in_progress());
    }

    #[test]
    fn missing_file_is_an_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(&dir.path().join("fd_msg_queue")).unwrap().is_empty());
    }
}
