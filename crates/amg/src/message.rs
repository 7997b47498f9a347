//! Job messages passed from the scanner to the distributor.
//!
//! Each message names one pool batch. On `msg.fifo` it travels as a fixed
//! width little-endian record of [`MAX_BIN_MSG_LENGTH`] bytes:
//!
//! | offset | field |
//! |---|---|
//! | 0 | creation time (i64) |
//! | 8 | device of the pool batch (u64, 0 when unknown) |
//! | 16 | job id |
//! | 20 | dir id |
//! | 24 | counter |
//! | 28 | unique number |
//! | 32 | split job counter |
//! | 36 | total bytes (u64) |
//! | 44 | file count |
//! | 48 | priority byte |
//! | 49 | flag byte |

use std::fmt;
use std::str::FromStr;

/// Encoded length of one [`JobMessage`].
pub const MAX_BIN_MSG_LENGTH: usize = 56;

/// Batches sharing one `counter` subdirectory.
pub const BATCHES_PER_COUNTER: u32 = 1000;

/// Message flag bits.
pub mod msg_flag {
    /// The batch was fetched from a remote directory.
    pub const FROM_RETRIEVE: u8 = 1 << 0;
    /// Sent again by operator request.
    pub const RESEND: u8 = 1 << 1;
}

/// Pool-relative name of a batch:
/// `<job_id>/<counter>/<creation_time>_<unique>_<split>`, all hexadecimal.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MessageName {
    /// Job the batch belongs to.
    pub job_id: u32,
    /// Pool subdirectory bucket.
    pub counter: u32,
    /// Unix time the batch was created.
    pub creation_time: i64,
    /// Number shared by every batch created from one scan.
    pub unique_number: u32,
    /// Position of the job among those fed by that scan.
    pub split_job_counter: u32,
}

impl fmt::Display for MessageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:x}/{:x}/{:x}_{:x}_{:x}",
            self.job_id, self.counter, self.creation_time, self.unique_number, self.split_job_counter
        )
    }
}

/// A string that is not a message name.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid message name '{0}'")]
pub struct InvalidMessageName(pub String);

impl FromStr for MessageName {
    type Err = InvalidMessageName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMessageName(s.to_string());
        let mut parts = s.splitn(3, '/');
        let (Some(job), Some(counter), Some(rest)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let mut tail = rest.splitn(3, '_');
        let (Some(time), Some(unique), Some(split)) = (tail.next(), tail.next(), tail.next())
        else {
            return Err(invalid());
        };
        let hex = |text: &str| u32::from_str_radix(text, 16).map_err(|_| invalid());
        Ok(Self {
            job_id: hex(job)?,
            counter: hex(counter)?,
            creation_time: i64::from_str_radix(time, 16).map_err(|_| invalid())?,
            unique_number: hex(unique)?,
            split_job_counter: hex(split)?,
        })
    }
}

/// One batch announced to the distributor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct JobMessage {
    /// Batch identity.
    pub name: MessageName,
    /// Device holding the batch.
    pub dev: u64,
    /// Source directory.
    pub dir_id: u32,
    /// Sum of file sizes.
    pub file_size: u64,
    /// Number of files.
    pub files: u32,
    /// Priority `'0'..='9'`.
    pub priority: u8,
    /// [`msg_flag`] bits.
    pub flag: u8,
}

impl JobMessage {
    /// Job the batch belongs to.
    #[must_use]
    pub const fn job_id(&self) -> u32 {
        self.name.job_id
    }

    /// Wire bytes.
    #[must_use]
    pub fn encode(&self) -> [u8; MAX_BIN_MSG_LENGTH] {
        let mut bytes = [0_u8; MAX_BIN_MSG_LENGTH];
        bytes[0..8].copy_from_slice(&self.name.creation_time.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.dev.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.name.job_id.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.dir_id.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.name.counter.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.name.unique_number.to_le_bytes());
        bytes[32..36].copy_from_slice(&self.name.split_job_counter.to_le_bytes());
        bytes[36..44].copy_from_slice(&self.file_size.to_le_bytes());
        bytes[44..48].copy_from_slice(&self.files.to_le_bytes());
        bytes[48] = self.priority;
        bytes[49] = self.flag;
        bytes
    }

    /// Decodes one record; `None` when `bytes` is short or the priority is
    /// not a digit.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < MAX_BIN_MSG_LENGTH {
            return None;
        }
        let u32_at = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let u64_at = |at: usize| {
            let mut raw = [0_u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(raw)
        };
        let priority = bytes[48];
        if !priority.is_ascii_digit() {
            return None;
        }
        Some(Self {
            name: MessageName {
                job_id: u32_at(16),
                counter: u32_at(24),
                creation_time: u64_at(0) as i64,
                unique_number: u32_at(28),
                split_job_counter: u32_at(32),
            },
            dev: u64_at(8),
            dir_id: u32_at(20),
            file_size: u64_at(36),
            files: u32_at(44),
            priority,
            flag: bytes[49],
        })
    }
}

/// Reassembles messages from a byte stream read in arbitrary chunks.
#[derive(Debug, Default)]
pub struct MessageReader {
    pending: Vec<u8>,
    rejected: u64,
}

impl MessageReader {
    /// Empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every complete message.
    ///
    /// Records that fail to decode are counted and skipped so one garbled
    /// write does not stall the stream.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<JobMessage> {
        self.pending.extend_from_slice(chunk);
        let complete = self.pending.len() / MAX_BIN_MSG_LENGTH * MAX_BIN_MSG_LENGTH;
        let mut messages = Vec::with_capacity(complete / MAX_BIN_MSG_LENGTH);
        for record in self.pending[..complete].chunks_exact(MAX_BIN_MSG_LENGTH) {
            match JobMessage::decode(record) {
                Some(message) => messages.push(message),
                None => self.rejected += 1,
            }
        }
        self.pending.drain(..complete);
        messages
    }

    /// Records skipped as undecodable.
    #[must_use]
    pub const fn rejected(&self) -> u64 {
        self.rejected
    }
}
