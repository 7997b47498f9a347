//! Job-ID registry records: `job_id_data`, `directory_names` and
//! `file_masks`.
//!
//! The configuration loader is the only writer. It replaces the files with
//! [`StatusArray::rebuild`](crate::StatusArray::rebuild) so AMG and FD see a
//! consistent registry after remapping.

use crate::codec::{get_i32, get_str, get_u8, get_u32, put_i32, put_str, put_u8, put_u32};
use crate::dir::{MAX_DIR_ALIAS_LENGTH, MAX_RECIPIENT_LENGTH};
use crate::host::MAX_HOSTNAME_LENGTH;
use crate::region::Record;

/// Field width of the long option string.
pub const MAX_OPTION_LENGTH: usize = 512;
/// Field width of the short (send-side) option string.
pub const MAX_SOPTION_LENGTH: usize = 256;
/// Field width of a directory path.
pub const MAX_PATH_LENGTH: usize = 256;
/// Field width of the joined mask text.
pub const MAX_FILE_MASK_BUFFER: usize = 1016;

/// One compiled job.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct JobIdRecord {
    /// Identifier.
    pub job_id: u32,
    /// Source directory.
    pub dir_id: u32,
    /// DSA position of the directory at compile time.
    pub dir_pos: i32,
    /// Mask set.
    pub file_mask_id: u32,
    /// DIR_CONFIG file the job came from.
    pub dir_config_id: u32,
    /// Destination host.
    pub host_id: u32,
    /// Base priority `'0'..='9'`.
    pub priority: u8,
    /// Options applied before the job is queued (`age-limit`, `archive`, ...).
    pub no_of_loptions: u8,
    /// Options applied by the sender (`lock`, `trans_rename`, ...).
    pub no_of_soptions: u8,
    /// Canonical recipient URL.
    pub recipient: String,
    /// Destination host alias.
    pub host_alias: String,
    /// Newline-separated local options.
    pub loptions: String,
    /// Newline-separated send options. The final byte is the collision salt.
    pub soptions: String,
}

mod job_off {
    use super::{MAX_HOSTNAME_LENGTH, MAX_OPTION_LENGTH, MAX_RECIPIENT_LENGTH};

    pub(super) const JOB_ID: usize = 0;
    pub(super) const DIR_ID: usize = 4;
    pub(super) const DIR_POS: usize = 8;
    pub(super) const FILE_MASK_ID: usize = 12;
    pub(super) const DIR_CONFIG_ID: usize = 16;
    pub(super) const HOST_ID: usize = 20;
    pub(super) const PRIORITY: usize = 24;
    pub(super) const NO_OF_LOPTIONS: usize = 25;
    pub(super) const NO_OF_SOPTIONS: usize = 26;
    pub(super) const RECIPIENT: usize = 28;
    pub(super) const HOST_ALIAS: usize = RECIPIENT + MAX_RECIPIENT_LENGTH;
    pub(super) const LOPTIONS: usize = HOST_ALIAS + MAX_HOSTNAME_LENGTH;
    pub(super) const SOPTIONS: usize = LOPTIONS + MAX_OPTION_LENGTH;
}

impl Record for JobIdRecord {
    const SIZE: usize = job_off::SOPTIONS + MAX_SOPTION_LENGTH + 4;
    const VERSION: u8 = 1;

    fn decode(bytes: &[u8]) -> Self {
        Self {
            job_id: get_u32(bytes, job_off::JOB_ID),
            dir_id: get_u32(bytes, job_off::DIR_ID),
            dir_pos: get_i32(bytes, job_off::DIR_POS),
            file_mask_id: get_u32(bytes, job_off::FILE_MASK_ID),
            dir_config_id: get_u32(bytes, job_off::DIR_CONFIG_ID),
            host_id: get_u32(bytes, job_off::HOST_ID),
            priority: get_u8(bytes, job_off::PRIORITY),
            no_of_loptions: get_u8(bytes, job_off::NO_OF_LOPTIONS),
            no_of_soptions: get_u8(bytes, job_off::NO_OF_SOPTIONS),
            recipient: get_str(bytes, job_off::RECIPIENT, MAX_RECIPIENT_LENGTH),
            host_alias: get_str(bytes, job_off::HOST_ALIAS, MAX_HOSTNAME_LENGTH),
            loptions: get_str(bytes, job_off::LOPTIONS, MAX_OPTION_LENGTH),
            soptions: get_str(bytes, job_off::SOPTIONS, MAX_SOPTION_LENGTH),
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        put_u32(bytes, job_off::JOB_ID, self.job_id);
        put_u32(bytes, job_off::DIR_ID, self.dir_id);
        put_i32(bytes, job_off::DIR_POS, self.dir_pos);
        put_u32(bytes, job_off::FILE_MASK_ID, self.file_mask_id);
        put_u32(bytes, job_off::DIR_CONFIG_ID, self.dir_config_id);
        put_u32(bytes, job_off::HOST_ID, self.host_id);
        put_u8(bytes, job_off::PRIORITY, self.priority);
        put_u8(bytes, job_off::NO_OF_LOPTIONS, self.no_of_loptions);
        put_u8(bytes, job_off::NO_OF_SOPTIONS, self.no_of_soptions);
        put_str(bytes, job_off::RECIPIENT, MAX_RECIPIENT_LENGTH, &self.recipient);
        put_str(bytes, job_off::HOST_ALIAS, MAX_HOSTNAME_LENGTH, &self.host_alias);
        put_str(bytes, job_off::LOPTIONS, MAX_OPTION_LENGTH, &self.loptions);
        put_str(bytes, job_off::SOPTIONS, MAX_SOPTION_LENGTH, &self.soptions);
    }

    fn key(&self) -> String {
        format!("{:x}", self.job_id)
    }
}

/// Directory id to alias and path.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DirNameRecord {
    /// CRC-32 of `dir_name`.
    pub dir_id: u32,
    /// Alias.
    pub dir_alias: String,
    /// Path or URL.
    pub dir_name: String,
}

impl Record for DirNameRecord {
    const SIZE: usize = 4 + MAX_DIR_ALIAS_LENGTH + MAX_PATH_LENGTH + 4;
    const VERSION: u8 = 1;

    fn decode(bytes: &[u8]) -> Self {
        Self {
            dir_id: get_u32(bytes, 0),
            dir_alias: get_str(bytes, 4, MAX_DIR_ALIAS_LENGTH),
            dir_name: get_str(bytes, 4 + MAX_DIR_ALIAS_LENGTH, MAX_PATH_LENGTH),
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        put_u32(bytes, 0, self.dir_id);
        put_str(bytes, 4, MAX_DIR_ALIAS_LENGTH, &self.dir_alias);
        put_str(bytes, 4 + MAX_DIR_ALIAS_LENGTH, MAX_PATH_LENGTH, &self.dir_name);
    }

    fn key(&self) -> String {
        format!("{:x}", self.dir_id)
    }
}

/// A registered mask set.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileMaskRecord {
    /// CRC-32 over the masks.
    pub file_mask_id: u32,
    /// Masks in configured order.
    pub masks: Vec<String>,
}

impl Record for FileMaskRecord {
    const SIZE: usize = 8 + MAX_FILE_MASK_BUFFER;
    const VERSION: u8 = 1;

    fn decode(bytes: &[u8]) -> Self {
        let count = get_u32(bytes, 4) as usize;
        let text = get_str(bytes, 8, MAX_FILE_MASK_BUFFER);
        Self {
            file_mask_id: get_u32(bytes, 0),
            masks: text.split('\n').take(count).map(str::to_string).collect(),
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        put_u32(bytes, 0, self.file_mask_id);
        put_u32(bytes, 4, self.masks.len() as u32);
        put_str(bytes, 8, MAX_FILE_MASK_BUFFER, &self.masks.join("\n"));
    }

    fn key(&self) -> String {
        format!("{:x}", self.file_mask_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_record_round_trips() {
        let job = JobIdRecord {
            job_id: 0xdead_beef,
            dir_id: 7,
            dir_pos: 2,
            file_mask_id: 9,
            dir_config_id: 1,
            host_id: 3,
            priority: b'5',
            no_of_loptions: 1,
            no_of_soptions: 1,
            recipient: "file:///out".into(),
            host_alias: "h1".into(),
            loptions: "age-limit 60".into(),
            soptions: "lock DOT".into(),
        };
        let mut bytes = vec![0_u8; JobIdRecord::SIZE];
        job.encode(&mut bytes);
        assert_eq!(JobIdRecord::decode(&bytes), job);
        assert_eq!(job.key(), "deadbeef");
    }

    #[test]
    fn mask_record_keeps_order() {
        let masks = FileMaskRecord {
            file_mask_id: 1,
            masks: vec!["!*.tmp".into(), "*".into()],
        };
        let mut bytes = vec![0_u8; FileMaskRecord::SIZE];
        masks.encode(&mut bytes);
        assert_eq!(FileMaskRecord::decode(&bytes), masks);
    }
}
