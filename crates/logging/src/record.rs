//! Structured record logs.
//!
//! Records are line-oriented: fields are separated by `'|'` and each record
//! ends with `'\0'` on the wire. Free-text fields that may contain `'|'` are
//! either the last field or preceded by their byte length, so every record
//! parses left to right without ambiguity.

use std::fmt::Write as _;
use std::str::FromStr;

/// Error raised while decoding a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// The record ended before all fields were read.
    #[error("record truncated while reading {0}")]
    Truncated(&'static str),
    /// A numeric field did not parse.
    #[error("invalid {field} value `{value}`")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Offending text.
        value: String,
    },
}

/// Which record log a record belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RecordKind {
    /// One record per delivered or discarded output file.
    Output,
    /// One record per deleted file.
    Delete,
    /// One record per file picked up from a source directory.
    Input,
    /// One record per picked-up file listing the jobs it was distributed to.
    Distribution,
    /// One record per file produced by a local conversion (rename, exec).
    Production,
}

impl RecordKind {
    /// All kinds in a fixed order.
    pub const ALL: [Self; 5] = [
        Self::Output,
        Self::Delete,
        Self::Input,
        Self::Distribution,
        Self::Production,
    ];

    /// Name of the active log file.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Output => "OUTPUT_LOG.0",
            Self::Delete => "DELETE_LOG.0",
            Self::Input => "INPUT_LOG.0",
            Self::Distribution => "DISTRIBUTION_LOG.0",
            Self::Production => "PRODUCTION_LOG.0",
        }
    }

    /// Name of the fifo the logger for this kind reads from.
    #[must_use]
    pub const fn fifo_name(self) -> &'static str {
        match self {
            Self::Output => "output_log.fifo",
            Self::Delete => "delete_log.fifo",
            Self::Input => "input_log.fifo",
            Self::Distribution => "distribution_log.fifo",
            Self::Production => "production_log.fifo",
        }
    }
}

/// Outcome class written into output records.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OutputType {
    /// Delivered to the remote side.
    NormalDelivered,
    /// Discarded because the job's age limit had passed.
    AgeLimitDelete,
    /// Discarded because the host is disabled.
    HostDisabledDelete,
    /// Discarded as a duplicate.
    DuplicateDelete,
    /// Discarded because the remote rejected the address.
    AdressRejDelete,
    /// Discarded by another process (operator delete).
    OtherProcDelete,
    /// Unclassified.
    Unknown,
}

impl OutputType {
    /// Numeric code written to the log.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::NormalDelivered => 0,
            Self::AgeLimitDelete => 1,
            Self::HostDisabledDelete => 2,
            Self::DuplicateDelete => 3,
            Self::AdressRejDelete => 4,
            Self::OtherProcDelete => 5,
            Self::Unknown => 6,
        }
    }

    /// Parses a numeric code; out-of-range codes map to [`Self::Unknown`].
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => Self::NormalDelivered,
            1 => Self::AgeLimitDelete,
            2 => Self::HostDisabledDelete,
            3 => Self::DuplicateDelete,
            4 => Self::AdressRejDelete,
            5 => Self::OtherProcDelete,
            _ => Self::Unknown,
        }
    }

    /// Symbolic name as shown by log viewers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NormalDelivered => "OT_NORMAL_DELIVERED",
            Self::AgeLimitDelete => "OT_AGE_LIMIT_DELETE",
            Self::HostDisabledDelete => "OT_HOST_DISABLED_DELETE",
            Self::DuplicateDelete => "OT_DUPLICATE_DELETE",
            Self::AdressRejDelete => "OT_ADRESS_REJ_DELETE",
            Self::OtherProcDelete => "OT_OTHER_PROC_DELETE",
            Self::Unknown => "OT_UNKNOWN",
        }
    }
}

macro_rules! delete_reasons {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Why a file was deleted.
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum DeleteReason {
            $(
                #[doc = $name]
                $variant,
            )+
        }

        impl DeleteReason {
            /// Symbolic name written to the delete log.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl FromStr for DeleteReason {
            type Err = RecordError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($name => Ok(Self::$variant),)+
                    other => Err(RecordError::InvalidField {
                        field: "delete_reason",
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

delete_reasons! {
    AgeOutput => "AGE_OUTPUT",
    AgeInput => "AGE_INPUT",
    UserDel => "USER_DEL",
    ExecFailedDel => "EXEC_FAILED_DEL",
    NoMessageFileDel => "NO_MESSAGE_FILE_DEL",
    DupInput => "DUP_INPUT",
    DupOutput => "DUP_OUTPUT",
    DelUnknownFile => "DEL_UNKNOWN_FILE",
    DelUnreadableFile => "DEL_UNREADABLE_FILE",
    DelQueuedFile => "DEL_QUEUED_FILE",
    DelOldLockedFile => "DEL_OLD_LOCKED_FILE",
    DelOldRlockedFile => "DEL_OLD_RLOCKED_FILE",
    JidLookupFailureDel => "JID_LOOKUP_FAILURE_DEL",
    HostDisabledDel => "HOST_DISABLED_DEL",
    ConversionFailed => "CONVERSION_FAILED",
}

/// Output-log record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputRecord {
    /// Time the record was written.
    pub time: i64,
    /// Job the file belonged to.
    pub job_id: u32,
    /// Source directory.
    pub dir_id: u32,
    /// Time the file was picked up.
    pub input_time: i64,
    /// Split-job counter of the message.
    pub split_job_counter: u32,
    /// Unique number of the message.
    pub unique_number: u32,
    /// Size of the file in bytes.
    pub file_size: u64,
    /// Host alias.
    pub host_name: String,
    /// Outcome.
    pub output_type: OutputType,
    /// Name of the file as delivered.
    pub file_name: String,
    /// Archive directory relative to the archive root, when archived.
    pub archive_dir: Option<String>,
}

/// `host_name` of delete records written before any host was involved.
pub const NO_HOST: &str = "-";

/// Delete-log record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeleteRecord {
    /// Time the record was written.
    pub time: i64,
    /// Host alias, [`NO_HOST`] for input-side deletes.
    pub host_name: String,
    /// Size of the deleted file.
    pub file_size: u64,
    /// Job id, zero for input-side deletes.
    pub job_id: u32,
    /// Source directory.
    pub dir_id: u32,
    /// Reason.
    pub reason: DeleteReason,
    /// Deleted file name.
    pub file_name: String,
    /// Component that deleted the file.
    pub proc_user: String,
}

/// Input-log record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InputRecord {
    /// Time the record was written.
    pub time: i64,
    /// Source directory.
    pub dir_id: u32,
    /// File size.
    pub file_size: u64,
    /// File name.
    pub file_name: String,
}

/// Distribution-log record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DistributionRecord {
    /// Time the record was written.
    pub time: i64,
    /// Source directory.
    pub dir_id: u32,
    /// Unique number of the batch.
    pub unique_number: u32,
    /// File size.
    pub file_size: u64,
    /// Jobs the file was handed to.
    pub job_ids: Vec<u32>,
    /// File name.
    pub file_name: String,
}

/// Production-log record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProductionRecord {
    /// Time the record was written.
    pub time: i64,
    /// Input to output file ratio, e.g. `1:1`.
    pub ratio: String,
    /// Job that produced the file.
    pub job_id: u32,
    /// Name before conversion.
    pub original_name: String,
    /// Name after conversion.
    pub new_name: String,
    /// Conversion that was applied.
    pub command: String,
}

/// Any record-log entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogRecord {
    /// See [`OutputRecord`].
    Output(OutputRecord),
    /// See [`DeleteRecord`].
    Delete(DeleteRecord),
    /// See [`InputRecord`].
    Input(InputRecord),
    /// See [`DistributionRecord`].
    Distribution(DistributionRecord),
    /// See [`ProductionRecord`].
    Production(ProductionRecord),
}

impl LogRecord {
    /// Record log this entry belongs to.
    #[must_use]
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Output(_) => RecordKind::Output,
            Self::Delete(_) => RecordKind::Delete,
            Self::Input(_) => RecordKind::Input,
            Self::Distribution(_) => RecordKind::Distribution,
            Self::Production(_) => RecordKind::Production,
        }
    }

    /// Renders the `'|'`-separated fields without terminator.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = String::new();
        match self {
            Self::Output(r) => {
                let _ = write!(
                    line,
                    "{}|{:x}|{:x}|{:x}|{}|{}|{}|{}|{}|{}|{}",
                    r.time,
                    r.job_id,
                    r.dir_id,
                    r.input_time,
                    r.split_job_counter,
                    r.unique_number,
                    r.file_name.len(),
                    r.file_size,
                    r.host_name,
                    r.output_type.code(),
                    r.file_name
                );
                if let Some(archive) = &r.archive_dir {
                    let _ = write!(line, "|{archive}");
                }
            }
            Self::Delete(r) => {
                let _ = write!(
                    line,
                    "{}|{}|{}|{:x}|{:x}|{}|{}|{}|{}",
                    r.time,
                    r.host_name,
                    r.file_size,
                    r.job_id,
                    r.dir_id,
                    r.reason.as_str(),
                    r.file_name.len(),
                    r.file_name,
                    r.proc_user
                );
            }
            Self::Input(r) => {
                let _ = write!(
                    line,
                    "{}|{:x}|{}|{}",
                    r.time, r.dir_id, r.file_size, r.file_name
                );
            }
            Self::Distribution(r) => {
                let _ = write!(
                    line,
                    "{}|{:x}|{}|{}|{}",
                    r.time,
                    r.dir_id,
                    r.unique_number,
                    r.file_size,
                    r.job_ids.len()
                );
                for job_id in &r.job_ids {
                    let _ = write!(line, "|{job_id:x}");
                }
                let _ = write!(line, "|{}", r.file_name);
            }
            Self::Production(r) => {
                let _ = write!(
                    line,
                    "{}|{}|{:x}|{}|{}|{}|{}|{}",
                    r.time,
                    r.ratio,
                    r.job_id,
                    r.original_name.len(),
                    r.original_name,
                    r.new_name.len(),
                    r.new_name,
                    r.command
                );
            }
        }
        line
    }

    /// Encodes the record for a fifo: fields plus `'\0'` terminator.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.to_line().into_bytes();
        bytes.push(0);
        bytes
    }

    /// Decodes one record of `kind`. A trailing `'\0'` or `'\n'` is ignored.
    pub fn decode(kind: RecordKind, bytes: &[u8]) -> Result<Self, RecordError> {
        let text = String::from_utf8_lossy(bytes);
        let text = text.trim_end_matches(['\0', '\n']);
        let mut fields = Fields { rest: Some(text) };
        let record = match kind {
            RecordKind::Output => {
                let time = fields.number("time")?;
                let job_id = fields.hex("job_id")?;
                let dir_id = fields.hex("dir_id")?;
                let input_time = fields.hex_i64("input_time")?;
                let split_job_counter = fields.number("split_job_counter")?;
                let unique_number = fields.number("unique_number")?;
                let name_length: usize = fields.number("file_name_length")?;
                let file_size = fields.number("file_size")?;
                let host_name = fields.next("host_name")?.to_string();
                let output_type = OutputType::from_code(fields.number("output_type")?);
                let file_name = fields.take(name_length, "file_name")?.to_string();
                let archive_dir = fields.rest().map(str::to_string);
                Self::Output(OutputRecord {
                    time,
                    job_id,
                    dir_id,
                    input_time,
                    split_job_counter,
                    unique_number,
                    file_size,
                    host_name,
                    output_type,
                    file_name,
                    archive_dir,
                })
            }
            RecordKind::Delete => {
                let time = fields.number("time")?;
                let host_name = fields.next("host_name")?.to_string();
                let file_size = fields.number("file_size")?;
                let job_id = fields.hex("job_id")?;
                let dir_id = fields.hex("dir_id")?;
                let reason = fields.next("delete_reason")?.parse()?;
                let name_length: usize = fields.number("file_name_length")?;
                let file_name = fields.take(name_length, "file_name")?.to_string();
                let proc_user = fields.rest().unwrap_or_default().to_string();
                Self::Delete(DeleteRecord {
                    time,
                    host_name,
                    file_size,
                    job_id,
                    dir_id,
                    reason,
                    file_name,
                    proc_user,
                })
            }
            RecordKind::Input => Self::Input(InputRecord {
                time: fields.number("time")?,
                dir_id: fields.hex("dir_id")?,
                file_size: fields.number("file_size")?,
                file_name: fields.rest().unwrap_or_default().to_string(),
            }),
            RecordKind::Distribution => {
                let time = fields.number("time")?;
                let dir_id = fields.hex("dir_id")?;
                let unique_number = fields.number("unique_number")?;
                let file_size = fields.number("file_size")?;
                let count: usize = fields.number("job_count")?;
                let job_ids = (0..count)
                    .map(|_| fields.hex("job_id"))
                    .collect::<Result<Vec<_>, _>>()?;
                let file_name = fields.rest().unwrap_or_default().to_string();
                Self::Distribution(DistributionRecord {
                    time,
                    dir_id,
                    unique_number,
                    file_size,
                    job_ids,
                    file_name,
                })
            }
            RecordKind::Production => {
                let time = fields.number("time")?;
                let ratio = fields.next("ratio")?.to_string();
                let job_id = fields.hex("job_id")?;
                let original_length: usize = fields.number("original_name_length")?;
                let original_name = fields.take(original_length, "original_name")?.to_string();
                let new_length: usize = fields.number("new_name_length")?;
                let new_name = fields.take(new_length, "new_name")?.to_string();
                let command = fields.rest().unwrap_or_default().to_string();
                Self::Production(ProductionRecord {
                    time,
                    ratio,
                    job_id,
                    original_name,
                    new_name,
                    command,
                })
            }
        };
        Ok(record)
    }
}

struct Fields<'a> {
    rest: Option<&'a str>,
}

impl<'a> Fields<'a> {
    fn next(&mut self, name: &'static str) -> Result<&'a str, RecordError> {
        let rest = self.rest.ok_or(RecordError::Truncated(name))?;
        match rest.split_once('|') {
            Some((field, tail)) => {
                self.rest = Some(tail);
                Ok(field)
            }
            None => {
                self.rest = None;
                Ok(rest)
            }
        }
    }

    fn take(&mut self, len: usize, name: &'static str) -> Result<&'a str, RecordError> {
        let rest = self.rest.ok_or(RecordError::Truncated(name))?;
        let field = rest.get(..len).ok_or(RecordError::Truncated(name))?;
        let tail = &rest[len..];
        self.rest = tail.strip_prefix('|');
        Ok(field)
    }

    fn rest(&mut self) -> Option<&'a str> {
        self.rest.take()
    }

    fn number<T: FromStr>(&mut self, name: &'static str) -> Result<T, RecordError> {
        let field = self.next(name)?;
        field.parse().map_err(|_| RecordError::InvalidField {
            field: name,
            value: field.to_string(),
        })
    }

    fn hex(&mut self, name: &'static str) -> Result<u32, RecordError> {
        let field = self.next(name)?;
        u32::from_str_radix(field, 16).map_err(|_| RecordError::InvalidField {
            field: name,
            value: field.to_string(),
        })
    }

    fn hex_i64(&mut self, name: &'static str) -> Result<i64, RecordError> {
        let field = self.next(name)?;
        i64::from_str_radix(field, 16).map_err(|_| RecordError::InvalidField {
            field: name,
            value: field.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(file_name: &str, archive_dir: Option<&str>) -> LogRecord {
        LogRecord::Output(OutputRecord {
            time: 1_700_000_000,
            job_id: 0xdead_beef,
            dir_id: 0x42,
            input_time: 4096,
            split_job_counter: 1,
            unique_number: 9,
            file_size: 1024,
            host_name: "h1".into(),
            output_type: OutputType::NormalDelivered,
            file_name: file_name.into(),
            archive_dir: archive_dir.map(str::to_string),
        })
    }

    #[test]
    fn output_record_layout_matches_field_order() {
        let line = output("x.dat", None).to_line();
        assert_eq!(line, "1700000000|deadbeef|42|1000|1|9|5|1024|h1|0|x.dat");
    }

    #[test]
    fn file_names_containing_separators_decode() {
        let record = output("a|b.dat", Some("h1/2023/318/deadbeef"));
        let decoded = LogRecord::decode(RecordKind::Output, &record.encode()).expect("decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn delete_record_decodes_reason_and_user() {
        let record = LogRecord::Delete(DeleteRecord {
            time: 5,
            host_name: "h3".into(),
            file_size: 10,
            job_id: 0x1,
            dir_id: 0x2,
            reason: DeleteReason::AgeOutput,
            file_name: "old|file".into(),
            proc_user: "fd".into(),
        });
        let line = record.to_line();
        assert!(line.contains("|AGE_OUTPUT|"));
        assert_eq!(LogRecord::decode(RecordKind::Delete, line.as_bytes()), Ok(record));
    }

    #[test]
    fn distribution_record_lists_all_jobs() {
        let record = LogRecord::Distribution(DistributionRecord {
            time: 1,
            dir_id: 0xa,
            unique_number: 3,
            file_size: 7,
            job_ids: vec![0x10, 0x20],
            file_name: "y.dat".into(),
        });
        assert_eq!(record.to_line(), "1|a|3|7|2|10|20|y.dat");
        assert_eq!(
            LogRecord::decode(RecordKind::Distribution, record.to_line().as_bytes()),
            Ok(record)
        );
    }

    #[test]
    fn truncated_record_is_rejected() {
        assert_eq!(
            LogRecord::decode(RecordKind::Input, b"1|a"),
            Err(RecordError::Truncated("file_size"))
        );
    }

    #[test]
    fn unknown_delete_reason_is_an_error() {
        assert!("NOPE".parse::<DeleteReason>().is_err());
        assert_eq!("DUP_INPUT".parse::<DeleteReason>(), Ok(DeleteReason::DupInput));
    }
}
