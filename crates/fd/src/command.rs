//! Commands read from `fd_cmd.fifo` and `fd_delete.fifo`.
//!
//! `fd_cmd` records are one code byte; `RETRY` is followed by the host's
//! position as a little-endian `i32`. `fd_delete` records are one code
//! byte followed by NUL-terminated text fields:
//!
//! | command | fields |
//! |---|---|
//! | `DELETE_ALL_JOBS_FROM_HOST` | host alias |
//! | `DELETE_MESSAGE` | message name |
//! | `DELETE_SINGLE_FILE` | message name, file name |
//! | `DELETE_RETRIEVE` | message name |
//! | `DELETE_RETRIEVES_FROM_DIR` | dir alias |

use amg::MessageName;

/// A command on `fd_cmd.fifo`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FdCommand {
    /// Queue state of a host changed; walk the queue again.
    Queue,
    /// Transfer state of a host changed; close idle connections of stopped hosts.
    Transfer,
    /// Retry the host at this position now.
    Retry(i32),
    /// Ask the scanner to check remote directories now.
    ForceRemoteDirCheck,
    /// Requeue pool batches no queue entry refers to.
    CheckFileDir,
    /// Messages are waiting on `msg.fifo`.
    DataReady,
}

const QUEUE: u8 = 1;
const TRANSFER: u8 = 2;
const RETRY: u8 = 3;
const FORCE_REMOTE_DIR_CHECK: u8 = 4;
const CHECK_FILE_DIR: u8 = 5;
const DATA_READY: u8 = 6;

impl FdCommand {
    /// Wire bytes.
    #[must_use]
    pub fn encode(self) -> Vec<u8> {
        match self {
            Self::Queue => vec![QUEUE],
            Self::Transfer => vec![TRANSFER],
            Self::Retry(position) => {
                let mut bytes = vec![RETRY];
                bytes.extend_from_slice(&position.to_le_bytes());
                bytes
            }
            Self::ForceRemoteDirCheck => vec![FORCE_REMOTE_DIR_CHECK],
            Self::CheckFileDir => vec![CHECK_FILE_DIR],
            Self::DataReady => vec![DATA_READY],
        }
    }
}

/// Reassembles [`FdCommand`]s from fifo reads.
#[derive(Debug, Default)]
pub struct CommandReader {
    pending: Vec<u8>,
}

impl CommandReader {
    /// Empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every complete command. Unknown bytes
    /// are logged and skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<FdCommand> {
        self.pending.extend_from_slice(chunk);
        let mut commands = Vec::new();
        let mut at = 0;
        while at < self.pending.len() {
            let code = self.pending[at];
            let command = match code {
                QUEUE => FdCommand::Queue,
                TRANSFER => FdCommand::Transfer,
                RETRY => {
                    let Some(raw) = self.pending.get(at + 1..at + 5) else {
                        break;
                    };
                    at += 4;
                    FdCommand::Retry(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
                }
                FORCE_REMOTE_DIR_CHECK => FdCommand::ForceRemoteDirCheck,
                CHECK_FILE_DIR => FdCommand::CheckFileDir,
                DATA_READY => FdCommand::DataReady,
                other => {
                    logging::system_log!(warn, "unknown FD command byte {other}");
                    at += 1;
                    continue;
                }
            };
            at += 1;
            commands.push(command);
        }
        self.pending.drain(..at);
        commands
    }
}

/// A request on `fd_delete.fifo`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeleteCommand {
    /// Every queued message for the host.
    AllJobsFromHost(String),
    /// One queued message.
    Message(MessageName),
    /// One file of a queued message.
    SingleFile(MessageName, String),
    /// One queued message fetched from a retrieve directory.
    Retrieve(MessageName),
    /// Every queued message fetched from this retrieve directory.
    RetrievesFromDir(String),
}

const DELETE_ALL_JOBS_FROM_HOST: u8 = 1;
const DELETE_MESSAGE: u8 = 2;
const DELETE_SINGLE_FILE: u8 = 3;
const DELETE_RETRIEVE: u8 = 4;
const DELETE_RETRIEVES_FROM_DIR: u8 = 5;

impl DeleteCommand {
    /// Wire bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let (code, fields): (u8, Vec<String>) = match self {
            Self::AllJobsFromHost(alias) => (DELETE_ALL_JOBS_FROM_HOST, vec![alias.clone()]),
            Self::Message(name) => (DELETE_MESSAGE, vec![name.to_string()]),
            Self::SingleFile(name, file) => (DELETE_SINGLE_FILE, vec![name.to_string(), file.clone()]),
            Self::Retrieve(name) => (DELETE_RETRIEVE, vec![name.to_string()]),
            Self::RetrievesFromDir(alias) => (DELETE_RETRIEVES_FROM_DIR, vec![alias.clone()]),
        };
        let mut bytes = vec![code];
        for field in fields {
            bytes.extend_from_slice(field.as_bytes());
            bytes.push(0);
        }
        bytes
    }

    const fn field_count(code: u8) -> Option<usize> {
        match code {
            DELETE_ALL_JOBS_FROM_HOST | DELETE_MESSAGE | DELETE_RETRIEVE | DELETE_RETRIEVES_FROM_DIR => {
                Some(1)
            }
            DELETE_SINGLE_FILE => Some(2),
            _ => None,
        }
    }

    fn from_fields(code: u8, fields: Vec<String>) -> Option<Self> {
        let message = |text: &str| match text.parse::<MessageName>() {
            Ok(name) => Some(name),
            Err(error) => {
                logging::system_log!(warn, "delete request ignored: {error}");
                None
            }
        };
        let mut fields = fields.into_iter();
        let first = fields.next()?;
        match code {
            DELETE_ALL_JOBS_FROM_HOST => Some(Self::AllJobsFromHost(first)),
            DELETE_MESSAGE => message(&first).map(Self::Message),
            DELETE_SINGLE_FILE => {
                let file = fields.next()?;
                message(&first).map(|name| Self::SingleFile(name, file))
            }
            DELETE_RETRIEVE => message(&first).map(Self::Retrieve),
            DELETE_RETRIEVES_FROM_DIR => Some(Self::RetrievesFromDir(first)),
            _ => None,
        }
    }
}

/// Reassembles [`DeleteCommand`]s from fifo reads.
#[derive(Debug, Default)]
pub struct DeleteReader {
    pending: Vec<u8>,
}

impl DeleteReader {
    /// Empty reader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every complete request.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DeleteCommand> {
        self.pending.extend_from_slice(chunk);
        let mut commands = Vec::new();
        let mut at = 0;
        while at < self.pending.len() {
            let code = self.pending[at];
            let Some(count) = DeleteCommand::field_count(code) else {
                logging::system_log!(warn, "unknown delete command byte {code}");
                at += 1;
                continue;
            };
            let mut cursor = at + 1;
            let mut fields = Vec::with_capacity(count);
            while fields.len() < count {
                let Some(end) = self.pending[cursor..].iter().position(|&byte| byte == 0) else {
                    break;
                };
                fields.push(String::from_utf8_lossy(&self.pending[cursor..cursor + end]).into_owned());
                cursor += end + 1;
            }
            if fields.len() < count {
                break;
            }
            at = cursor;
            if let Some(command) = DeleteCommand::from_fields(code, fields) {
                commands.push(command);
            }
        }
        self.pending.drain(..at);
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name() -> MessageName {
        MessageName {
            job_id: 0x1f,
            counter: 0,
            creation_time: 0x6500_0000,
            unique_number: 3,
            split_job_counter: 1,
        }
    }

    #[test]
    fn retry_position_may_arrive_split() {
        let mut reader = CommandReader::new();
        let bytes = FdCommand::Retry(7).encode();
        assert!(reader.push(&bytes[..2]).is_empty());
        let mut rest = bytes[2..].to_vec();
        rest.extend(FdCommand::DataReady.encode());
        assert_eq!(reader.push(&rest), vec![FdCommand::Retry(7), FdCommand::DataReady]);
    }

    #[test]
    fn unknown_command_bytes_are_skipped() {
        let mut reader = CommandReader::new();
        assert_eq!(reader.push(&[99, QUEUE, TRANSFER]), vec![FdCommand::Queue, FdCommand::Transfer]);
    }

    #[test]
    fn delete_requests_survive_fifo_chunking() {
        let mut stream = DeleteCommand::SingleFile(name(), "x.dat".into()).encode();
        stream.extend(DeleteCommand::AllJobsFromHost("h1".into()).encode());
        let mut reader = DeleteReader::new();
        let mut decoded = Vec::new();
        for chunk in stream.chunks(5) {
            decoded.extend(reader.push(chunk));
        }
        assert_eq!(
            decoded,
            vec![
                DeleteCommand::SingleFile(name(), "x.dat".into()),
                DeleteCommand::AllJobsFromHost("h1".into()),
            ]
        );
    }

    #[test]
    fn malformed_message_names_are_dropped() {
        let mut reader = DeleteReader::new();
        let mut stream = vec![DELETE_MESSAGE];
        stream.extend_from_slice(b"not-a-name\0");
        stream.extend(DeleteCommand::RetrievesFromDir("in".into()).encode());
        assert_eq!(reader.push(&stream), vec![DeleteCommand::RetrievesFromDir("in".into())]);
    }
}
