//! Where job messages go.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crossbeam_channel::Sender;

use crate::message::JobMessage;

/// Receiver of the messages produced by a scan.
pub trait MessageSink: Send + Sync {
    /// Hands `message` to the distributor.
    fn send(&self, message: &JobMessage) -> io::Result<()>;
}

/// Writes messages to `msg.fifo`.
///
/// A record is shorter than `PIPE_BUF`, so concurrent scanner threads never
/// interleave partial records.
#[derive(Debug)]
pub struct FifoMessageSink {
    fifo: Mutex<File>,
}

impl FifoMessageSink {
    /// Opens the fifo at `path`.
    ///
    /// The fifo is opened read-write so the open succeeds before the
    /// distributor has opened its end.
    pub fn open(path: &Path) -> io::Result<Self> {
        let fifo = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            fifo: Mutex::new(fifo),
        })
    }
}

impl MessageSink for FifoMessageSink {
    fn send(&self, message: &JobMessage) -> io::Result<()> {
        let mut fifo = self.fifo.lock().unwrap_or_else(PoisonError::into_inner);
        fifo.write_all(&message.encode())
    }
}

/// Delivers messages over an in-process channel.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    sender: Sender<JobMessage>,
}

impl ChannelSink {
    /// Sink feeding `sender`.
    #[must_use]
    pub const fn new(sender: Sender<JobMessage>) -> Self {
        Self { sender }
    }
}

impl MessageSink for ChannelSink {
    fn send(&self, message: &JobMessage) -> io::Result<()> {
        self.sender
            .send(*message)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "distributor is gone"))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::message::{MAX_BIN_MSG_LENGTH, MessageName, MessageReader};

    fn message() -> JobMessage {
        JobMessage {
            name: MessageName {
                job_id: 1,
                counter: 0,
                creation_time: 2,
                unique_number: 3,
                split_job_counter: 0,
            },
            dev: 0,
            dir_id: 4,
            file_size: 5,
            files: 1,
            priority: b'5',
            flag: 0,
        }
    }

    #[test]
    fn channel_sink_fails_once_the_receiver_is_gone() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let sink = ChannelSink::new(sender);
        sink.send(&message()).unwrap();
        assert_eq!(receiver.recv().unwrap(), message());
        drop(receiver);
        assert_eq!(sink.send(&message()).unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn fifo_sink_writes_whole_records() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("msg.fifo");
        status::make_fifo(&path).unwrap();
        let sink = FifoMessageSink::open(&path).unwrap();
        let mut reader_end = OpenOptions::new().read(true).open(&path).unwrap();
        sink.send(&message()).unwrap();

        let mut bytes = [0_u8; MAX_BIN_MSG_LENGTH];
        reader_end.read_exact(&mut bytes).unwrap();
        assert_eq!(MessageReader::new().push(&bytes), vec![message()]);
    }
}
