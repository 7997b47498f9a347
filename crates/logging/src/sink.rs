use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, LineWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use crate::record::{
    DeleteRecord, DistributionRecord, InputRecord, LogRecord, OutputRecord, ProductionRecord,
    RecordKind,
};

/// Destination for encoded record-log entries.
pub trait RecordSink: Send + Sync {
    /// Writes one record.
    fn emit(&self, record: &LogRecord) -> io::Result<()>;
}

/// Appends records as text lines to a log file.
pub struct FileSink {
    writer: Mutex<LineWriter<File>>,
}

impl FileSink {
    /// Opens `path` for appending, creating it when missing.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(LineWriter::new(file)),
        })
    }
}

impl RecordSink for FileSink {
    fn emit(&self, record: &LogRecord) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", record.to_line())
    }
}

/// Writes `'\0'`-terminated records into a fifo read by a logger process.
pub struct FifoSink {
    fifo: Mutex<File>,
}

impl FifoSink {
    /// Opens an existing fifo for writing.
    ///
    /// The fifo is opened read-write so the call does not block while no
    /// logger has it open yet.
    pub fn open(path: &Path) -> io::Result<Self> {
        let fifo = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            fifo: Mutex::new(fifo),
        })
    }
}

impl RecordSink for FifoSink {
    fn emit(&self, record: &LogRecord) -> io::Result<()> {
        let mut fifo = self.fifo.lock().unwrap_or_else(PoisonError::into_inner);
        fifo.write_all(&record.encode())
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    /// Snapshot of everything emitted so far.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: RecordKind) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.kind() == kind)
            .collect()
    }
}

impl RecordSink for MemorySink {
    fn emit(&self, record: &LogRecord) -> io::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

/// One optional sink per record kind.
///
/// Emission failures are reported on the System stream and otherwise
/// ignored: a full disk under the log directory must not stop deliveries.
#[derive(Clone, Default)]
pub struct RecordLogs {
    sinks: [Option<Arc<dyn RecordSink>>; 5],
}

impl RecordLogs {
    /// Logs that drop every record.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Opens one append-mode file per record kind under `log_dir`.
    pub fn files(log_dir: &Path) -> io::Result<Self> {
        let mut logs = Self::default();
        for kind in RecordKind::ALL {
            let sink = FileSink::open(&log_dir.join(kind.file_name()))?;
            logs = logs.with_sink(kind, Arc::new(sink));
        }
        Ok(logs)
    }

    /// Sends every kind into one shared [`MemorySink`].
    #[must_use]
    pub fn memory() -> (Self, Arc<MemorySink>) {
        let memory = Arc::new(MemorySink::default());
        let mut logs = Self::default();
        for kind in RecordKind::ALL {
            logs = logs.with_sink(kind, memory.clone());
        }
        (logs, memory)
    }

    /// Replaces the sink for `kind`.
    #[must_use]
    pub fn with_sink(mut self, kind: RecordKind, sink: Arc<dyn RecordSink>) -> Self {
        self.sinks[slot(kind)] = Some(sink);
        self
    }

    /// Emits `record` to the sink of its kind.
    pub fn emit(&self, record: &LogRecord) {
        let Some(sink) = &self.sinks[slot(record.kind())] else {
            return;
        };
        if let Err(error) = sink.emit(record) {
            crate::system_log!(
                warn,
                "failed to write {} record: {error}",
                record.kind().file_name()
            );
        }
    }

    /// Emits an output record.
    pub fn output(&self, record: OutputRecord) {
        self.emit(&LogRecord::Output(record));
    }

    /// Emits a delete record.
    pub fn delete(&self, record: DeleteRecord) {
        self.emit(&LogRecord::Delete(record));
    }

    /// Emits an input record.
    pub fn input(&self, record: InputRecord) {
        self.emit(&LogRecord::Input(record));
    }

    /// Emits a distribution record.
    pub fn distribution(&self, record: DistributionRecord) {
        self.emit(&LogRecord::Distribution(record));
    }

    /// Emits a production record.
    pub fn production(&self, record: ProductionRecord) {
        self.emit(&LogRecord::Production(record));
    }
}

impl std::fmt::Debug for RecordLogs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let enabled: Vec<_> = RecordKind::ALL
            .into_iter()
            .filter(|kind| self.sinks[slot(*kind)].is_some())
            .collect();
        f.debug_struct("RecordLogs").field("enabled", &enabled).finish()
    }
}

const fn slot(kind: RecordKind) -> usize {
    match kind {
        RecordKind::Output => 0,
        RecordKind::Delete => 1,
        RecordKind::Input => 2,
        RecordKind::Distribution => 3,
        RecordKind::Production => 4,
    }
}

/// Copies `'\0'`-terminated records from a fifo into a log file as lines.
///
/// Returns the number of records copied once `reader` reaches end of file.
/// Malformed records are copied unchanged; the logger does not interpret
/// them.
pub fn pump_records(reader: impl Read, mut writer: impl Write) -> io::Result<u64> {
    let mut reader = BufReader::new(reader);
    let mut record = Vec::new();
    let mut copied = 0;
    loop {
        record.clear();
        if reader.read_until(0, &mut record)? == 0 {
            break;
        }
        if record.last() == Some(&0) {
            record.pop();
        }
        if record.is_empty() {
            continue;
        }
        record.push(b'\n');
        writer.write_all(&record)?;
        copied += 1;
    }
    writer.flush()?;
    Ok(copied)
}
