#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` carries the two kinds of operator-visible output the
//! distribution engine produces:
//!
//! - **Stream logs** (System, Receive, Transfer, Transfer-Debug): free-text
//!   lines with a one-character [`Sign`] in a fixed column. They are fed from
//!   [`tracing`] events through [`StreamLayer`], so every crate logs with the
//!   ordinary `tracing` macros (or the [`system_log!`] family of wrappers)
//!   and the layer decides which file a line lands in.
//! - **Record logs** (output, delete, input, distribution, production):
//!   structured [`LogRecord`] values encoded as `'|'`-separated fields with a
//!   `'\0'` terminator, handed to a [`RecordSink`].
//!
//! # Design
//!
//! - [`LogStream`] maps `tracing` targets (`afd::system`, ...) to stream files.
//! - [`StreamLayer`] is a `tracing_subscriber` layer. Events carrying a
//!   `sign` field override the level-derived sign, which is how config (`C`),
//!   fatal (`F`) and offline (`O`) lines are produced.
//! - [`RecordLogs`] bundles one sink per record kind. Sinks are
//!   [`FileSink`], [`FifoSink`] and the test collector [`MemorySink`].
//! - [`init`] installs the process-wide subscriber.
//!
//! # Examples
//!
//! ```
//! use logging::{OutputRecord, OutputType, RecordLogs, LogRecord};
//!
//! let (logs, memory) = RecordLogs::memory();
//! logs.output(OutputRecord {
//!     time: 1_700_000_000,
//!     job_id: 0xabc,
//!     dir_id: 0x1,
//!     input_time: 1_699_999_990,
//!     split_job_counter: 0,
//!     unique_number: 7,
//!     file_size: 1024,
//!     host_name: "h1".into(),
//!     output_type: OutputType::NormalDelivered,
//!     file_name: "x.dat".into(),
//!     archive_dir: None,
//! });
//! assert!(matches!(memory.records()[0], LogRecord::Output(_)));
//! ```

mod init;
mod layer;
mod line;
mod macros;
mod record;
mod sign;
mod sink;
mod stream;

pub use init::{LoggingGuard, init};
pub use layer::{SharedBuffer, StreamLayer};
pub use line::format_line;
pub use record::{
    DeleteReason, DeleteRecord, DistributionRecord, InputRecord, LogRecord, NO_HOST,
    OutputRecord, OutputType, ProductionRecord, RecordError, RecordKind,
};
pub use sign::Sign;
pub use sink::{FifoSink, FileSink, MemorySink, RecordLogs, RecordSink, pump_records};
pub use stream::LogStream;

#[doc(hidden)]
pub use tracing;
