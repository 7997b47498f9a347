use std::fmt::{self, Write as _};
use std::fs::{self, File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::{LogStream, Sign, format_line};

type StreamWriter = Mutex<Box<dyn Write + Send>>;

/// `tracing` layer that appends events to the operator stream files.
///
/// Events whose target does not belong to a [`LogStream`] are ignored; they
/// still reach any other layer installed next to this one.
pub struct StreamLayer {
    writers: [Option<StreamWriter>; 4],
}

impl StreamLayer {
    /// Opens (appending) the four stream files inside `log_dir`.
    pub fn open(log_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let open = |stream: LogStream| -> io::Result<StreamWriter> {
            let file: File = OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_dir.join(stream.file_name()))?;
            Ok(Mutex::new(Box::new(LineWriter::new(file))))
        };
        Ok(Self {
            writers: [
                Some(open(LogStream::System)?),
                Some(open(LogStream::Receive)?),
                Some(open(LogStream::Transfer)?),
                Some(open(LogStream::TransferDebug)?),
            ],
        })
    }

    /// Creates a layer with no outputs attached.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            writers: [None, None, None, None],
        }
    }

    /// Routes `stream` into `writer`, replacing any previous output.
    #[must_use]
    pub fn with_writer(mut self, stream: LogStream, writer: impl Write + Send + 'static) -> Self {
        self.writers[stream.index()] = Some(Mutex::new(Box::new(writer)));
        self
    }

    fn write_line(&self, stream: LogStream, line: &str) {
        if let Some(writer) = &self.writers[stream.index()] {
            let mut guard = writer.lock().unwrap_or_else(PoisonError::into_inner);
            // Log write failures never propagate into the caller.
            let _ = writeln!(guard, "{line}");
        }
    }
}

impl<S: Subscriber> Layer<S> for StreamLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let Some(stream) = LogStream::from_target(metadata.target()) else {
            return;
        };

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let sign = visitor
            .sign
            .unwrap_or_else(|| Sign::from_level(*metadata.level()));

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs() as i64);
        self.write_line(stream, &format_line(now, sign, &visitor.text()));
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
    sign: Option<Sign>,
}

impl LineVisitor {
    fn text(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message.push_str(value),
            "sign" => self.sign = value.chars().next().and_then(Sign::from_char),
            name => {
                let _ = write!(self.fields, " {name}={value}");
            }
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => {
                let _ = write!(self.message, "{value:?}");
            }
            "sign" => {
                let rendered = format!("{value:?}");
                self.sign = rendered
                    .trim_matches('"')
                    .chars()
                    .next()
                    .and_then(Sign::from_char);
            }
            name => {
                let _ = write!(self.fields, " {name}={value:?}");
            }
        }
    }
}

/// Cloneable in-memory writer, handy for capturing stream output.
#[derive(Clone, Debug, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything written so far as text.
    #[must_use]
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn capture(f: impl FnOnce()) -> (String, String) {
        let system = SharedBuffer::new();
        let transfer = SharedBuffer::new();
        let layer = StreamLayer::empty()
            .with_writer(LogStream::System, system.clone())
            .with_writer(LogStream::Transfer, transfer.clone());
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, f);
        (system.contents(), transfer.contents())
    }

    #[test]
    fn events_land_in_their_stream_with_level_sign() {
        let (system, transfer) = capture(|| {
            crate::system_log!(warn, "disk {} almost full", "/var");
            crate::transfer_log!(info, "h1[0]: delivered 2 files");
        });
        assert!(system.contains("<W> disk /var almost full"), "{system}");
        assert!(transfer.contains("<I> h1[0]: delivered 2 files"), "{transfer}");
        assert!(!system.contains("delivered"));
    }

    #[test]
    fn explicit_sign_overrides_level() {
        let (system, _) = capture(|| {
            crate::system_log!(config, "unknown option `foo`");
            crate::system_log!(offline, "host h2 is offline");
        });
        assert!(system.contains("<C> unknown option `foo`"), "{system}");
        assert!(system.contains("<O> host h2 is offline"), "{system}");
    }

    #[test]
    fn foreign_targets_are_ignored() {
        let (system, transfer) = capture(|| {
            tracing::error!(target: "other::crate", "not ours");
        });
        assert!(system.is_empty());
        assert!(transfer.is_empty());
    }
}
