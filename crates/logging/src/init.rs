use std::io;
use std::path::Path;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::StreamLayer;

/// Environment variable holding the `tracing` filter directive.
pub const FILTER_ENV: &str = "AFD_LOG";

/// Keeps the process-wide subscriber configuration alive.
///
/// Dropping the guard does not uninstall the subscriber; it only marks the
/// scope in which logging was set up by the caller.
#[derive(Debug)]
#[must_use = "hold the guard for the lifetime of the process"]
pub struct LoggingGuard {
    streams: bool,
}

impl LoggingGuard {
    /// Whether stream files were attached.
    #[must_use]
    pub const fn has_streams(&self) -> bool {
        self.streams
    }
}

/// Installs the global subscriber.
///
/// Diagnostics go to stderr filtered by `AFD_LOG` (default `info`). When
/// `log_dir` is given, the operator stream files are opened there as well.
/// Calling this twice is harmless; the second subscriber is discarded.
pub fn init(log_dir: Option<&Path>) -> io::Result<LoggingGuard> {
    let filter = EnvFilter::try_from_env(FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let streams = match log_dir {
        Some(dir) => StreamLayer::open(dir)?,
        None => StreamLayer::empty(),
    };
    let fmt = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(true);
    let _ = tracing_subscriber::registry()
        .with(streams)
        .with(filter)
        .with(fmt)
        .try_init();
    Ok(LoggingGuard {
        streams: log_dir.is_some(),
    })
}
