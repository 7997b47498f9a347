//! Process signals folded into flags the supervisor loop polls.
//!
//! `SIGTERM`, `SIGINT` and `SIGQUIT` request shutdown, `SIGHUP` a
//! configuration reload.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};

/// Flags set by the signal handlers.
#[derive(Clone, Debug, Default)]
pub struct Signals {
    stop: Arc<AtomicBool>,
    reload: Arc<AtomicBool>,
}

impl Signals {
    /// Flags nothing writes to; used when the caller drives shutdown.
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Registers the handlers.
    pub fn install() -> io::Result<Self> {
        let signals = Self::default();
        for signal in [SIGTERM, SIGINT, SIGQUIT] {
            signal_hook::flag::register(signal, Arc::clone(&signals.stop))?;
        }
        signal_hook::flag::register(SIGHUP, Arc::clone(&signals.reload))?;
        Ok(signals)
    }

    /// Whether shutdown was requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Requests shutdown from inside the process.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Whether a reload was requested since the last call.
    pub fn take_reload(&self) -> bool {
        self.reload.swap(false, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_is_consumed_once() {
        let signals = Signals::detached();
        signals.reload.store(true, Ordering::Relaxed);
        assert!(signals.take_reload());
        assert!(!signals.take_reload());
        assert!(!signals.stop_requested());
        signals.clone().request_stop();
        assert!(signals.stop_requested());
    }
}
