use std::time::{Duration, Instant};

/// Source of time and sleeping for a [`crate::BandwidthLimiter`].
pub trait Pacer {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Blocks for `duration`.
    fn sleep(&mut self, duration: Duration);
}

/// Uses the monotonic clock and [`std::thread::sleep`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock that records sleeps instead of blocking.
///
/// Sleeping advances the virtual clock by exactly the requested amount.
#[cfg(any(test, feature = "test-support"))]
#[derive(Clone, Debug)]
pub struct RecordingPacer {
    now: Instant,
    sleeps: Vec<Duration>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingPacer {
    /// Starts the virtual clock at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Instant::now(),
            sleeps: Vec::new(),
        }
    }

    /// Moves the virtual clock forward without recording a sleep.
    pub fn advance(&mut self, duration: Duration) {
        self.now += duration;
    }

    /// Sleeps requested so far.
    #[must_use]
    pub fn sleeps(&self) -> &[Duration] {
        &self.sleeps
    }

    /// Sum of all recorded sleeps.
    #[must_use]
    pub fn total_slept(&self) -> Duration {
        self.sleeps.iter().sum()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Default for RecordingPacer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Pacer for RecordingPacer {
    fn now(&self) -> Instant {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
        self.now += duration;
    }
}
