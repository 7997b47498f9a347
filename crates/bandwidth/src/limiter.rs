use std::num::NonZeroU64;
use std::time::{Duration, Instant};

use crate::{Pacer, ThreadPacer};

const MICROS_PER_SECOND: u128 = 1_000_000;
const MINIMUM_SLEEP_MICROS: u128 = MICROS_PER_SECOND / 10;
const MIN_CHUNK: usize = 512;

/// Splits a host limit in KiB/s across `active_transfers` transfers.
///
/// Returns `None` for an unlimited host (`limit_kib == 0`). Each transfer
/// gets at least one byte per second.
#[must_use]
pub fn per_transfer_limit(limit_kib: u32, active_transfers: u32) -> Option<NonZeroU64> {
    if limit_kib == 0 {
        return None;
    }
    let bytes = u64::from(limit_kib) * 1024 / u64::from(active_transfers.max(1));
    NonZeroU64::new(bytes.max(1))
}

/// How long one [`BandwidthLimiter::register`] call slept.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[must_use]
pub struct LimiterSleep {
    requested: Duration,
    actual: Duration,
}

impl LimiterSleep {
    /// Returns the amount of time the limiter asked to sleep.
    #[must_use]
    pub const fn requested(&self) -> Duration {
        self.requested
    }

    /// Returns the time that actually passed while sleeping.
    #[must_use]
    pub const fn actual(&self) -> Duration {
        self.actual
    }

    /// Returns `true` when the limiter did not sleep.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.requested.is_zero() && self.actual.is_zero()
    }
}

/// Token-bucket limiter for one transfer.
#[derive(Clone, Debug)]
pub struct BandwidthLimiter<P: Pacer = ThreadPacer> {
    limit_bytes: NonZeroU64,
    chunk: usize,
    debt: u128,
    last_instant: Option<Instant>,
    pacer: P,
}

impl BandwidthLimiter<ThreadPacer> {
    /// Limiter for `limit` bytes per second using real time.
    #[must_use]
    pub fn new(limit: NonZeroU64) -> Self {
        Self::with_pacer(limit, ThreadPacer)
    }
}

impl<P: Pacer> BandwidthLimiter<P> {
    /// Limiter driven by `pacer`.
    #[must_use]
    pub fn with_pacer(limit: NonZeroU64, pacer: P) -> Self {
        Self {
            limit_bytes: limit,
            chunk: chunk_for(limit),
            debt: 0,
            last_instant: None,
            pacer,
        }
    }

    /// Applies a new rate, e.g. after another transfer to the host started.
    pub fn update_limit(&mut self, limit: NonZeroU64) {
        if limit != self.limit_bytes {
            self.limit_bytes = limit;
            self.chunk = chunk_for(limit);
            self.debt = 0;
            self.last_instant = None;
        }
    }

    /// Configured bytes per second.
    #[must_use]
    pub const fn limit_bytes(&self) -> NonZeroU64 {
        self.limit_bytes
    }

    /// Largest read the copy loop should issue before calling
    /// [`register`](Self::register) again.
    #[must_use]
    pub fn recommended_chunk(&self, buffer_len: usize) -> usize {
        buffer_len.min(self.chunk)
    }

    /// Pacer driving this limiter.
    #[must_use]
    pub const fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Mutable access to the pacer.
    pub fn pacer_mut(&mut self) -> &mut P {
        &mut self.pacer
    }

    /// Accounts for `bytes` written and sleeps off any accumulated debt.
    pub fn register(&mut self, bytes: usize) -> LimiterSleep {
        if bytes == 0 {
            return LimiterSleep::default();
        }
        let rate = u128::from(self.limit_bytes.get());
        let start = self.pacer.now();
        self.debt = self.debt.saturating_add(bytes as u128);

        if let Some(previous) = self.last_instant {
            let elapsed = start.saturating_duration_since(previous).as_micros();
            let allowed = elapsed.saturating_mul(rate) / MICROS_PER_SECOND;
            self.debt = self.debt.saturating_sub(allowed);
        }

        let sleep_us = self.debt.saturating_mul(MICROS_PER_SECOND) / rate;
        if sleep_us < MINIMUM_SLEEP_MICROS {
            self.last_instant = Some(start);
            return LimiterSleep::default();
        }

        let requested = Duration::from_micros(sleep_us.min(u128::from(u64::MAX)) as u64);
        self.pacer.sleep(requested);
        let end = self.pacer.now();
        let actual = end.saturating_duration_since(start);

        let remaining_us = sleep_us.saturating_sub(actual.as_micros());
        self.debt = remaining_us.saturating_mul(rate) / MICROS_PER_SECOND;
        self.last_instant = Some(end);
        LimiterSleep { requested, actual }
    }
}

fn chunk_for(limit: NonZeroU64) -> usize {
    // One eighth of a second worth of data keeps sleeps short and frequent.
    let eighth = (limit.get() / 8).min(usize::MAX as u64) as usize;
    eighth.max(MIN_CHUNK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordingPacer;

    fn nz(value: u64) -> NonZeroU64 {
        NonZeroU64::new(value).expect("non-zero")
    }

    #[test]
    fn unlimited_host_has_no_limit() {
        assert_eq!(per_transfer_limit(0, 3), None);
    }

    #[test]
    fn host_limit_is_shared_between_transfers() {
        assert_eq!(per_transfer_limit(10, 0), Some(nz(10 * 1024)));
        assert_eq!(per_transfer_limit(10, 4), Some(nz(2560)));
        assert_eq!(per_transfer_limit(1, 5000), Some(nz(1)));
    }

    #[test]
    fn small_debt_does_not_sleep() {
        let mut limiter = BandwidthLimiter::with_pacer(nz(1000), RecordingPacer::new());
        assert!(limiter.register(50).is_noop());
        assert!(limiter.pacer().sleeps().is_empty());
    }

    #[test]
    fn debt_is_slept_off() {
        let mut limiter = BandwidthLimiter::with_pacer(nz(1000), RecordingPacer::new());
        let sleep = limiter.register(1000);
        assert_eq!(sleep.requested(), Duration::from_secs(1));
        assert_eq!(sleep.actual(), Duration::from_secs(1));
        let sleep = limiter.register(200);
        assert_eq!(sleep.requested(), Duration::from_millis(200));
    }

    #[test]
    fn chunk_never_below_minimum() {
        let limiter = BandwidthLimiter::new(nz(10));
        assert_eq!(limiter.recommended_chunk(1 << 20), MIN_CHUNK);
        assert_eq!(limiter.recommended_chunk(10), 10);
    }

    #[test]
    fn update_limit_clears_debt() {
        let mut limiter = BandwidthLimiter::with_pacer(nz(1000), RecordingPacer::new());
        let _ = limiter.register(90);
        limiter.update_limit(nz(100));
        assert_eq!(limiter.limit_bytes(), nz(100));
        assert_eq!(limiter.register(5).requested(), Duration::ZERO);
    }
}
