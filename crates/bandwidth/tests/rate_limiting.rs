//! Integration tests for transfer pacing with a virtual clock.

use std::num::NonZeroU64;
use std::time::Duration;

use bandwidth::{BandwidthLimiter, RecordingPacer, per_transfer_limit};
use proptest::prelude::*;

// ============================================================================
// Copy-loop pacing
// ============================================================================

/// Verifies a full copy loop takes as long as the limit demands.
#[test]
fn copy_loop_is_paced_to_limit() {
    let limit = per_transfer_limit(4, 1).unwrap();
    let mut limiter = BandwidthLimiter::with_pacer(limit, RecordingPacer::new());
    let mut remaining = 16 * 1024;
    while remaining > 0 {
        let chunk = limiter.recommended_chunk(remaining);
        let _ = limiter.register(chunk);
        remaining -= chunk;
    }
    let slept = limiter.pacer().total_slept();
    assert!(slept >= Duration::from_millis(3900), "{slept:?}");
    assert!(slept <= Duration::from_secs(4), "{slept:?}");
}

/// Verifies time spent elsewhere pays down the debt.
#[test]
fn idle_time_is_credited() {
    let mut limiter =
        BandwidthLimiter::with_pacer(NonZeroU64::new(1000).unwrap(), RecordingPacer::new());
    assert!(limiter.register(50).is_noop());
    limiter.pacer_mut().advance(Duration::from_secs(5));
    assert!(limiter.register(900).is_noop());
    assert!(limiter.pacer().sleeps().is_empty());
}

proptest! {
    /// Total sleep never exceeds bytes / rate.
    #[test]
    fn sleep_is_bounded_by_volume(
        rate in 100u64..100_000,
        writes in proptest::collection::vec(1usize..10_000, 1..50),
    ) {
        let mut limiter = BandwidthLimiter::with_pacer(
            NonZeroU64::new(rate).unwrap(),
            RecordingPacer::new(),
        );
        let total: usize = writes.iter().sum();
        for bytes in writes {
            let _ = limiter.register(bytes);
        }
        let bound = Duration::from_secs_f64(total as f64 / rate as f64);
        prop_assert!(limiter.pacer().total_slept() <= bound + Duration::from_millis(1));
    }
}
