#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `bandwidth` paces the copy loop of a transfer so a host never exceeds its
//! configured `transfer_rate_limit`. The limit is configured per host in
//! KiB/s and shared evenly between the transfers active for that host.
//!
//! # Design
//!
//! [`BandwidthLimiter`] is a token bucket that accumulates write debt and
//! sleeps once the debt amounts to more than a tenth of a second. Time and
//! sleeping go through the [`Pacer`] trait so tests can drive the limiter
//! with a virtual clock ([`RecordingPacer`], behind `test-support`).
//!
//! # Examples
//!
//! ```
//! use bandwidth::{BandwidthLimiter, per_transfer_limit};
//!
//! let limit = per_transfer_limit(64, 2).unwrap();
//! assert_eq!(limit.get(), 32 * 1024);
//! let limiter = BandwidthLimiter::new(limit);
//! assert_eq!(limiter.recommended_chunk(1 << 20), 4096);
//! ```

mod limiter;
mod pacer;

pub use crate::limiter::{BandwidthLimiter, LimiterSleep, per_transfer_limit};
pub use crate::pacer::{Pacer, ThreadPacer};
#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-support")))]
pub use crate::pacer::RecordingPacer;
