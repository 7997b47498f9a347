#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `filters` decides which files of a scanned directory belong to a
//! `[files]` block and rewrites file names for rename rules. File masks are
//! shell-style wildcards matched against bare file names, never paths.
//!
//! # Design
//!
//! - [`FileMask`] compiles one mask with [`globset`]. A leading `!` makes it
//!   an exclusion mask; braces are literal so configured names such as
//!   `data{1}` keep their meaning.
//! - [`FileMaskSet`] evaluates masks in configured order and is cheap to
//!   clone, so scanner threads share one compiled set per `[files]` block.
//! - [`pmatch`] is the one-shot form used where a mask is checked once.
//! - [`CapturePattern`] is a small backtracking matcher that records what
//!   each `*` and `?` consumed, feeding `\1`..`\9` substitutions.
//!
//! # Invariants
//!
//! - The first mask that matches decides. A positive mask accepts, an
//!   exclusion mask rejects, and a name that no mask matches is rejected.
//! - `*` matches any sequence including a leading dot; hiding dot files is
//!   the scanner's job.
//!
//! # Examples
//!
//! ```
//! use filters::{FileMaskSet, MaskMatch};
//!
//! let masks = FileMaskSet::new(["!core*", "*.grib", "*.bufr"]).unwrap();
//! assert_eq!(masks.evaluate("core.123"), MaskMatch::Excluded);
//! assert_eq!(masks.evaluate("t850.grib"), MaskMatch::Matched);
//! assert_eq!(masks.evaluate("notes.txt"), MaskMatch::NotMatched);
//! ```

mod capture;
mod error;
mod mask;

pub use capture::CapturePattern;
pub use error::FilterError;
pub use mask::{FileMask, FileMaskSet, MaskMatch, pmatch};
