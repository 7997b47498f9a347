//! Integration tests for file-mask evaluation.
//!
//! Masks are matched against bare file names in configured order; the first
//! mask that applies decides.

use filters::{CapturePattern, FileMaskSet, MaskMatch, pmatch};
use proptest::prelude::*;

// ============================================================================
// Wildcards
// ============================================================================

/// Verifies `*` matches any run of characters, including none.
#[test]
fn star_matches_any_run() {
    assert_eq!(pmatch("file*", "file"), MaskMatch::Matched);
    assert_eq!(pmatch("file*", "file.tar.gz"), MaskMatch::Matched);
    assert_eq!(pmatch("*.dat", ".dat"), MaskMatch::Matched);
    assert_eq!(pmatch("*.dat", "x.dat.tmp"), MaskMatch::NotMatched);
}

/// Verifies `?` matches exactly one character.
#[test]
fn question_mark_matches_one_character() {
    assert_eq!(pmatch("T?.grib", "T1.grib"), MaskMatch::Matched);
    assert_eq!(pmatch("T?.grib", "T.grib"), MaskMatch::NotMatched);
    assert_eq!(pmatch("T?.grib", "T12.grib"), MaskMatch::NotMatched);
}

/// Verifies character classes and their negation.
#[test]
fn character_classes() {
    assert_eq!(pmatch("[abc]*", "b.dat"), MaskMatch::Matched);
    assert_eq!(pmatch("[abc]*", "d.dat"), MaskMatch::NotMatched);
    assert_eq!(pmatch("[!abc]*", "d.dat"), MaskMatch::Matched);
    assert_eq!(pmatch("[0-9][0-9].txt", "42.txt"), MaskMatch::Matched);
}

// ============================================================================
// Ordered evaluation
// ============================================================================

/// Verifies an exclusion before a broader mask wins.
#[test]
fn exclusion_first_rejects() {
    let set = FileMaskSet::new(["!*.tmp", "*"]).unwrap();
    assert!(!set.accepts("partial.tmp"));
    assert!(set.accepts("complete.dat"));
}

/// Verifies a positive mask before an exclusion wins.
#[test]
fn positive_first_accepts() {
    let set = FileMaskSet::new(["keep.tmp", "!*.tmp"]).unwrap();
    assert!(set.accepts("keep.tmp"));
    assert!(!set.accepts("other.tmp"));
}

/// Verifies names matching nothing are rejected.
#[test]
fn unmatched_names_are_rejected() {
    let set = FileMaskSet::new(["*.grib"]).unwrap();
    assert_eq!(set.evaluate("x.bufr"), MaskMatch::NotMatched);
    assert!(!set.accepts("x.bufr"));
}

/// Verifies an empty set selects nothing.
#[test]
fn empty_set_selects_nothing() {
    let set = FileMaskSet::new(Vec::<String>::new()).unwrap();
    assert!(set.is_empty());
    assert!(!set.accepts("anything"));
}

// ============================================================================
// Rename captures
// ============================================================================

/// Verifies captures feed the replacement in wildcard order.
#[test]
fn rename_rule_reorders_captures() {
    let filter = CapturePattern::new("SA??_*.txt");
    let captures = filter.captures("SAFR_20230101.txt").unwrap();
    assert_eq!(captures, ["F", "R", "20230101"]);
    assert_eq!(
        CapturePattern::substitute("\\3-\\1\\2.msg", &captures),
        "20230101-FR.msg"
    );
}

proptest! {
    /// A literal mask without wildcards matches exactly itself.
    #[test]
    fn literal_masks_match_only_themselves(
        name in "[a-z0-9_.]{1,16}",
        other in "[a-z0-9_.]{1,16}",
    ) {
        prop_assert_eq!(pmatch(&name, &name), MaskMatch::Matched);
        if name != other {
            prop_assert_eq!(pmatch(&name, &other), MaskMatch::NotMatched);
        }
    }

    /// `*` captures round-trip through `\1`.
    #[test]
    fn single_star_capture_is_whole_name(name in "[a-zA-Z0-9_.]{0,24}") {
        let captures = CapturePattern::new("*").captures(&name).unwrap();
        prop_assert_eq!(CapturePattern::substitute("\\1", &captures), name);
    }
}
