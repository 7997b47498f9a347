use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};

use crate::FilterError;

/// Outcome of matching one mask against a file name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MaskMatch {
    /// A positive mask matched: the file is selected.
    Matched,
    /// A `!` mask matched: the file is rejected and later masks are skipped.
    Excluded,
    /// The mask does not apply to this name.
    NotMatched,
}

/// One compiled file mask.
///
/// Masks use `*`, `?` and `[...]` classes (`[!...]` negates). A leading `!`
/// turns the mask into an exclusion. Braces are literal characters.
#[derive(Clone, Debug)]
pub struct FileMask {
    text: String,
    negated: bool,
    matcher: GlobMatcher,
}

impl FileMask {
    /// Compiles `text`.
    pub fn new(text: &str) -> Result<Self, FilterError> {
        let (negated, pattern) = match text.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let matcher = GlobBuilder::new(&escape_braces(pattern))
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|source| FilterError::new(text.to_string(), source))?
            .compile_matcher();
        Ok(Self {
            text: text.to_string(),
            negated,
            matcher,
        })
    }

    /// Mask text as configured, including any leading `!`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether this is an exclusion mask.
    #[must_use]
    pub const fn is_negated(&self) -> bool {
        self.negated
    }

    /// Matches `name` against the mask.
    #[must_use]
    pub fn evaluate(&self, name: &str) -> MaskMatch {
        match (self.matcher.is_match(name), self.negated) {
            (true, false) => MaskMatch::Matched,
            (true, true) => MaskMatch::Excluded,
            (false, _) => MaskMatch::NotMatched,
        }
    }
}

fn escape_braces(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for ch in pattern.chars() {
        if matches!(ch, '{' | '}') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Matches a single mask against `name` without keeping the compiled form.
///
/// Invalid masks never match.
#[must_use]
pub fn pmatch(mask: &str, name: &str) -> MaskMatch {
    FileMask::new(mask).map_or(MaskMatch::NotMatched, |mask| mask.evaluate(name))
}

/// Ordered list of masks from one `[files]` block.
///
/// Masks are tried in order. The first [`MaskMatch::Matched`] accepts the
/// file, the first [`MaskMatch::Excluded`] rejects it, and a name that no
/// mask matches is rejected.
///
/// # Examples
///
/// ```
/// use filters::FileMaskSet;
///
/// let masks = FileMaskSet::new(["!*.tmp", "*.dat"]).unwrap();
/// assert!(masks.accepts("x.dat"));
/// assert!(!masks.accepts("x.tmp"));
/// assert!(!masks.accepts("x.txt"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct FileMaskSet {
    masks: Arc<[FileMask]>,
    match_all: bool,
}

impl FileMaskSet {
    /// Compiles every mask in order.
    pub fn new<I, S>(masks: I) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let masks = masks
            .into_iter()
            .map(|mask| FileMask::new(mask.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let match_all = masks.len() == 1 && masks[0].as_str() == "*";
        Ok(Self {
            masks: masks.into(),
            match_all,
        })
    }

    /// Number of masks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    /// Whether the set has no masks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    /// Whether the set is the single mask `*`.
    #[must_use]
    pub const fn matches_everything(&self) -> bool {
        self.match_all
    }

    /// Mask texts in configured order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.masks.iter().map(FileMask::as_str)
    }

    /// Evaluates the masks against `name`.
    #[must_use]
    pub fn evaluate(&self, name: &str) -> MaskMatch {
        if self.match_all {
            return MaskMatch::Matched;
        }
        for mask in self.masks.iter() {
            match mask.evaluate(name) {
                MaskMatch::NotMatched => {}
                decided => return decided,
            }
        }
        MaskMatch::NotMatched
    }

    /// Whether `name` is selected by this set.
    #[must_use]
    pub fn accepts(&self, name: &str) -> bool {
        self.evaluate(name) == MaskMatch::Matched
    }
}
