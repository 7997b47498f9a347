//! Rename rules referenced by the `rename` and `trans_rename` options.
//!
//! ```text
//! [to-upper-dat]
//! *.dat   \1.DAT
//! ?x*     y\1\2
//! ```
//!
//! Within a rule the first matching filter wins.

use std::fs;
use std::io;
use std::path::Path;

use filters::CapturePattern;
use rustc_hash::FxHashMap;

use crate::error::{ConfigError, Diagnostics};

#[derive(Clone, Debug)]
struct RenamePair {
    filter: CapturePattern,
    replacement: String,
}

/// All rules from the rename rule file.
#[derive(Clone, Debug, Default)]
pub struct RenameRules {
    rules: FxHashMap<String, Vec<RenamePair>>,
}

impl RenameRules {
    /// Reads `path`; a missing file yields no rules.
    pub fn load(path: &Path, diagnostics: &mut Diagnostics) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text, path, diagnostics)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(ConfigError::io("read", path, error)),
        }
    }

    /// Parses rule file text.
    #[must_use]
    pub fn parse(input: &str, path: &Path, diagnostics: &mut Diagnostics) -> Self {
        let mut rules: FxHashMap<String, Vec<RenamePair>> = FxHashMap::default();
        let mut current: Option<String> = None;
        for (index, raw) in input.lines().enumerate() {
            let line_number = index + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
                let name = name.trim().to_string();
                if rules.contains_key(&name) {
                    diagnostics.warn(
                        path,
                        line_number,
                        format!("rule [{name}] defined twice, appending"),
                    );
                }
                rules.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            let Some(rule) = current.as_ref() else {
                diagnostics.warn(path, line_number, "rename pair outside a rule ignored");
                continue;
            };
            let mut words = line.split_whitespace();
            let (Some(filter), Some(replacement)) = (words.next(), words.next()) else {
                diagnostics.warn(path, line_number, "rename pair without replacement ignored");
                continue;
            };
            if let Some(pairs) = rules.get_mut(rule) {
                pairs.push(RenamePair {
                    filter: CapturePattern::new(filter),
                    replacement: replacement.to_string(),
                });
            }
        }
        Self { rules }
    }

    /// Whether `rule` exists.
    #[must_use]
    pub fn contains(&self, rule: &str) -> bool {
        self.rules.contains_key(rule)
    }

    /// New name for `name` under `rule`, `None` when no filter matches.
    #[must_use]
    pub fn apply(&self, rule: &str, name: &str) -> Option<String> {
        self.rules.get(rule)?.iter().find_map(|pair| {
            pair.filter
                .captures(name)
                .map(|captures| CapturePattern::substitute(&pair.replacement, &captures))
        })
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = "\
# comment
[dat]
*.dat   \\1.DAT
*       \\1.bin

[swap]
?x*     \\2x\\1
";

    fn rules() -> RenameRules {
        let mut diagnostics = Diagnostics::new();
        let rules = RenameRules::parse(RULES, Path::new("rename.rule"), &mut diagnostics);
        assert_eq!(diagnostics.warnings(), 0);
        rules
    }

    #[test]
    fn first_matching_filter_wins() {
        let rules = rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.apply("dat", "obs.dat").as_deref(), Some("obs.DAT"));
        assert_eq!(rules.apply("dat", "obs.txt").as_deref(), Some("obs.txt.bin"));
    }

    #[test]
    fn captures_can_be_reordered() {
        assert_eq!(rules().apply("swap", "axyz").as_deref(), Some("yzxa"));
    }

    #[test]
    fn unknown_rule_or_no_match_gives_none() {
        let rules = rules();
        assert_eq!(rules.apply("nope", "a.dat"), None);
        assert_eq!(rules.apply("swap", "abc"), None);
    }

    #[test]
    fn pairs_outside_rules_warn() {
        let mut diagnostics = Diagnostics::new();
        let rules = RenameRules::parse("*.a \\1.b\n[r]\nlonely\n", Path::new("r"), &mut diagnostics);
        assert_eq!(diagnostics.warnings(), 2);
        assert!(rules.contains("r"));
    }
}
