/// Wildcard pattern that records what each `*` and `?` matched.
///
/// Used by rename rules: the filter side is matched against a file name and
/// the replacement side refers to the captures as `\1` to `\9`, numbered in
/// the order the wildcards appear.
///
/// # Examples
///
/// ```
/// use filters::CapturePattern;
///
/// let filter = CapturePattern::new("*.?.dat");
/// let captures = filter.captures("report.a.dat").unwrap();
/// assert_eq!(captures, ["report", "a"]);
/// assert_eq!(
///     CapturePattern::substitute("\\2_\\1.bin", &captures),
///     "a_report.bin"
/// );
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CapturePattern {
    tokens: Vec<Token>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Token {
    Literal(char),
    Any,
    One,
}

impl CapturePattern {
    /// Parses `pattern`. `\` escapes the following character.
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let mut tokens = Vec::new();
        let mut chars = pattern.chars();
        while let Some(ch) = chars.next() {
            let token = match ch {
                '*' => Token::Any,
                '?' => Token::One,
                '\\' => Token::Literal(chars.next().unwrap_or('\\')),
                other => Token::Literal(other),
            };
            // Consecutive stars capture the same text as one.
            if token == Token::Any && tokens.last() == Some(&Token::Any) {
                continue;
            }
            tokens.push(token);
        }
        Self { tokens }
    }

    /// Matches the whole of `name`, returning one capture per wildcard.
    ///
    /// Stars match as little as possible, so `*_*` on `a_b_c` captures `a`
    /// and `b_c`.
    #[must_use]
    pub fn captures(&self, name: &str) -> Option<Vec<String>> {
        let chars: Vec<char> = name.chars().collect();
        let mut spans = Vec::new();
        if self.match_from(0, &chars, 0, &mut spans) {
            Some(
                spans
                    .into_iter()
                    .map(|(start, end)| chars[start..end].iter().collect())
                    .collect(),
            )
        } else {
            None
        }
    }

    /// Whether `name` matches without collecting captures.
    #[must_use]
    pub fn is_match(&self, name: &str) -> bool {
        self.captures(name).is_some()
    }

    fn match_from(
        &self,
        token: usize,
        chars: &[char],
        pos: usize,
        spans: &mut Vec<(usize, usize)>,
    ) -> bool {
        let Some(current) = self.tokens.get(token) else {
            return pos == chars.len();
        };
        match current {
            Token::Literal(expected) => {
                chars.get(pos) == Some(expected) && self.match_from(token + 1, chars, pos + 1, spans)
            }
            Token::One => {
                if pos >= chars.len() {
                    return false;
                }
                spans.push((pos, pos + 1));
                if self.match_from(token + 1, chars, pos + 1, spans) {
                    return true;
                }
                spans.pop();
                false
            }
            Token::Any => {
                for end in pos..=chars.len() {
                    spans.push((pos, end));
                    if self.match_from(token + 1, chars, end, spans) {
                        return true;
                    }
                    spans.pop();
                }
                false
            }
        }
    }

    /// Expands `\1`..`\9` in `replacement` with `captures`.
    ///
    /// References past the last capture expand to nothing; `\\` yields a
    /// single backslash and any other escaped character is kept verbatim.
    #[must_use]
    pub fn substitute(replacement: &str, captures: &[String]) -> String {
        let mut out = String::with_capacity(replacement.len());
        let mut chars = replacement.chars();
        while let Some(ch) = chars.next() {
            if ch != '\\' {
                out.push(ch);
                continue;
            }
            match chars.next() {
                Some(digit @ '1'..='9') => {
                    let index = digit as usize - '1' as usize;
                    if let Some(capture) = captures.get(index) {
                        out.push_str(capture);
                    }
                }
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stars_are_lazy() {
        let pattern = CapturePattern::new("*_*");
        assert_eq!(pattern.captures("a_b_c").unwrap(), ["a", "b_c"]);
    }

    #[test]
    fn literal_mismatch_fails() {
        assert!(CapturePattern::new("*.dat").captures("x.txt").is_none());
        assert!(CapturePattern::new("?").captures("").is_none());
    }

    #[test]
    fn escaped_star_is_literal() {
        let pattern = CapturePattern::new("a\\*");
        assert!(pattern.is_match("a*"));
        assert!(!pattern.is_match("ab"));
    }

    #[test]
    fn missing_references_expand_empty() {
        let captures = vec!["x".to_string()];
        assert_eq!(CapturePattern::substitute("\\1-\\2\\\\", &captures), "x-\\");
    }
}
