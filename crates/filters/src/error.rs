use std::fmt;

/// Error produced when a file mask cannot be compiled.
#[derive(Debug)]
pub struct FilterError {
    mask: String,
    source: globset::Error,
}

impl FilterError {
    pub(crate) fn new(mask: String, source: globset::Error) -> Self {
        Self { mask, source }
    }

    /// Returns the offending mask as configured.
    #[must_use]
    pub fn mask(&self) -> &str {
        &self.mask
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid file mask '{}': {}", self.mask, self.source)
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
