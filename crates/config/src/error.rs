use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Error that stops a configuration file from being used at all.
///
/// Problems confined to one line are not errors; they are collected in
/// [`Diagnostics`] and the line falls back to defaults or is skipped.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("failed to {action} '{}': {source}", path.display())]
    Io {
        /// What was being done.
        action: &'static str,
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The file is structurally unusable.
    #[error("{}: line {line}: {message}", path.display())]
    Parse {
        /// File involved.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What is wrong.
        message: String,
    },
    /// The DIR_CONFIG contains no directory block.
    #[error("{} contains no directory definitions", path.display())]
    Empty {
        /// File involved.
        path: PathBuf,
    },
    /// Every directory block was rejected, leaving no job.
    #[error("{} yields no valid job", path.display())]
    NoValidData {
        /// File involved.
        path: PathBuf,
    },
    /// The registry files could not be published.
    #[error("failed to publish job registry: {0}")]
    Publish(#[from] status::StatusError),
}

impl ConfigError {
    pub(crate) fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the error means a required file is missing or unreadable.
    #[must_use]
    pub fn is_access_error(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Severity of a [`Diagnostic`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    /// The line was used with a default substituted.
    Warning,
    /// The line or block was dropped.
    Error,
}

/// One problem found while parsing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    /// Warning or error.
    pub severity: Severity,
    /// File the problem is in.
    pub path: PathBuf,
    /// 1-based line number, 0 when the problem is not tied to a line.
    pub line: usize,
    /// Description.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}: {}", self.path.display(), self.message)
        } else {
            write!(f, "{}: line {}: {}", self.path.display(), self.line, self.message)
        }
    }
}

/// Warnings and errors collected over one load.
///
/// Every entry is also written to the System log as a config line, so the
/// operator sees the same text `udc`/`uhc` report.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning.
    pub fn warn(&mut self, path: &Path, line: usize, message: impl Into<String>) {
        self.push(Severity::Warning, path, line, message.into());
    }

    /// Records an error.
    pub fn error(&mut self, path: &Path, line: usize, message: impl Into<String>) {
        self.push(Severity::Error, path, line, message.into());
    }

    fn push(&mut self, severity: Severity, path: &Path, line: usize, message: String) {
        let entry = Diagnostic {
            severity,
            path: path.to_path_buf(),
            line,
            message,
        };
        match severity {
            Severity::Warning => logging::system_log!(config, "{entry}"),
            Severity::Error => logging::system_log!(error, "{entry}"),
        }
        self.entries.push(entry);
    }

    /// Every entry in the order found.
    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Number of warnings.
    #[must_use]
    pub fn warnings(&self) -> usize {
        self.count(Severity::Warning)
    }

    /// Number of errors.
    #[must_use]
    pub fn errors(&self) -> usize {
        self.count(Severity::Error)
    }

    fn count(&self, severity: Severity) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.severity == severity)
            .count()
    }

    /// Appends the entries of `other`.
    pub fn extend(&mut self, other: Self) {
        self.entries.extend(other.entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_count_by_severity() {
        let mut diagnostics = Diagnostics::new();
        let path = Path::new("/w/etc/HOST_CONFIG");
        diagnostics.warn(path, 3, "bad number");
        diagnostics.warn(path, 4, "bad number");
        diagnostics.error(path, 0, "no hosts");
        assert_eq!(diagnostics.warnings(), 2);
        assert_eq!(diagnostics.errors(), 1);
        assert_eq!(
            diagnostics.entries()[0].to_string(),
            "/w/etc/HOST_CONFIG: line 3: bad number"
        );
        assert_eq!(diagnostics.entries()[2].to_string(), "/w/etc/HOST_CONFIG: no hosts");
    }

    #[test]
    fn parse_error_names_file_and_line() {
        let error = ConfigError::Parse {
            path: PathBuf::from("/w/etc/DIR_CONFIG"),
            line: 7,
            message: "[files] outside a directory".into(),
        };
        assert_eq!(
            error.to_string(),
            "/w/etc/DIR_CONFIG: line 7: [files] outside a directory"
        );
    }
}
