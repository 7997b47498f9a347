use std::io;
use std::path::PathBuf;

/// Error raised while opening or updating shared status files.
#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    /// An I/O operation on a status file failed.
    #[error("{action} {path}: {source}")]
    Io {
        /// What was being done.
        action: &'static str,
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The file was written by an incompatible layout version.
    #[error(
        "{path} has version {found}, expected {expected}; run 'afd -i' to reinitialise"
    )]
    VersionMismatch {
        /// File involved.
        path: PathBuf,
        /// Version found in the header.
        found: u8,
        /// Version this build understands.
        expected: u8,
    },
    /// The file is shorter than its header claims.
    #[error("{path} is corrupt: {reason}")]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// What is wrong.
        reason: String,
    },
    /// An update was attempted through a read-only mapping.
    #[error("{path} is mapped read-only")]
    ReadOnly {
        /// File involved.
        path: PathBuf,
    },
    /// No record carries the requested alias.
    #[error("no status record for `{alias}`")]
    UnknownAlias {
        /// Alias looked up.
        alias: String,
    },
    /// A record index is past the end of the array.
    #[error("record {index} out of range (count {count})")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Records present.
        count: usize,
    },
}

impl StatusError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Whether the error means the shared state cannot be trusted.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::VersionMismatch { .. } | Self::Corrupt { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_mismatch_carries_migration_hint() {
        let error = StatusError::VersionMismatch {
            path: PathBuf::from("/w/fifodir/fsa_status"),
            found: 1,
            expected: 2,
        };
        let message = error.to_string();
        assert!(message.contains("run 'afd -i' to reinitialise"), "{message}");
        assert!(error.is_invariant_violation());
    }
}
