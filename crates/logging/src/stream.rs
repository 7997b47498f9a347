/// The four free-text operator log streams.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LogStream {
    /// Component lifecycle, configuration and fatal conditions.
    System,
    /// Directory scanning and retrieval.
    Receive,
    /// Deliveries to remote hosts.
    Transfer,
    /// Protocol-level detail for deliveries.
    TransferDebug,
}

impl LogStream {
    /// All streams in a fixed order.
    pub const ALL: [Self; 4] = [
        Self::System,
        Self::Receive,
        Self::Transfer,
        Self::TransferDebug,
    ];

    /// `tracing` target routed into this stream.
    #[must_use]
    pub const fn target(self) -> &'static str {
        match self {
            Self::System => "afd::system",
            Self::Receive => "afd::receive",
            Self::Transfer => "afd::transfer",
            Self::TransferDebug => "afd::transfer_debug",
        }
    }

    /// Name of the active log file under the log directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::System => "SYSTEM_LOG.0",
            Self::Receive => "RECEIVE_LOG.0",
            Self::Transfer => "TRANSFER_LOG.0",
            Self::TransferDebug => "TRANSFER_DEBUG_LOG.0",
        }
    }

    /// Position in [`Self::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::System => 0,
            Self::Receive => 1,
            Self::Transfer => 2,
            Self::TransferDebug => 3,
        }
    }

    /// Resolves the stream for a `tracing` target.
    ///
    /// `afd::transfer_debug` must not be swallowed by the shorter
    /// `afd::transfer` prefix, so the match is on whole path segments.
    #[must_use]
    pub fn from_target(target: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stream| {
            let prefix = stream.target();
            target == prefix
                || target
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with("::"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_resolve_to_their_stream() {
        assert_eq!(LogStream::from_target("afd::system"), Some(LogStream::System));
        assert_eq!(
            LogStream::from_target("afd::transfer_debug"),
            Some(LogStream::TransferDebug)
        );
        assert_eq!(
            LogStream::from_target("afd::transfer::burst"),
            Some(LogStream::Transfer)
        );
        assert_eq!(LogStream::from_target("afd::systemd"), None);
        assert_eq!(LogStream::from_target("hyper"), None);
    }
}
