//! `afd_cmd.fifo`: one-byte commands to the supervisor. Commands that want
//! an answer get [`ACKN`] on `afd_resp.fifo`.

/// Acknowledgement written to `afd_resp.fifo`.
pub const ACKN: u8 = 1;

/// A command on `afd_cmd.fifo`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AfdCommand {
    /// Stop AMG and FD, then exit.
    Shutdown,
    /// Answer with [`ACKN`] on `afd_resp.fifo`.
    IsAlive,
    /// Re-read DIR_CONFIG and HOST_CONFIG without a reply.
    Reload,
}

impl AfdCommand {
    /// Wire byte.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Shutdown => 1,
            Self::IsAlive => 2,
            Self::Reload => 3,
        }
    }

    /// Command for a wire byte.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Shutdown),
            2 => Some(Self::IsAlive),
            3 => Some(Self::Reload),
            _ => None,
        }
    }

    /// Every complete command in `chunk`; unknown bytes are logged.
    pub fn decode_all(chunk: &[u8]) -> Vec<Self> {
        chunk
            .iter()
            .filter_map(|&code| {
                let command = Self::from_code(code);
                if command.is_none() {
                    logging::system_log!(warn, "unknown AFD command byte {code}");
                }
                command
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_bytes_are_dropped() {
        assert_eq!(
            AfdCommand::decode_all(&[2, 0, 1]),
            vec![AfdCommand::IsAlive, AfdCommand::Shutdown]
        );
    }
}
