//! Commands read from `amg_cmd.fifo`, one byte each.

/// An AMG command.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum AmgCommand {
    /// Finish the running scans and exit.
    Stop,
    /// DIR_CONFIG changed; the supervisor reloads and installs it.
    RereadDirConfig,
    /// HOST_CONFIG changed; the host array is about to be rebuilt.
    RereadHostConfig,
    /// Toggle debug output of the scanner.
    Debug,
    /// The host array will be rebuilt; reattach afterwards.
    FsaAboutToChange,
    /// Scan every remote directory now.
    ForceRemoteDirCheck,
}

impl AmgCommand {
    /// Every command, in code order.
    pub const ALL: [Self; 6] = [
        Self::Stop,
        Self::RereadDirConfig,
        Self::RereadHostConfig,
        Self::Debug,
        Self::FsaAboutToChange,
        Self::ForceRemoteDirCheck,
    ];

    /// Wire byte.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Stop => 1,
            Self::RereadDirConfig => 2,
            Self::RereadHostConfig => 3,
            Self::Debug => 4,
            Self::FsaAboutToChange => 5,
            Self::ForceRemoteDirCheck => 6,
        }
    }

    /// Command for a wire byte.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Stop),
            2 => Some(Self::RereadDirConfig),
            3 => Some(Self::RereadHostConfig),
            4 => Some(Self::Debug),
            5 => Some(Self::FsaAboutToChange),
            6 => Some(Self::ForceRemoteDirCheck),
            _ => None,
        }
    }

    /// Decodes a chunk read from the fifo, logging and skipping unknown bytes.
    #[must_use]
    pub fn decode_all(bytes: &[u8]) -> Vec<Self> {
        bytes
            .iter()
            .filter_map(|&byte| {
                let command = Self::from_code(byte);
                if command.is_none() {
                    logging::system_log!(warn, "unknown AMG command byte {byte}");
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
    fn codes_are_distinct_and_invertible() {
        for command in AmgCommand::ALL {
            assert_eq!(AmgCommand::from_code(command.code()), Some(command));
        }
        assert_eq!(AmgCommand::from_code(0), None);
    }

    #[test]
    fn unknown_bytes_are_skipped() {
        assert_eq!(
            AmgCommand::decode_all(&[1, 99, 6]),
            vec![AmgCommand::Stop, AmgCommand::ForceRemoteDirCheck]
        );
    }
}
