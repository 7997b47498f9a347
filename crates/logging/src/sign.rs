use std::fmt;

use tracing::Level;

/// One-character level indicator written in a fixed column of every stream line.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Sign {
    /// Informational (`I`).
    Info,
    /// Configuration problem (`C`).
    Config,
    /// Warning (`W`).
    Warn,
    /// Error (`E`).
    Error,
    /// Fatal error, the component terminates (`F`).
    Fatal,
    /// Debug output (`D`).
    Debug,
    /// Trace output (`T`).
    Trace,
    /// Host or directory went offline (`O`).
    Offline,
}

impl Sign {
    /// Returns the indicator character.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Info => 'I',
            Self::Config => 'C',
            Self::Warn => 'W',
            Self::Error => 'E',
            Self::Fatal => 'F',
            Self::Debug => 'D',
            Self::Trace => 'T',
            Self::Offline => 'O',
        }
    }

    /// Parses an indicator character.
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'I' => Some(Self::Info),
            'C' => Some(Self::Config),
            'W' => Some(Self::Warn),
            'E' => Some(Self::Error),
            'F' => Some(Self::Fatal),
            'D' => Some(Self::Debug),
            'T' => Some(Self::Trace),
            'O' => Some(Self::Offline),
            _ => None,
        }
    }

    /// Sign used when an event carries no explicit `sign` field.
    #[must_use]
    pub fn from_level(level: Level) -> Self {
        match level {
            Level::ERROR => Self::Error,
            Level::WARN => Self::Warn,
            Level::INFO => Self::Info,
            Level::DEBUG => Self::Debug,
            Level::TRACE => Self::Trace,
        }
    }
}

impl fmt::Display for Sign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.as_char())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_sign_round_trips_through_its_character() {
        for c in ['I', 'C', 'W', 'E', 'F', 'D', 'T', 'O'] {
            let sign = Sign::from_char(c).expect("known sign");
            assert_eq!(sign.as_char(), c);
        }
        assert_eq!(Sign::from_char('x'), None);
    }

    #[test]
    fn levels_map_to_signs() {
        assert_eq!(Sign::from_level(Level::ERROR), Sign::Error);
        assert_eq!(Sign::from_level(Level::TRACE), Sign::Trace);
        assert_eq!(Sign::Warn.to_string(), "<W>");
    }
}
