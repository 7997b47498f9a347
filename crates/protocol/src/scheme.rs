use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Recipient URL scheme.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// `ftp://`
    Ftp,
    /// `ftps://`
    Ftps,
    /// `sftp://`
    Sftp,
    /// `http://`
    Http,
    /// `https://`
    Https,
    /// `mailto://`
    Mailto,
    /// `mailtos://`
    Mailtos,
    /// `file://`
    File,
    /// `exec://`
    Exec,
    /// `scp://`
    Scp,
    /// `wmo://`
    Wmo,
    /// `map://`
    Map,
    /// `dfax://`
    Dfax,
    /// `demail://`
    Demail,
}

impl Scheme {
    /// Every scheme.
    pub const ALL: [Self; 14] = [
        Self::Ftp,
        Self::Ftps,
        Self::Sftp,
        Self::Http,
        Self::Https,
        Self::Mailto,
        Self::Mailtos,
        Self::File,
        Self::Exec,
        Self::Scp,
        Self::Wmo,
        Self::Map,
        Self::Dfax,
        Self::Demail,
    ];

    /// Scheme as written in a URL.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ftp => "ftp",
            Self::Ftps => "ftps",
            Self::Sftp => "sftp",
            Self::Http => "http",
            Self::Https => "https",
            Self::Mailto => "mailto",
            Self::Mailtos => "mailtos",
            Self::File => "file",
            Self::Exec => "exec",
            Self::Scp => "scp",
            Self::Wmo => "wmo",
            Self::Map => "map",
            Self::Dfax => "dfax",
            Self::Demail => "demail",
        }
    }

    /// Bit of this scheme in a host's `protocol` bitmap.
    #[must_use]
    pub const fn protocol_bit(self) -> u32 {
        1 << (self as u32)
    }

    /// Port used when the URL names none.
    #[must_use]
    pub const fn default_port(self) -> Option<u16> {
        match self {
            Self::Ftp => Some(21),
            Self::Ftps => Some(990),
            Self::Sftp | Self::Scp => Some(22),
            Self::Http => Some(80),
            Self::Https => Some(443),
            Self::Mailto => Some(25),
            Self::Mailtos => Some(465),
            Self::Wmo => Some(4160),
            Self::File | Self::Exec | Self::Map | Self::Dfax | Self::Demail => None,
        }
    }

    /// Whether the scheme reaches a network host.
    #[must_use]
    pub const fn is_remote(self) -> bool {
        !matches!(self, Self::File | Self::Exec)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a scheme name is not recognised.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown scheme '{0}'")]
pub struct UnknownScheme(pub String);

impl FromStr for Scheme {
    type Err = UnknownScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scheme| scheme.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownScheme(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_scheme_name() {
        for scheme in Scheme::ALL {
            assert_eq!(scheme.as_str().parse::<Scheme>().unwrap(), scheme);
        }
        assert_eq!("FTP".parse::<Scheme>().unwrap(), Scheme::Ftp);
        assert!("gopher".parse::<Scheme>().is_err());
    }

    #[test]
    fn protocol_bits_are_distinct() {
        let all = Scheme::ALL
            .iter()
            .fold(0_u32, |acc, scheme| {
                assert_eq!(acc & scheme.protocol_bit(), 0);
                acc | scheme.protocol_bit()
            });
        assert_eq!(all.count_ones(), 14);
    }
}
