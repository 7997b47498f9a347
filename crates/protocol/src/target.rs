use std::num::NonZeroU64;
use std::time::Duration;

use serde::Serialize;

use crate::scheme::Scheme;

/// Where a job delivers to, with the host name already resolved from the
/// host's active `real_hostname`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Target {
    /// Transport.
    pub scheme: Scheme,
    /// Login name, empty when the scheme needs none.
    pub user: String,
    /// Password, if the recipient carries one.
    #[serde(skip)]
    pub password: Option<String>,
    /// Real host name.
    pub host: String,
    /// Explicit port.
    pub port: Option<u16>,
    /// Target directory, or the command line for `exec`.
    pub path: String,
    /// Trailing `;name=value` parameters.
    pub params: Vec<(String, String)>,
}

impl Target {
    /// Local-filesystem target for `dir`.
    #[must_use]
    pub fn local(dir: &str) -> Self {
        Self {
            scheme: Scheme::File,
            user: String::new(),
            password: None,
            host: String::new(),
            port: None,
            path: dir.to_string(),
            params: Vec::new(),
        }
    }

    /// Port after applying the scheme default.
    #[must_use]
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| self.scheme.default_port())
    }

    /// Parameters that decide whether an open session can be reused.
    #[must_use]
    pub fn connection_key(&self) -> ConnectionKey {
        ConnectionKey {
            scheme: self.scheme,
            user: self.user.clone(),
            host: self.host.clone(),
            port: self.effective_port(),
        }
    }

    /// Value of parameter `name`.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Identity of a connection for burst and keep-alive reuse.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct ConnectionKey {
    /// Transport.
    pub scheme: Scheme,
    /// Login name.
    pub user: String,
    /// Real host name.
    pub host: String,
    /// Effective port.
    pub port: Option<u16>,
}

/// Per-host settings an adapter applies to a session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionOptions {
    /// Copy buffer size.
    pub block_size: usize,
    /// Cap on every adapter call; zero disables it.
    pub transfer_timeout: Duration,
    /// Bytes per second available to this transfer.
    pub rate_limit: Option<NonZeroU64>,
    /// Create missing target directories.
    pub create_target_dir: bool,
    /// Carry the source modification time over.
    pub keep_time_stamp: bool,
    /// Write Transfer-Debug lines.
    pub debug: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            block_size: 65536,
            transfer_timeout: Duration::from_secs(120),
            rate_limit: None,
            create_target_dir: false,
            keep_time_stamp: false,
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_key_uses_default_port() {
        let mut target = Target::local("/out");
        target.scheme = Scheme::Sftp;
        target.host = "h".into();
        let mut other = target.clone();
        other.port = Some(22);
        other.path = "/elsewhere".into();
        assert_eq!(target.connection_key(), other.connection_key());
        other.port = Some(2222);
        assert_ne!(target.connection_key(), other.connection_key());
    }
}
