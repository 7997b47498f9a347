//! Recipient URLs.
//!
//! Shape:
//! `scheme://[user[;SMTP_AUTH=..][;fingerprint=..][:password]@]host[:port][/path][;name=value]...`
//!
//! The host part is the host *alias*; the real host name comes from the
//! host's HOST_CONFIG entry. A backslash escapes the next character inside
//! the user and password, which is how `@`, `:` and `/` get into them.
//! Problems are reported as [`UrlErrors`] bits so that every problem with a
//! recipient is listed at once.

use std::fmt;
use std::str::FromStr;

use protocol::{Scheme, Target};
use status::{MAX_HOSTNAME_LENGTH, MAX_RECIPIENT_LENGTH};

/// Longest accepted user name.
pub const MAX_USER_NAME_LENGTH: usize = 80;
/// Longest accepted password.
pub const MAX_PASSWORD_LENGTH: usize = 80;
/// Alias local recipients use when the URL names no host.
pub const LOCAL_HOST_ALIAS: &str = "localhost";

/// Error bits reported for a recipient URL.
pub mod url_error {
    /// No `://` separator.
    pub const NOT_A_URL: u32 = 1 << 0;
    /// Scheme is not one of the recognised names.
    pub const UNKNOWN_SCHEME: u32 = 1 << 1;
    /// User name longer than `MAX_USER_NAME_LENGTH`.
    pub const USER_NAME_TO_LONG: u32 = 1 << 2;
    /// Password longer than `MAX_PASSWORD_LENGTH`.
    pub const PASSWORD_TO_LONG: u32 = 1 << 3;
    /// Host alias longer than the HSA alias field.
    pub const HOSTNAME_TO_LONG: u32 = 1 << 4;
    /// A remote scheme without a host.
    pub const NO_HOSTNAME: u32 = 1 << 5;
    /// Port has more than five digits or exceeds 65535.
    pub const PORT_TO_LONG: u32 = 1 << 6;
    /// Port is not numeric.
    pub const NOT_A_NUMBER_IN_PORT: u32 = 1 << 7;
    /// Whole recipient longer than the registry field.
    pub const RECIPIENT_TO_LONG: u32 = 1 << 8;
    /// `SMTP_AUTH` value not understood.
    pub const UNKNOWN_SMTP_AUTH: u32 = 1 << 9;
    /// A `;name=value` parameter without `=`.
    pub const PARAMETER_MISSING: u32 = 1 << 10;
    /// A mail recipient without a mailbox name.
    pub const NO_USER: u32 = 1 << 11;
    /// `exec` without a command.
    pub const NO_COMMAND: u32 = 1 << 12;
    /// URL ends inside an escape sequence.
    pub const DANGLING_ESCAPE: u32 = 1 << 13;

    pub(super) const DESCRIPTIONS: [(u32, &str); 14] = [
        (NOT_A_URL, "not a URL"),
        (UNKNOWN_SCHEME, "unknown scheme"),
        (USER_NAME_TO_LONG, "user name too long"),
        (PASSWORD_TO_LONG, "password too long"),
        (HOSTNAME_TO_LONG, "host alias too long"),
        (NO_HOSTNAME, "no host name"),
        (PORT_TO_LONG, "port too long"),
        (NOT_A_NUMBER_IN_PORT, "port is not a number"),
        (RECIPIENT_TO_LONG, "recipient too long"),
        (UNKNOWN_SMTP_AUTH, "unknown SMTP_AUTH method"),
        (PARAMETER_MISSING, "parameter without value"),
        (NO_USER, "no user name"),
        (NO_COMMAND, "no command"),
        (DANGLING_ESCAPE, "dangling escape character"),
    ];
}

/// Set of [`url_error`] bits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct UrlErrors(pub u32);

impl UrlErrors {
    /// Whether `bit` is set.
    #[must_use]
    pub const fn contains(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    /// Whether no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Text for every set bit.
    pub fn descriptions(self) -> impl Iterator<Item = &'static str> {
        url_error::DESCRIPTIONS
            .iter()
            .filter(move |(bit, _)| self.contains(*bit))
            .map(|(_, text)| *text)
    }
}

impl fmt::Display for UrlErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for text in self.descriptions() {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(text)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for UrlErrors {}

/// SMTP authentication methods.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SmtpAuth {
    /// `AUTH LOGIN`.
    Login,
    /// `AUTH PLAIN`.
    Plain,
}

/// A parsed recipient URL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Recipient {
    /// Transport.
    pub scheme: Scheme,
    /// Login or mailbox name.
    pub user: String,
    /// Password.
    pub password: Option<String>,
    /// SMTP authentication method.
    pub smtp_auth: Option<SmtpAuth>,
    /// Expected host key fingerprint.
    pub fingerprint: Option<String>,
    /// Host alias.
    pub host_alias: String,
    /// Explicit port.
    pub port: Option<u16>,
    /// Target directory, or the command for `exec`. Keeps its leading `/`.
    pub path: String,
    /// Trailing `;name=value` parameters, in order.
    pub params: Vec<(String, String)>,
}

impl Recipient {
    /// Parses `text`, reporting every problem found.
    pub fn parse(text: &str) -> Result<Self, UrlErrors> {
        let mut errors = 0;
        if text.len() >= MAX_RECIPIENT_LENGTH {
            errors |= url_error::RECIPIENT_TO_LONG;
        }
        let Some((scheme_text, rest)) = text.split_once("://") else {
            return Err(UrlErrors(errors | url_error::NOT_A_URL));
        };
        let scheme = Scheme::from_str(scheme_text).ok();
        if scheme.is_none() {
            errors |= url_error::UNKNOWN_SCHEME;
        }

        let (userinfo, rest) = split_userinfo(rest);
        let mut user = String::new();
        let mut password = None;
        let mut smtp_auth = None;
        let mut fingerprint = None;
        if let Some(userinfo) = userinfo {
            let (user_part, password_part) = split_unescaped(userinfo, b':');
            let mut items = split_all_unescaped(user_part, b';').into_iter();
            user = unescape(items.next().unwrap_or_default(), &mut errors);
            for item in items {
                match item.split_once('=') {
                    Some((key, value)) if key.eq_ignore_ascii_case("SMTP_AUTH") => {
                        smtp_auth = match value.to_ascii_lowercase().as_str() {
                            "login" => Some(SmtpAuth::Login),
                            "plain" => Some(SmtpAuth::Plain),
                            _ => {
                                errors |= url_error::UNKNOWN_SMTP_AUTH;
                                None
                            }
                        };
                    }
                    Some((key, value)) if key.eq_ignore_ascii_case("fingerprint") => {
                        fingerprint = Some(value.to_string());
                    }
                    _ => errors |= url_error::PARAMETER_MISSING,
                }
            }
            if let Some(password_part) = password_part {
                let text = unescape(password_part, &mut errors);
                if text.len() > MAX_PASSWORD_LENGTH {
                    errors |= url_error::PASSWORD_TO_LONG;
                }
                password = Some(text);
            }
            if user.len() > MAX_USER_NAME_LENGTH {
                errors |= url_error::USER_NAME_TO_LONG;
            }
        }

        let authority_end = rest.find(['/', ';']).unwrap_or(rest.len());
        let (authority, rest) = rest.split_at(authority_end);
        let (host, port_text) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        };
        let port = port_text.and_then(|digits| parse_port(digits, &mut errors));

        let (path, params_text) = match rest.find(';') {
            Some(index) => (&rest[..index], Some(&rest[index + 1..])),
            None => (rest, None),
        };
        let mut params = Vec::new();
        for item in params_text.into_iter().flat_map(|text| text.split(';')) {
            match item.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    params.push((key.to_string(), value.to_string()));
                }
                _ => errors |= url_error::PARAMETER_MISSING,
            }
        }

        let scheme = scheme.unwrap_or(Scheme::File);
        let host_alias = if host.is_empty() && !scheme.is_remote() {
            LOCAL_HOST_ALIAS.to_string()
        } else {
            host.to_string()
        };
        if host_alias.is_empty() {
            errors |= url_error::NO_HOSTNAME;
        } else if host_alias.len() >= MAX_HOSTNAME_LENGTH {
            errors |= url_error::HOSTNAME_TO_LONG;
        }
        if matches!(scheme, Scheme::Mailto | Scheme::Mailtos) && user.is_empty() {
            errors |= url_error::NO_USER;
        }
        if scheme == Scheme::Exec && path.trim_start_matches('/').trim().is_empty() {
            errors |= url_error::NO_COMMAND;
        }

        if errors != 0 {
            return Err(UrlErrors(errors));
        }
        Ok(Self {
            scheme,
            user,
            password,
            smtp_auth,
            fingerprint,
            host_alias,
            port,
            path: path.to_string(),
            params,
        })
    }

    /// Canonical text hashed into the job id.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.render(true)
    }

    /// Text for logs, with the password masked.
    #[must_use]
    pub fn redacted(&self) -> String {
        self.render(false)
    }

    fn render(&self, with_password: bool) -> String {
        let mut text = format!("{}://", self.scheme);
        if !self.user.is_empty() || self.password.is_some() {
            text.push_str(&escape(&self.user));
            match self.smtp_auth {
                Some(SmtpAuth::Login) => text.push_str(";SMTP_AUTH=login"),
                Some(SmtpAuth::Plain) => text.push_str(";SMTP_AUTH=plain"),
                None => {}
            }
            if let Some(fingerprint) = &self.fingerprint {
                text.push_str(";fingerprint=");
                text.push_str(fingerprint);
            }
            if let Some(password) = &self.password {
                text.push(':');
                if with_password {
                    text.push_str(&escape(password));
                } else {
                    text.push_str("XXXX");
                }
            }
            text.push('@');
        }
        text.push_str(&self.host_alias);
        if let Some(port) = self.port {
            text.push(':');
            text.push_str(&port.to_string());
        }
        text.push_str(&self.path);
        for (key, value) in &self.params {
            text.push(';');
            text.push_str(key);
            text.push('=');
            text.push_str(value);
        }
        text
    }

    /// Resolved delivery target using `real_hostname` for the connection.
    #[must_use]
    pub fn to_target(&self, real_hostname: &str) -> Target {
        Target {
            scheme: self.scheme,
            user: self.user.clone(),
            password: self.password.clone(),
            host: real_hostname.to_string(),
            port: self.port,
            path: if self.scheme == Scheme::Exec {
                self.path.trim_start_matches('/').to_string()
            } else {
                self.path.clone()
            },
            params: self.params.clone(),
        }
    }
}

impl FromStr for Recipient {
    type Err = UrlErrors;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_userinfo(rest: &str) -> (Option<&str>, &str) {
    let bytes = rest.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'\\' => index += 2,
            b'@' => return (Some(&rest[..index]), &rest[index + 1..]),
            b'/' => return (None, rest),
            _ => index += 1,
        }
    }
    (None, rest)
}

fn split_unescaped(text: &str, separator: u8) -> (&str, Option<&str>) {
    let bytes = text.as_bytes();
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'\\' {
            index += 2;
        } else if bytes[index] == separator {
            return (&text[..index], Some(&text[index + 1..]));
        } else {
            index += 1;
        }
    }
    (text, None)
}

fn split_all_unescaped(text: &str, separator: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    loop {
        let (head, tail) = split_unescaped(rest, separator);
        parts.push(head);
        match tail {
            Some(tail) => rest = tail,
            None => return parts,
        }
    }
}

fn unescape(text: &str, errors: &mut u32) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(escaped) => out.push(escaped),
                None => *errors |= url_error::DANGLING_ESCAPE,
            }
        } else {
            out.push(ch);
        }
    }
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '@' | ':' | ';' | '/' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn parse_port(digits: &str, errors: &mut u32) -> Option<u16> {
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        *errors |= url_error::NOT_A_NUMBER_IN_PORT;
        return None;
    }
    if digits.len() > 5 {
        *errors |= url_error::PORT_TO_LONG;
        return None;
    }
    match digits.parse::<u16>() {
        Ok(port) => Some(port),
        Err(_) => {
            *errors |= url_error::PORT_TO_LONG;
            None
        }
    }
}
