//! Job option table.
//!
//! Options are split the way the engine consumes them: local options are
//! applied before a file leaves the pool (naming, age limit, archive,
//! dupcheck), send options are handed to the adapter (`lock`, `chmod`,
//! `create target dir`, ...). Unknown options are kept verbatim in the
//! send options so they still distinguish jobs.

use std::path::Path;

use protocol::LockScheme;

use crate::error::Diagnostics;

/// How the name of a delivered file is derived from its pool name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NameOptions {
    /// Rename rule applied first.
    pub rename: Option<String>,
    /// Strip everything from the first `.`.
    pub basename: bool,
    /// Replace the extension.
    pub extension: Option<String>,
    /// Prefix added in front.
    pub prefix_add: Option<String>,
    /// Prefix removed when present.
    pub prefix_del: Option<String>,
    /// Upper-case the name.
    pub toupper: bool,
    /// Lower-case the name.
    pub tolower: bool,
    /// Rename rule applied to the remote name only.
    pub trans_rename: Option<String>,
}

impl NameOptions {
    /// Whether no option changes the name.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

/// Duplicate check settings from a `dupcheck` option.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DupcheckOption {
    /// Seconds a name stays remembered.
    pub timeout: i64,
    /// `status::dupcheck` flags.
    pub flags: u64,
}

impl DupcheckOption {
    /// Default remembered time, one day.
    pub const DEFAULT_TIMEOUT: i64 = 86_400;
}

/// Parsed options of one job.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobOptions {
    /// Base priority `'0'..='9'`.
    pub priority: u8,
    /// Seconds a delivered file stays in the archive. `None` disables.
    pub archive_time: Option<i64>,
    /// Seconds after which an undelivered file is discarded.
    pub age_limit: Option<u32>,
    /// Transit naming on the remote side.
    pub lock: LockScheme,
    /// Create a missing target directory.
    pub create_target_dir: bool,
    /// Discard files instead of sending them.
    pub delete: bool,
    /// Duplicate suppression for this job.
    pub dupcheck: Option<DupcheckOption>,
    /// File mode set after delivery.
    pub chmod: Option<u32>,
    /// Subject line for mail-like adapters.
    pub subject: Option<String>,
    /// Name transformations.
    pub names: NameOptions,
    /// Local option lines in canonical form.
    pub loptions: Vec<String>,
    /// Send option lines in canonical form, unknown ones included.
    pub soptions: Vec<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: b'9',
            archive_time: None,
            age_limit: None,
            lock: LockScheme::default(),
            create_target_dir: false,
            delete: false,
            dupcheck: None,
            chmod: None,
            subject: None,
            names: NameOptions::default(),
            loptions: Vec::new(),
            soptions: Vec::new(),
        }
    }
}

/// Context for resolving defaults while parsing options.
#[derive(Clone, Copy, Debug)]
pub struct OptionDefaults {
    /// Priority when the job sets none.
    pub priority: u8,
    /// Archive unit in seconds for `archive <n>` without a suffix.
    pub archive_unit: i64,
    /// Create target directories unless told otherwise.
    pub create_target_dir: bool,
    /// Age limit when the job sets none. 0 is none.
    pub age_limit: u32,
}

impl Default for OptionDefaults {
    fn default() -> Self {
        Self {
            priority: b'9',
            archive_unit: 86_400,
            create_target_dir: false,
            age_limit: 0,
        }
    }
}

impl JobOptions {
    /// Parses `(line_number, text)` option lines of one destination.
    pub fn parse<'a>(
        lines: impl IntoIterator<Item = (usize, &'a str)>,
        defaults: OptionDefaults,
        path: &Path,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        let mut options = Self {
            priority: defaults.priority,
            create_target_dir: defaults.create_target_dir,
            age_limit: (defaults.age_limit > 0).then_some(defaults.age_limit),
            ..Self::default()
        };
        for (line_number, raw) in lines {
            let canonical = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            if canonical.is_empty() {
                continue;
            }
            let mut warn = |message: String| diagnostics.warn(path, line_number, message);
            match options.apply(&canonical, defaults, &mut warn) {
                Class::Priority => {}
                Class::Local => options.loptions.push(canonical),
                Class::Send => options.soptions.push(canonical),
                Class::Unknown => {
                    warn(format!("unknown option '{canonical}' kept in job"));
                    options.soptions.push(canonical);
                }
            }
        }
        options
    }

    fn apply(&mut self, line: &str, defaults: OptionDefaults, warn: &mut impl FnMut(String)) -> Class {
        let (word, rest) = match line.split_once(' ') {
            Some((word, rest)) => (word, rest),
            None => (line, ""),
        };
        match word {
            "priority" => {
                match rest.as_bytes() {
                    [digit @ b'0'..=b'9'] => self.priority = *digit,
                    _ => warn(format!("invalid priority '{rest}', using {}", char::from(self.priority))),
                }
                Class::Priority
            }
            "archive" => {
                match parse_archive_time(rest, defaults.archive_unit) {
                    Some(seconds) => self.archive_time = Some(seconds),
                    None => warn(format!("invalid archive time '{rest}', archiving disabled")),
                }
                Class::Local
            }
            "age-limit" => {
                match rest.parse::<u32>() {
                    Ok(0) => self.age_limit = None,
                    Ok(seconds) => self.age_limit = Some(seconds),
                    Err(_) => warn(format!("invalid age-limit '{rest}' ignored")),
                }
                Class::Local
            }
            "lock" => {
                match rest.parse::<LockScheme>() {
                    Ok(lock) if !rest.is_empty() => self.lock = lock,
                    _ => warn("lock without scheme, using DOT".to_string()),
                }
                Class::Send
            }
            "trans_rename" => {
                self.names.trans_rename = rule_name(rest, "trans_rename", warn);
                Class::Send
            }
            "rename" => {
                self.names.rename = rule_name(rest, "rename", warn);
                Class::Local
            }
            "create" if rest == "target dir" => {
                self.create_target_dir = true;
                Class::Send
            }
            "dont" if rest == "create target dir" => {
                self.create_target_dir = false;
                Class::Send
            }
            "dupcheck" => {
                self.dupcheck = Some(parse_dupcheck(rest, warn));
                Class::Local
            }
            "delete" if rest.is_empty() => {
                self.delete = true;
                Class::Local
            }
            "basename" if rest.is_empty() => {
                self.names.basename = true;
                Class::Local
            }
            "extension" => {
                if rest.is_empty() {
                    warn("extension without value ignored".to_string());
                } else {
                    self.names.extension = Some(rest.trim_start_matches('.').to_string());
                }
                Class::Local
            }
            "prefix" => {
                match rest.split_once(' ') {
                    Some(("add", prefix)) => self.names.prefix_add = Some(prefix.to_string()),
                    Some(("del", prefix)) => self.names.prefix_del = Some(prefix.to_string()),
                    _ => warn(format!("invalid prefix option '{rest}' ignored")),
                }
                Class::Local
            }
            "toupper" if rest.is_empty() => {
                self.names.toupper = true;
                self.names.tolower = false;
                Class::Local
            }
            "tolower" if rest.is_empty() => {
                self.names.tolower = true;
                self.names.toupper = false;
                Class::Local
            }
            "chmod" => {
                match u32::from_str_radix(rest, 8) {
                    Ok(mode) if mode <= 0o7777 => self.chmod = Some(mode),
                    _ => warn(format!("invalid chmod mode '{rest}' ignored")),
                }
                Class::Send
            }
            "subject" => {
                self.subject = Some(rest.trim_matches('"').to_string());
                Class::Send
            }
            _ => Class::Unknown,
        }
    }

    /// Joined option string hashed into the job id.
    #[must_use]
    pub fn id_string(&self) -> String {
        let mut lines = Vec::with_capacity(self.loptions.len() + self.soptions.len() + 1);
        lines.push(format!("priority {}", char::from(self.priority)));
        lines.extend(self.loptions.iter().cloned());
        lines.extend(self.soptions.iter().cloned());
        lines.join("\n")
    }
}

enum Class {
    Priority,
    Local,
    Send,
    Unknown,
}

fn rule_name(rest: &str, option: &str, warn: &mut impl FnMut(String)) -> Option<String> {
    if rest.is_empty() {
        warn(format!("{option} without rule name ignored"));
        None
    } else {
        Some(rest.split_whitespace().next().unwrap_or(rest).to_string())
    }
}

/// `archive <n>[s|m|h|d]`; a bare number counts in `unit` seconds.
fn parse_archive_time(text: &str, unit: i64) -> Option<i64> {
    let text = text.trim();
    let (digits, multiplier) = match text.as_bytes().last()? {
        b's' => (&text[..text.len() - 1], 1),
        b'm' => (&text[..text.len() - 1], 60),
        b'h' => (&text[..text.len() - 1], 3600),
        b'd' => (&text[..text.len() - 1], 86_400),
        _ => (text, unit),
    };
    let count: i64 = digits.parse().ok()?;
    (count > 0).then(|| count.saturating_mul(multiplier))
}

/// `dupcheck [<timeout> [<flags>]]`.
///
/// Without flags a duplicate name is deleted.
pub(crate) fn parse_dupcheck(text: &str, warn: &mut impl FnMut(String)) -> DupcheckOption {
    use status::dupcheck::{DC_DELETE, DC_FILENAME_ONLY};

    let mut words = text.split_whitespace();
    let timeout = match words.next().map(str::parse::<i64>) {
        Some(Ok(seconds)) => seconds,
        Some(Err(_)) => {
            warn(format!("invalid dupcheck timeout '{text}', using one day"));
            DupcheckOption::DEFAULT_TIMEOUT
        }
        None => DupcheckOption::DEFAULT_TIMEOUT,
    };
    let flags = match words.next().map(str::parse::<u64>) {
        Some(Ok(flags)) => flags,
        Some(Err(_)) => {
            warn(format!("invalid dupcheck flags in '{text}', using name check with delete"));
            DC_FILENAME_ONLY | DC_DELETE
        }
        None => DC_FILENAME_ONLY | DC_DELETE,
    };
    DupcheckOption { timeout, flags }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(lines: &[&str]) -> (JobOptions, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let options = JobOptions::parse(
            lines.iter().enumerate().map(|(index, line)| (index + 1, *line)),
            OptionDefaults::default(),
            Path::new("DIR_CONFIG"),
            &mut diagnostics,
        );
        (options, diagnostics)
    }

    #[test]
    fn options_are_classified_and_canonicalised() {
        let (options, diagnostics) = parse(&[
            "priority   3",
            "age-limit 60",
            "archive 2h",
            "lock  DOT_VMS",
            "create target dir",
            "prefix add  pre_",
            "chmod 644",
        ]);
        assert_eq!(diagnostics.warnings(), 0);
        assert_eq!(options.priority, b'3');
        assert_eq!(options.age_limit, Some(60));
        assert_eq!(options.archive_time, Some(7200));
        assert_eq!(options.lock, LockScheme::DotVms);
        assert!(options.create_target_dir);
        assert_eq!(options.names.prefix_add.as_deref(), Some("pre_"));
        assert_eq!(options.chmod, Some(0o644));
        assert_eq!(options.loptions, ["age-limit 60", "archive 2h", "prefix add pre_"]);
        assert_eq!(options.soptions, ["lock DOT_VMS", "create target dir", "chmod 644"]);
        assert_eq!(
            options.id_string(),
            "priority 3\nage-limit 60\narchive 2h\nprefix add pre_\nlock DOT_VMS\ncreate target dir\nchmod 644"
        );
    }

    #[test]
    fn unknown_option_warns_but_stays_in_the_id() {
        let (options, diagnostics) = parse(&["frobnicate 7"]);
        assert_eq!(diagnostics.warnings(), 1);
        assert_eq!(options.soptions, ["frobnicate 7"]);
        assert!(options.id_string().ends_with("frobnicate 7"));
    }

    #[test]
    fn archive_without_unit_uses_the_configured_unit() {
        assert_eq!(parse_archive_time("3", 86_400), Some(3 * 86_400));
        assert_eq!(parse_archive_time("90s", 86_400), Some(90));
        assert_eq!(parse_archive_time("0", 86_400), None);
        assert_eq!(parse_archive_time("x", 86_400), None);
    }

    #[test]
    fn dupcheck_defaults_to_name_check_with_delete() {
        let mut warnings = Vec::new();
        let option = parse_dupcheck("", &mut |message| warnings.push(message));
        assert_eq!(option.timeout, DupcheckOption::DEFAULT_TIMEOUT);
        assert!(status::dupcheck::deletes(option.flags));
        let option = parse_dupcheck("600 16", &mut |message| warnings.push(message));
        assert_eq!(option, DupcheckOption { timeout: 600, flags: 16 });
        assert!(warnings.is_empty());
    }

    #[test]
    fn case_options_are_exclusive() {
        let (options, _) = parse(&["toupper", "tolower"]);
        assert!(options.names.tolower);
        assert!(!options.names.toupper);
    }
}
