//! `AFD_CONFIG`: global `KEY value` settings.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Diagnostics};

/// Global engine settings.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AfdConfig {
    /// Upper bound on concurrent transfers over all hosts.
    pub max_connections: u32,
    /// Default `max copied files` for directories.
    pub max_copied_files: u32,
    /// Default `max copied file size`, in bytes.
    pub max_copied_file_size: i64,
    /// Age limit applied to jobs without their own, in seconds. 0 is none.
    pub default_age_limit: u32,
    /// FD queue soft limit; reaching it pauses distribution.
    pub max_queue_length: usize,
    /// Default interval between checks of remote directories, in seconds.
    pub remote_file_check_interval: u32,
    /// Upper bound on one directory scan, in seconds. 0 is none.
    pub full_scan_timeout: u64,
    /// Seconds spent copying one directory before yielding to the next.
    pub one_dir_copy_timeout: u64,
    /// Seconds workers get to finish before they are abandoned.
    pub max_shutdown_time: u64,
    /// Create missing target directories for every job.
    pub create_target_dir: bool,
    /// Default archive unit, in seconds.
    pub archive_unit: i64,
    /// Extra DIR_CONFIG files besides `etc/DIR_CONFIG`.
    pub dir_configs: Vec<PathBuf>,
    /// Priority of jobs without a `priority` option.
    pub default_priority: u8,
    /// Mode of archive directories created on demand.
    pub archive_dir_mode: u32,
    /// Source directories live in a filesystem shared with other nodes.
    pub in_global_filesystem: bool,
    /// Host the engine must run on, if pinned.
    pub hostname: Option<String>,
}

impl Default for AfdConfig {
    fn default() -> Self {
        Self {
            max_connections: 50,
            max_copied_files: 100,
            max_copied_file_size: 102_400 * 1024,
            default_age_limit: 0,
            max_queue_length: 10_000,
            remote_file_check_interval: 60,
            full_scan_timeout: 0,
            one_dir_copy_timeout: 10,
            max_shutdown_time: 30,
            create_target_dir: false,
            archive_unit: 86_400,
            dir_configs: Vec::new(),
            default_priority: b'9',
            archive_dir_mode: 0o755,
            in_global_filesystem: false,
            hostname: None,
        }
    }
}

impl AfdConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path, diagnostics: &mut Diagnostics) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text, path, diagnostics)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(ConfigError::io("read", path, error)),
        }
    }

    /// Parses `AFD_CONFIG` text.
    #[must_use]
    pub fn parse(input: &str, path: &Path, diagnostics: &mut Diagnostics) -> Self {
        let mut config = Self::default();
        for (index, raw) in input.lines().enumerate() {
            let line_number = index + 1;
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((key, value)) => (key, value.trim()),
                None => (line, ""),
            };
            let mut bad_value = |expected: &str| {
                diagnostics.warn(
                    path,
                    line_number,
                    format!("{key}: expected {expected}, got '{value}'; keeping default"),
                );
            };
            match key {
                "MAX_CONNECTIONS" => set_number(&mut config.max_connections, value, &mut bad_value),
                "MAX_COPIED_FILES" => {
                    set_number(&mut config.max_copied_files, value, &mut bad_value);
                }
                "MAX_COPIED_FILE_SIZE" => {
                    let mut kib = config.max_copied_file_size / 1024;
                    set_number(&mut kib, value, &mut bad_value);
                    config.max_copied_file_size = kib.saturating_mul(1024);
                }
                "DEFAULT_AGE_LIMIT" => {
                    set_number(&mut config.default_age_limit, value, &mut bad_value);
                }
                "MAX_QUEUE_LENGTH" => {
                    set_number(&mut config.max_queue_length, value, &mut bad_value);
                }
                "REMOTE_FILE_CHECK_INTERVAL" => {
                    set_number(&mut config.remote_file_check_interval, value, &mut bad_value);
                }
                "FULL_SCAN_TIMEOUT" => {
                    set_number(&mut config.full_scan_timeout, value, &mut bad_value);
                }
                "ONE_DIR_COPY_TIMEOUT" => {
                    set_number(&mut config.one_dir_copy_timeout, value, &mut bad_value);
                }
                "MAX_SHUTDOWN_TIME" => {
                    set_number(&mut config.max_shutdown_time, value, &mut bad_value);
                }
                "ARCHIVE_UNIT" => set_number(&mut config.archive_unit, value, &mut bad_value),
                "CREATE_TARGET_DIR" => match parse_bool(value) {
                    Some(flag) => config.create_target_dir = flag,
                    None => bad_value("yes or no"),
                },
                "IN_GLOBAL_FILESYSTEM" => match parse_bool(value) {
                    Some(flag) => config.in_global_filesystem = flag,
                    None => bad_value("yes or no"),
                },
                "DEFAULT_PRIORITY" => match value.as_bytes() {
                    [digit @ b'0'..=b'9'] => config.default_priority = *digit,
                    _ => bad_value("a digit 0-9"),
                },
                "DEFAULT_ARCHIVE_DIR_MODE" => match u32::from_str_radix(value, 8) {
                    Ok(mode) if mode <= 0o7777 => config.archive_dir_mode = mode,
                    _ => bad_value("an octal mode"),
                },
                "DIR_CONFIG" if !value.is_empty() => config.dir_configs.push(PathBuf::from(value)),
                "HOSTNAME" if !value.is_empty() => config.hostname = Some(value.to_string()),
                "AFD_TCP_PORT" => {}
                _ => diagnostics.warn(path, line_number, format!("unknown AFD_CONFIG entry '{key}'")),
            }
        }
        config
    }
}

fn set_number<T: std::str::FromStr>(slot: &mut T, value: &str, bad_value: &mut impl FnMut(&str)) {
    match value.parse() {
        Ok(number) => *slot = number,
        Err(_) => bad_value("a number"),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "yes" | "on" | "true" | "1" => Some(true),
        "no" | "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> (AfdConfig, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let config = AfdConfig::parse(text, Path::new("AFD_CONFIG"), &mut diagnostics);
        (config, diagnostics)
    }

    #[test]
    fn empty_file_gives_defaults() {
        let (config, diagnostics) = parse("# nothing here\n\n");
        assert_eq!(config, AfdConfig::default());
        assert_eq!(diagnostics.warnings(), 0);
    }

    #[test]
    fn recognised_keys_override_defaults() {
        let (config, diagnostics) = parse(
            "MAX_CONNECTIONS 8\n\
             MAX_COPIED_FILE_SIZE 10   # KiB\n\
             MAX_QUEUE_LENGTH 50\n\
             CREATE_TARGET_DIR yes\n\
             DEFAULT_PRIORITY 3\n\
             DEFAULT_ARCHIVE_DIR_MODE 750\n\
             DIR_CONFIG /etc/afd/extra\n\
             AFD_TCP_PORT 4444\n\
             HOSTNAME node1\n",
        );
        assert_eq!(diagnostics.warnings(), 0);
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.max_copied_file_size, 10 * 1024);
        assert_eq!(config.max_queue_length, 50);
        assert!(config.create_target_dir);
        assert_eq!(config.default_priority, b'3');
        assert_eq!(config.archive_dir_mode, 0o750);
        assert_eq!(config.dir_configs, [PathBuf::from("/etc/afd/extra")]);
        assert_eq!(config.hostname.as_deref(), Some("node1"));
    }

    #[test]
    fn unknown_keys_and_bad_values_warn() {
        let (config, diagnostics) = parse("MAX_CONNECTIONS lots\nNO_SUCH_KEY 1\n");
        assert_eq!(config.max_connections, 50);
        assert_eq!(diagnostics.warnings(), 2);
        assert_eq!(diagnostics.entries()[1].line, 2);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let mut diagnostics = Diagnostics::new();
        let config = AfdConfig::load(&temp.path().join("AFD_CONFIG"), &mut diagnostics).unwrap();
        assert_eq!(config, AfdConfig::default());
    }
}
