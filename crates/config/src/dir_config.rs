//! `DIR_CONFIG`: source directories and where their files go.
//!
//! ```text
//! [directory] /data/in/a   in_a
//!    [dir options]
//!    delete unknown files 12
//!    time */5 * * * *
//!
//!    [files]
//!    *.dat
//!    !*.tmp
//!
//!       [destination]
//!          [recipient]
//!          file://H1/out
//!          ftp://user:pw@H2/in
//!
//!          [options]
//!          priority 3
//!          archive 2d
//! ```
//!
//! A block that cannot be used is dropped with an error diagnostic; the
//! rest of the file still loads.

use std::fs;
use std::path::{Path, PathBuf};

use status::{
    DirStatus, MAX_DIR_ALIAS_LENGTH, MAX_FRA_TIME_ENTRIES, StupidMode, TimeEntry, delete_files,
    dir_options, gt_lt_sign,
};

use crate::error::{ConfigError, Diagnostics};
use crate::options::{DupcheckOption, parse_dupcheck};
use crate::recipient::Recipient;
use crate::time_entry::parse_time_entry;

/// A located line of text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Line {
    /// 1-based line number.
    pub number: usize,
    /// Trimmed text.
    pub text: String,
}

/// Recipients sharing one option set.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Destination {
    /// Line of the `[destination]` marker.
    pub line: usize,
    /// Recipient URLs.
    pub recipients: Vec<Line>,
    /// Option lines.
    pub options: Vec<Line>,
}

/// Masks and the destinations of files matching them.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FileGroup {
    /// Line of the `[files]` marker.
    pub line: usize,
    /// Masks in configured order.
    pub masks: Vec<String>,
    /// Destinations.
    pub destinations: Vec<Destination>,
}

/// Settings from `[dir options]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirOptions {
    /// `delete_files` bits.
    pub delete_files_flag: u8,
    /// Seconds before unknown files are deleted.
    pub unknown_file_time: i64,
    /// Seconds before queued files are deleted.
    pub queued_file_time: i64,
    /// Seconds before old locked files are deleted.
    pub locked_file_time: i64,
    /// Seconds before unreadable files are deleted.
    pub unreadable_file_time: i64,
    /// `dir_options` bits.
    pub dir_options: u32,
    /// Retrieve-list policy.
    pub stupid_mode: StupidMode,
    /// Scan schedule; empty means every check interval.
    pub time_entries: Vec<TimeEntry>,
    /// Files per batch.
    pub max_copied_files: u32,
    /// Bytes per batch.
    pub max_copied_file_size: i64,
    /// Size filter, -1 for none.
    pub ignore_size: i64,
    /// Time filter in seconds, 0 for none.
    pub ignore_file_time: u32,
    /// `gt_lt_sign` bits for both filters.
    pub gt_lt_sign: u32,
    /// Required last byte of a file, -1 for none.
    pub end_character: i32,
    /// Seconds without new files before warning.
    pub warn_time: i64,
    /// Seconds without new files before an info line.
    pub info_time: i64,
    /// Files to accumulate before dispatch.
    pub accumulate: u32,
    /// Bytes to accumulate before dispatch.
    pub accumulate_size: i64,
    /// Directory level duplicate check.
    pub dupcheck: Option<DupcheckOption>,
    /// Directory priority.
    pub priority: u8,
    /// Seconds between remote listings.
    pub remote_file_check_interval: u32,
}

/// Values `[dir options]` start from.
#[derive(Clone, Copy, Debug)]
pub struct DirDefaults {
    /// `MAX_COPIED_FILES` from AFD_CONFIG.
    pub max_copied_files: u32,
    /// `MAX_COPIED_FILE_SIZE` from AFD_CONFIG, bytes.
    pub max_copied_file_size: i64,
    /// `REMOTE_FILE_CHECK_INTERVAL` from AFD_CONFIG.
    pub remote_file_check_interval: u32,
}

impl Default for DirDefaults {
    fn default() -> Self {
        Self {
            max_copied_files: 100,
            max_copied_file_size: 100 * 1024 * 1024,
            remote_file_check_interval: 60,
        }
    }
}

const DEFAULT_FILE_TIME: i64 = 24 * 3600;

impl DirOptions {
    /// Options before any `[dir options]` line.
    #[must_use]
    pub fn new(defaults: DirDefaults) -> Self {
        Self {
            delete_files_flag: 0,
            unknown_file_time: DEFAULT_FILE_TIME,
            queued_file_time: DEFAULT_FILE_TIME,
            locked_file_time: DEFAULT_FILE_TIME,
            unreadable_file_time: DEFAULT_FILE_TIME,
            dir_options: 0,
            stupid_mode: StupidMode::No,
            time_entries: Vec::new(),
            max_copied_files: defaults.max_copied_files,
            max_copied_file_size: defaults.max_copied_file_size,
            ignore_size: -1,
            ignore_file_time: 0,
            gt_lt_sign: 0,
            end_character: -1,
            warn_time: 0,
            info_time: 0,
            accumulate: 0,
            accumulate_size: 0,
            dupcheck: None,
            priority: b'9',
            remote_file_check_interval: defaults.remote_file_check_interval,
        }
    }

    /// Copies these settings into `status`, leaving counters alone.
    pub fn apply(&self, status: &mut DirStatus) {
        status.delete_files_flag = self.delete_files_flag;
        status.unknown_file_time = self.unknown_file_time;
        status.queued_file_time = self.queued_file_time;
        status.locked_file_time = self.locked_file_time;
        status.unreadable_file_time = self.unreadable_file_time;
        status.dir_options = self.dir_options | (status.dir_options & dir_options::REMOTE_DIR);
        status.stupid_mode = self.stupid_mode;
        status.max_copied_files = self.max_copied_files;
        status.max_copied_file_size = self.max_copied_file_size;
        status.ignore_size = self.ignore_size;
        status.ignore_file_time = self.ignore_file_time;
        status.gt_lt_sign = self.gt_lt_sign;
        status.end_character = self.end_character;
        status.warn_time = self.warn_time;
        status.info_time = self.info_time;
        status.accumulate = self.accumulate;
        status.accumulate_size = self.accumulate_size;
        match self.dupcheck {
            Some(dupcheck) => {
                status.dup_check_timeout = dupcheck.timeout;
                status.dup_check_flag = dupcheck.flags;
            }
            None => {
                status.dup_check_timeout = 0;
                status.dup_check_flag = 0;
            }
        }
        status.priority = self.priority;
        status.remote_file_check_interval = self.remote_file_check_interval;
        let count = self.time_entries.len().min(MAX_FRA_TIME_ENTRIES);
        status.time_entries = [TimeEntry::default(); MAX_FRA_TIME_ENTRIES];
        status.time_entries[..count].copy_from_slice(&self.time_entries[..count]);
        status.no_of_time_entries = count as u8;
    }

    fn parse_line(&mut self, line: &str, warn: &mut impl FnMut(String)) {
        let hours = |rest: &str, warn: &mut dyn FnMut(String)| -> i64 {
            if rest.is_empty() {
                return DEFAULT_FILE_TIME;
            }
            match rest.parse::<i64>() {
                Ok(hours) if hours >= 0 => hours * 3600,
                _ => {
                    warn(format!("invalid hours '{rest}' in '{line}', using 24"));
                    DEFAULT_FILE_TIME
                }
            }
        };

        if let Some(rest) = strip_keyword(line, "delete unknown files")
            .or_else(|| strip_keyword(line, "unknown file time"))
        {
            self.delete_files_flag |= delete_files::UNKNOWN_FILES;
            self.unknown_file_time = hours(rest, warn);
        } else if let Some(rest) = strip_keyword(line, "delete queued files") {
            self.delete_files_flag |= delete_files::QUEUED_FILES;
            self.queued_file_time = hours(rest, warn);
        } else if let Some(rest) = strip_keyword(line, "delete old locked files") {
            self.delete_files_flag |= delete_files::OLD_LOCKED_FILES;
            self.locked_file_time = hours(rest, warn);
        } else if let Some(rest) = strip_keyword(line, "delete unreadable files") {
            self.delete_files_flag |= delete_files::UNREADABLE_FILES;
            self.unreadable_file_time = hours(rest, warn);
        } else if let Some(rest) = strip_keyword(line, "old file time") {
            let seconds = hours(rest, warn);
            self.unknown_file_time = seconds;
            self.queued_file_time = seconds;
            self.locked_file_time = seconds;
            self.unreadable_file_time = seconds;
        } else if line == "do not remove" {
            self.dir_options |= dir_options::DO_NOT_REMOVE;
        } else if let Some(rest) = strip_keyword(line, "store retrieve list") {
            self.stupid_mode = match rest {
                "" => StupidMode::No,
                "once" => StupidMode::GetOnceOnly,
                "not exact" => StupidMode::NotExact,
                other => {
                    warn(format!("unknown retrieve list mode '{other}', storing the list"));
                    StupidMode::No
                }
            };
        } else if line == "stupid mode" {
            self.stupid_mode = StupidMode::Yes;
        } else if let Some(rest) = strip_keyword(line, "time") {
            if self.time_entries.len() >= MAX_FRA_TIME_ENTRIES {
                warn(format!("more than {MAX_FRA_TIME_ENTRIES} time entries, '{rest}' ignored"));
            } else {
                match parse_time_entry(rest) {
                    Ok(entry) => self.time_entries.push(entry),
                    Err(reason) => warn(format!("time entry '{rest}' ignored: {reason}")),
                }
            }
        } else if let Some(rest) = strip_keyword(line, "max copied file size") {
            match rest.parse::<i64>() {
                Ok(kib) if kib > 0 => self.max_copied_file_size = kib * 1024,
                _ => warn(format!("invalid max copied file size '{rest}' ignored")),
            }
        } else if let Some(rest) = strip_keyword(line, "max copied files") {
            match rest.parse::<u32>() {
                Ok(files) if files > 0 => self.max_copied_files = files,
                _ => warn(format!("invalid max copied files '{rest}' ignored")),
            }
        } else if let Some(rest) = strip_keyword(line, "ignore size") {
            match signed_value(rest) {
                Some((sign, size)) => {
                    self.ignore_size = size;
                    self.gt_lt_sign &= !(gt_lt_sign::ISIZE_EQUAL
                        | gt_lt_sign::ISIZE_LESS_THEN
                        | gt_lt_sign::ISIZE_GREATER_THEN);
                    self.gt_lt_sign |= match sign {
                        Sign::Less => gt_lt_sign::ISIZE_LESS_THEN,
                        Sign::Greater => gt_lt_sign::ISIZE_GREATER_THEN,
                        Sign::Equal => gt_lt_sign::ISIZE_EQUAL,
                    };
                }
                None => warn(format!("invalid ignore size '{rest}' ignored")),
            }
        } else if let Some(rest) = strip_keyword(line, "ignore file time") {
            match signed_value(rest) {
                Some((sign, seconds)) if seconds >= 0 => {
                    self.ignore_file_time = seconds as u32;
                    self.gt_lt_sign &= !(gt_lt_sign::IFTIME_EQUAL
                        | gt_lt_sign::IFTIME_LESS_THEN
                        | gt_lt_sign::IFTIME_GREATER_THEN);
                    self.gt_lt_sign |= match sign {
                        Sign::Less => gt_lt_sign::IFTIME_LESS_THEN,
                        Sign::Greater => gt_lt_sign::IFTIME_GREATER_THEN,
                        Sign::Equal => gt_lt_sign::IFTIME_EQUAL,
                    };
                }
                _ => warn(format!("invalid ignore file time '{rest}' ignored")),
            }
        } else if let Some(rest) = strip_keyword(line, "end character") {
            match rest.parse::<i32>() {
                Ok(byte) if (0..=255).contains(&byte) => self.end_character = byte,
                _ => warn(format!("invalid end character '{rest}' ignored")),
            }
        } else if line == "accept dot files" {
            self.dir_options |= dir_options::ACCEPT_DOT_FILES;
        } else if line == "do not get dir list" {
            self.dir_options |= dir_options::DONT_GET_DIR_LIST;
        } else if line == "one process just scanning" {
            self.dir_options |= dir_options::ONE_PROCESS_JUST_SCANNING;
        } else if line == "url creates file name" {
            self.dir_options |= dir_options::URL_CREATES_FILE_NAME;
        } else if line == "force reread" {
            self.dir_options |= dir_options::FORCE_REREAD;
        } else if let Some(rest) = strip_keyword(line, "warn time") {
            set_seconds(&mut self.warn_time, rest, line, warn);
        } else if let Some(rest) = strip_keyword(line, "info time") {
            set_seconds(&mut self.info_time, rest, line, warn);
        } else if let Some(rest) = strip_keyword(line, "accumulate size") {
            match rest.parse::<i64>() {
                Ok(bytes) if bytes > 0 => self.accumulate_size = bytes,
                _ => warn(format!("invalid accumulate size '{rest}' ignored")),
            }
        } else if let Some(rest) = strip_keyword(line, "accumulate") {
            match rest.parse::<u32>() {
                Ok(files) if files > 0 => self.accumulate = files,
                _ => warn(format!("invalid accumulate '{rest}' ignored")),
            }
        } else if let Some(rest) = strip_keyword(line, "dupcheck") {
            self.dupcheck = Some(parse_dupcheck(rest, warn));
        } else if let Some(rest) = strip_keyword(line, "priority") {
            match rest.as_bytes() {
                [digit @ b'0'..=b'9'] => self.priority = *digit,
                _ => warn(format!("invalid priority '{rest}' ignored")),
            }
        } else if let Some(rest) = strip_keyword(line, "remote file check interval") {
            match rest.parse::<u32>() {
                Ok(seconds) if seconds > 0 => self.remote_file_check_interval = seconds,
                _ => warn(format!("invalid remote file check interval '{rest}' ignored")),
            }
        } else {
            warn(format!("unknown directory option '{line}' ignored"));
        }
    }
}

fn strip_keyword<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    if rest.is_empty() {
        Some(rest)
    } else if rest.starts_with(' ') {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn set_seconds(slot: &mut i64, rest: &str, line: &str, warn: &mut impl FnMut(String)) {
    match rest.parse::<i64>() {
        Ok(seconds) if seconds >= 0 => *slot = seconds,
        _ => warn(format!("invalid seconds in '{line}' ignored")),
    }
}

enum Sign {
    Less,
    Greater,
    Equal,
}

fn signed_value(text: &str) -> Option<(Sign, i64)> {
    let (sign, digits) = match text.as_bytes().first()? {
        b'<' => (Sign::Less, &text[1..]),
        b'>' => (Sign::Greater, &text[1..]),
        b'=' => (Sign::Equal, &text[1..]),
        _ => (Sign::Equal, text),
    };
    digits.trim().parse().ok().map(|value| (sign, value))
}

/// One `[directory]` block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryBlock {
    /// Line of the `[directory]` marker.
    pub line: usize,
    /// Local path or retrieve URL.
    pub location: String,
    /// Alias, unique across all DIR_CONFIG files.
    pub alias: String,
    /// Parsed remote location when `location` is a URL.
    pub remote: Option<Recipient>,
    /// `[dir options]` settings.
    pub options: DirOptions,
    /// `[files]` groups in order.
    pub groups: Vec<FileGroup>,
}

impl DirectoryBlock {
    /// Fresh directory status record for this block.
    #[must_use]
    pub fn to_status(&self) -> DirStatus {
        let mut status = DirStatus::new(&self.alias, &self.location);
        if let Some(remote) = &self.remote {
            status.host_alias.clone_from(&remote.host_alias);
            status.dir_options |= dir_options::REMOTE_DIR;
        }
        self.options.apply(&mut status);
        status
    }
}

/// One parsed DIR_CONFIG file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirConfig {
    /// File the blocks came from.
    pub path: PathBuf,
    /// CRC-32 of `path`.
    pub dir_config_id: u32,
    /// Accepted directory blocks.
    pub directories: Vec<DirectoryBlock>,
    /// Number of `[directory]` markers seen, accepted or not.
    pub blocks_seen: usize,
}

impl DirConfig {
    /// Reads and parses `path`.
    pub fn load(
        path: &Path,
        defaults: DirDefaults,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|error| ConfigError::io("read", path, error))?;
        Ok(Self::parse(&text, path, defaults, diagnostics))
    }

    /// Parses DIR_CONFIG text.
    #[must_use]
    pub fn parse(
        input: &str,
        path: &Path,
        defaults: DirDefaults,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        Parser {
            path,
            defaults,
            diagnostics,
            section: Section::None,
            current: None,
            blocks: Vec::new(),
            blocks_seen: 0,
        }
        .parse(input)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Section {
    None,
    Skipping,
    DirOptions,
    Files,
    Destination,
    Recipient,
    Options,
}

struct Parser<'a> {
    path: &'a Path,
    defaults: DirDefaults,
    diagnostics: &'a mut Diagnostics,
    section: Section,
    current: Option<DirectoryBlock>,
    blocks: Vec<DirectoryBlock>,
    blocks_seen: usize,
}

impl Parser<'_> {
    fn parse(mut self, input: &str) -> DirConfig {
        for (index, raw) in input.lines().enumerate() {
            let line_number = index + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                self.marker(line, line_number);
            } else {
                self.content(line, line_number);
            }
        }
        self.finish_block();
        DirConfig {
            path: self.path.to_path_buf(),
            dir_config_id: checksums::dir_config_id(&self.path.to_string_lossy()),
            directories: self.blocks,
            blocks_seen: self.blocks_seen,
        }
    }

    fn marker(&mut self, line: &str, line_number: usize) {
        let Some(end) = line.find(']') else {
            self.diagnostics
                .error(self.path, line_number, format!("unterminated marker '{line}'"));
            return;
        };
        let marker = line[1..end].trim().to_ascii_lowercase();
        let rest = line[end + 1..].trim();

        if marker == "directory" {
            self.finish_block();
            self.blocks_seen += 1;
            self.start_block(rest, line_number);
            return;
        }
        if self.section == Section::Skipping {
            return;
        }
        let Some(block) = self.current.as_mut() else {
            self.diagnostics.error(
                self.path,
                line_number,
                format!("[{marker}] outside a [directory] block ignored"),
            );
            return;
        };
        match marker.as_str() {
            "dir options" => self.section = Section::DirOptions,
            "files" => {
                block.groups.push(FileGroup {
                    line: line_number,
                    ..FileGroup::default()
                });
                self.section = Section::Files;
            }
            "destination" => match block.groups.last_mut() {
                Some(group) => {
                    group.destinations.push(Destination {
                        line: line_number,
                        ..Destination::default()
                    });
                    self.section = Section::Destination;
                }
                None => {
                    self.diagnostics.error(
                        self.path,
                        line_number,
                        "[destination] before any [files] ignored",
                    );
                    self.section = Section::None;
                }
            },
            "recipient" | "options" => {
                let in_destination = block
                    .groups
                    .last()
                    .is_some_and(|group| !group.destinations.is_empty());
                if in_destination {
                    self.section = if marker == "recipient" {
                        Section::Recipient
                    } else {
                        Section::Options
                    };
                } else {
                    self.diagnostics.error(
                        self.path,
                        line_number,
                        format!("[{marker}] outside a [destination] ignored"),
                    );
                    self.section = Section::None;
                }
            }
            other => {
                self.diagnostics
                    .warn(self.path, line_number, format!("unknown marker [{other}] ignored"));
            }
        }
    }

    fn start_block(&mut self, rest: &str, line_number: usize) {
        let mut words = rest.split_whitespace();
        let Some(location) = words.next() else {
            self.diagnostics
                .error(self.path, line_number, "[directory] without a path, block skipped");
            self.section = Section::Skipping;
            return;
        };
        let remote = if location.contains("://") {
            match Recipient::parse(location) {
                Ok(recipient) => Some(recipient),
                Err(errors) => {
                    self.diagnostics.error(
                        self.path,
                        line_number,
                        format!("directory URL '{location}': {errors}, block skipped"),
                    );
                    self.section = Section::Skipping;
                    return;
                }
            }
        } else {
            if !location.starts_with('/') {
                self.diagnostics.warn(
                    self.path,
                    line_number,
                    format!("directory '{location}' is not an absolute path"),
                );
            }
            None
        };
        let alias = match words.next() {
            Some(alias) => alias.to_string(),
            None => default_alias(location, remote.as_ref()),
        };
        if alias.is_empty() || alias.len() >= MAX_DIR_ALIAS_LENGTH {
            self.diagnostics.error(
                self.path,
                line_number,
                format!(
                    "directory alias '{alias}' must be 1 to {} characters, block skipped",
                    MAX_DIR_ALIAS_LENGTH - 1
                ),
            );
            self.section = Section::Skipping;
            return;
        }
        if self.blocks.iter().any(|block| block.alias == alias) {
            self.diagnostics.error(
                self.path,
                line_number,
                format!("duplicate directory alias '{alias}', block skipped"),
            );
            self.section = Section::Skipping;
            return;
        }
        self.current = Some(DirectoryBlock {
            line: line_number,
            location: location.to_string(),
            alias,
            remote,
            options: DirOptions::new(self.defaults),
            groups: Vec::new(),
        });
        self.section = Section::None;
    }

    fn content(&mut self, line: &str, line_number: usize) {
        if self.section == Section::Skipping {
            return;
        }
        let path = self.path;
        let diagnostics = &mut *self.diagnostics;
        let Some(block) = self.current.as_mut() else {
            diagnostics.error(path, line_number, "text outside a [directory] block ignored");
            return;
        };
        match self.section {
            Section::DirOptions => {
                let mut warn = |message: String| diagnostics.warn(path, line_number, message);
                block.options.parse_line(line, &mut warn);
            }
            Section::Files => {
                if let Some(group) = block.groups.last_mut() {
                    group.masks.extend(line.split_whitespace().map(str::to_string));
                }
            }
            Section::Recipient | Section::Options => {
                let destination = block
                    .groups
                    .last_mut()
                    .and_then(|group| group.destinations.last_mut());
                if let Some(destination) = destination {
                    let entry = Line {
                        number: line_number,
                        text: line.to_string(),
                    };
                    if self.section == Section::Recipient {
                        destination.recipients.push(entry);
                    } else {
                        destination.options.push(entry);
                    }
                }
            }
            Section::None | Section::Destination | Section::Skipping => {
                diagnostics.warn(path, line_number, format!("'{line}' outside a section ignored"));
            }
        }
    }

    fn finish_block(&mut self) {
        if let Some(mut block) = self.current.take() {
            for group in &mut block.groups {
                if group.masks.is_empty() {
                    group.masks.push("*".to_string());
                }
                let before = group.destinations.len();
                group
                    .destinations
                    .retain(|destination| !destination.recipients.is_empty());
                if group.destinations.len() != before {
                    self.diagnostics.warn(
                        self.path,
                        group.line,
                        format!("destination without recipient in '{}' ignored", block.alias),
                    );
                }
            }
            block.groups.retain(|group| !group.destinations.is_empty());
            if block.groups.is_empty() {
                self.diagnostics.warn(
                    self.path,
                    block.line,
                    format!("directory '{}' has no destination", block.alias),
                );
            }
            self.blocks.push(block);
        }
        self.section = Section::None;
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(0) => "",
        // A `#` inside a word (file masks, URLs) is literal.
        Some(index) if line[..index].ends_with(char::is_whitespace) => &line[..index],
        _ => line,
    }
}

fn default_alias(location: &str, remote: Option<&Recipient>) -> String {
    let path = remote.map_or(location, |recipient| recipient.path.as_str());
    match path.trim_end_matches('/').rsplit('/').next() {
        Some(last) if !last.is_empty() => last.to_string(),
        _ => remote.map(|recipient| recipient.host_alias.clone()).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# sample
[directory] /data/in/a   in_a
   [dir options]
   delete unknown files 12
   ignore size >1024
   accumulate 5
   time */5 * * * *

   [files]
   *.dat
   !*.tmp

      [destination]
         [recipient]
         file://H1/out
         ftp://user:pw@H2/in

         [options]
         priority 3

[directory] /data/in/b
   [files]
   [destination]
   [recipient]
   file://H1/b
";

    fn parse(text: &str) -> (DirConfig, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let config = DirConfig::parse(
            text,
            Path::new("/w/etc/DIR_CONFIG"),
            DirDefaults::default(),
            &mut diagnostics,
        );
        (config, diagnostics)
    }

    #[test]
    fn parses_blocks_groups_and_destinations() {
        let (config, diagnostics) = parse(SAMPLE);
        assert_eq!(diagnostics.entries(), []);
        assert_eq!(config.directories.len(), 2);

        let a = &config.directories[0];
        assert_eq!(a.alias, "in_a");
        assert_eq!(a.options.delete_files_flag, delete_files::UNKNOWN_FILES);
        assert_eq!(a.options.unknown_file_time, 12 * 3600);
        assert_eq!(a.options.ignore_size, 1024);
        assert_eq!(a.options.gt_lt_sign, gt_lt_sign::ISIZE_GREATER_THEN);
        assert_eq!(a.options.accumulate, 5);
        assert_eq!(a.options.time_entries.len(), 1);
        assert_eq!(a.groups[0].masks, ["*.dat", "!*.tmp"]);
        let destination = &a.groups[0].destinations[0];
        assert_eq!(destination.recipients.len(), 2);
        assert_eq!(destination.options[0].text, "priority 3");
        assert_eq!(destination.options[0].number, 19);

        let b = &config.directories[1];
        assert_eq!(b.alias, "b");
        assert_eq!(b.groups[0].masks, ["*"]);
    }

    #[test]
    fn duplicate_alias_drops_second_block() {
        let text = "[directory] /x dup\n[files]\n*\n[destination]\n[recipient]\nfile://H/o\n\
                    [directory] /y dup\n[files]\n*\n[destination]\n[recipient]\nfile://H/p\n";
        let (config, diagnostics) = parse(text);
        assert_eq!(config.directories.len(), 1);
        assert_eq!(config.blocks_seen, 2);
        assert_eq!(diagnostics.errors(), 1);
        assert_eq!(config.directories[0].location, "/x");
    }

    #[test]
    fn misplaced_markers_are_errors() {
        let (config, diagnostics) = parse("[files]\n*\n[directory] /x\n[destination]\n");
        assert_eq!(config.directories.len(), 1);
        assert_eq!(diagnostics.errors(), 3);
        assert_eq!(diagnostics.warnings(), 1);
    }

    #[test]
    fn remote_directory_gets_host_and_flag() {
        let text = "[directory] ftp://u:p@H9/pub/data\n[dir options]\nstore retrieve list once\n\
                    [files]\n*\n[destination]\n[recipient]\nfile://H1/x\n";
        let (config, diagnostics) = parse(text);
        assert_eq!(diagnostics.errors(), 0);
        let block = &config.directories[0];
        assert_eq!(block.alias, "data");
        let status = block.to_status();
        assert_eq!(status.host_alias, "H9");
        assert!(status.has_option(dir_options::REMOTE_DIR));
        assert_eq!(status.stupid_mode, StupidMode::GetOnceOnly);
    }

    #[test]
    fn options_apply_to_status() {
        let (config, _) = parse(SAMPLE);
        let status = config.directories[0].to_status();
        assert_eq!(status.accumulate, 5);
        assert_eq!(status.no_of_time_entries, 1);
        assert_eq!(status.schedule()[0].minute & 1, 1);
        assert_eq!(status.dir_id, checksums::dir_id("/data/in/a"));
    }

    #[test]
    fn unknown_dir_option_warns() {
        let mut options = DirOptions::new(DirDefaults::default());
        let mut warnings = Vec::new();
        options.parse_line("make coffee", &mut |message| warnings.push(message));
        options.parse_line("accept dot files", &mut |message| warnings.push(message));
        assert_eq!(warnings.len(), 1);
        assert_eq!(options.dir_options, dir_options::ACCEPT_DOT_FILES);
    }

    #[test]
    fn comments_after_whitespace_are_stripped() {
        assert_eq!(strip_comment("  *.dat  # data files"), "  *.dat  ");
        assert_eq!(strip_comment("file#1"), "file#1");
        assert_eq!(strip_comment("# all"), "");
    }
}
