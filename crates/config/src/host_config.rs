//! `HOST_CONFIG`: one colon-separated line per destination host.
//!
//! Field order is fixed and historical; see [`HostEntry`]. Trailing fields
//! may be omitted and take their defaults. Host order in the file is the
//! order of the host status array.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use rustc_hash::FxHashSet;
use status::{HOST_ONE, HostStatus, MAX_HOSTNAME_LENGTH, MAX_REAL_HOSTNAME_LENGTH, host_status};

use crate::error::{ConfigError, Diagnostics};

/// Number of fields in a complete line.
pub const HOST_CONFIG_FIELDS: usize = 24;

const HEADER: &str = "\
# Alias:RealHostname1:RealHostname2:Toggle:Proxy:AllowedTransfers:MaxErrors:\
RetryInterval:BlockSize:SuccessfulRetries:FileSizeOffset:TransferTimeout:\
NoOfNoBursts:HostStatus:ProtocolOptions:TransferRateLimit:TTL:SocketSendBuffer:\
SocketReceiveBuffer:DupcheckTimeout:DupcheckFlag:KeepConnected:WarnTime:\
ProtocolOptions2
";

/// Settings of one host as written in HOST_CONFIG.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostEntry {
    /// 1: alias.
    pub alias: String,
    /// 2, 3: primary and secondary real host names.
    pub real_hostname: [String; 2],
    /// 4: toggle string, `[12]` manual or `{12}` automatic.
    pub toggle_str: String,
    /// 5: proxy name.
    pub proxy: String,
    /// 6.
    pub allowed_transfers: i32,
    /// 7.
    pub max_errors: i32,
    /// 8, seconds.
    pub retry_interval: i32,
    /// 9, bytes.
    pub block_size: i32,
    /// 10: successful transfers before returning to the original host.
    pub successful_retries: i32,
    /// 11: -1 disables append, otherwise the resume offset mode.
    pub file_size_offset: i8,
    /// 12, seconds.
    pub transfer_timeout: i64,
    /// 13.
    pub number_of_no_bursts: u32,
    /// 14: persisted subset of `host_status`.
    pub host_status: u32,
    /// 15.
    pub protocol_options: u32,
    /// 16, KiB/s. 0 is unlimited.
    pub transfer_rate_limit: u32,
    /// 17.
    pub ttl: i32,
    /// 18.
    pub socksnd_bufsize: u32,
    /// 19.
    pub sockrcv_bufsize: u32,
    /// 20, seconds.
    pub dup_check_timeout: i64,
    /// 21.
    pub dup_check_flag: u64,
    /// 22, seconds.
    pub keep_connected: u32,
    /// 23, seconds.
    pub warn_time: i64,
    /// 24.
    pub protocol_options2: u32,
}

impl HostEntry {
    /// Entry with the documented defaults.
    #[must_use]
    pub fn new(alias: &str) -> Self {
        Self {
            alias: alias.to_string(),
            real_hostname: [alias.to_string(), String::new()],
            toggle_str: String::new(),
            proxy: String::new(),
            allowed_transfers: 2,
            max_errors: 10,
            retry_interval: 120,
            block_size: 65536,
            successful_retries: 0,
            file_size_offset: -1,
            transfer_timeout: 120,
            number_of_no_bursts: 0,
            host_status: 0,
            protocol_options: 0,
            transfer_rate_limit: 0,
            ttl: 0,
            socksnd_bufsize: 0,
            sockrcv_bufsize: 0,
            dup_check_timeout: 0,
            dup_check_flag: 0,
            keep_connected: 0,
            warn_time: 0,
            protocol_options2: 0,
        }
    }

    /// Entry describing the settings currently held by `status`.
    #[must_use]
    pub fn from_status(status: &HostStatus) -> Self {
        Self {
            alias: status.host_alias.clone(),
            real_hostname: status.real_hostname.clone(),
            toggle_str: status.toggle_str.clone(),
            proxy: status.proxy_name.clone(),
            allowed_transfers: status.allowed_transfers,
            max_errors: status.max_errors,
            retry_interval: status.retry_interval,
            block_size: status.block_size,
            successful_retries: status.max_successful_retries,
            file_size_offset: status.file_size_offset,
            transfer_timeout: status.transfer_timeout,
            number_of_no_bursts: status.number_of_no_bursts,
            host_status: status.host_status & host_status::PERSISTED,
            protocol_options: status.protocol_options,
            transfer_rate_limit: status.transfer_rate_limit,
            ttl: status.ttl,
            socksnd_bufsize: status.socksnd_bufsize,
            sockrcv_bufsize: status.sockrcv_bufsize,
            dup_check_timeout: status.dup_check_timeout,
            dup_check_flag: status.dup_check_flag,
            keep_connected: status.keep_connected,
            warn_time: status.warn_time,
            protocol_options2: status.protocol_options2,
        }
    }

    /// Whether the toggle string asks for automatic switching.
    #[must_use]
    pub fn auto_toggle(&self) -> bool {
        self.toggle_str.starts_with('{') && !self.real_hostname[1].is_empty()
    }

    /// Same settings, ignoring the status bits operators change at run time.
    #[must_use]
    pub fn same_settings(&self, other: &Self) -> bool {
        let mut left = self.clone();
        left.host_status = other.host_status;
        left == *other
    }

    /// Copies these settings into `status`, leaving its counters alone.
    ///
    /// `host_status` bits are only taken from the file for a fresh record;
    /// a running host keeps the bits operators set through `afdcmd`.
    pub fn apply(&self, status: &mut HostStatus, fresh: bool) {
        if status.real_hostname != self.real_hostname {
            status.host_toggle = HOST_ONE;
            status.original_toggle = HOST_ONE;
        }
        status.real_hostname.clone_from(&self.real_hostname);
        status.toggle_str.clone_from(&self.toggle_str);
        status.auto_toggle = self.auto_toggle();
        status.proxy_name.clone_from(&self.proxy);
        status.allowed_transfers = self.allowed_transfers;
        status.max_errors = self.max_errors;
        status.retry_interval = self.retry_interval;
        status.block_size = self.block_size;
        status.max_successful_retries = self.successful_retries;
        status.file_size_offset = self.file_size_offset;
        status.transfer_timeout = self.transfer_timeout;
        status.number_of_no_bursts = self.number_of_no_bursts;
        status.protocol_options = self.protocol_options;
        status.transfer_rate_limit = self.transfer_rate_limit;
        status.ttl = self.ttl;
        status.socksnd_bufsize = self.socksnd_bufsize;
        status.sockrcv_bufsize = self.sockrcv_bufsize;
        status.dup_check_timeout = self.dup_check_timeout;
        status.dup_check_flag = self.dup_check_flag;
        status.keep_connected = self.keep_connected;
        status.warn_time = self.warn_time;
        status.protocol_options2 = self.protocol_options2;
        if fresh {
            status.host_status = self.host_status & host_status::PERSISTED;
        }
    }

    /// Fresh host status record for this entry.
    #[must_use]
    pub fn to_status(&self) -> HostStatus {
        let mut status = HostStatus::new(&self.alias);
        self.apply(&mut status, true);
        status
    }

    /// The HOST_CONFIG line for this entry.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(128);
        let _ = write!(
            line,
            "{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}:{}",
            self.alias,
            self.real_hostname[0],
            self.real_hostname[1],
            self.toggle_str,
            self.proxy,
            self.allowed_transfers,
            self.max_errors,
            self.retry_interval,
            self.block_size,
            self.successful_retries,
            self.file_size_offset,
            self.transfer_timeout,
            self.number_of_no_bursts,
            self.host_status,
            self.protocol_options,
            self.transfer_rate_limit,
            self.ttl,
            self.socksnd_bufsize,
            self.sockrcv_bufsize,
            self.dup_check_timeout,
            self.dup_check_flag,
            self.keep_connected,
            self.warn_time,
            self.protocol_options2,
        );
        line
    }
}

/// Reads `path`.
pub fn load_host_config(
    path: &Path,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<HostEntry>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|error| ConfigError::io("read", path, error))?;
    Ok(parse_host_config(&text, path, diagnostics))
}

/// Parses HOST_CONFIG text into entries in file order.
#[must_use]
pub fn parse_host_config(input: &str, path: &Path, diagnostics: &mut Diagnostics) -> Vec<HostEntry> {
    let mut entries = Vec::new();
    let mut seen = FxHashSet::default();

    for (index, raw) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(':').map(str::trim).collect();
        let alias = fields[0];
        if alias.is_empty() {
            diagnostics.warn(path, line_number, "host entry without alias ignored");
            continue;
        }
        if alias.len() >= MAX_HOSTNAME_LENGTH {
            diagnostics.warn(
                path,
                line_number,
                format!(
                    "host alias '{alias}' longer than {} characters ignored",
                    MAX_HOSTNAME_LENGTH - 1
                ),
            );
            continue;
        }
        if !seen.insert(alias.to_string()) {
            diagnostics.warn(path, line_number, format!("duplicate host alias '{alias}' ignored"));
            continue;
        }
        if fields.len() > HOST_CONFIG_FIELDS {
            diagnostics.warn(
                path,
                line_number,
                format!("{} fields for host '{alias}', ignoring the extra ones", fields.len()),
            );
        }

        let mut entry = HostEntry::new(alias);
        let mut fields = FieldReader {
            fields: &fields,
            path,
            line_number,
            alias,
            diagnostics,
        };
        if let Some(name) = fields.text(1) {
            entry.real_hostname[0] = name;
        }
        entry.real_hostname[1] = fields.text(2).unwrap_or_default();
        for name in &mut entry.real_hostname {
            if name.len() >= MAX_REAL_HOSTNAME_LENGTH {
                fields.warn(format!("real host name '{name}' truncated"));
                name.truncate(MAX_REAL_HOSTNAME_LENGTH - 1);
            }
        }
        entry.toggle_str = fields.text(3).unwrap_or_default();
        if !entry.toggle_str.is_empty() && !valid_toggle(&entry.toggle_str) {
            fields.warn(format!("toggle string '{}' ignored", entry.toggle_str));
            entry.toggle_str.clear();
        }
        entry.proxy = fields.text(4).unwrap_or_default();
        fields.number(5, &mut entry.allowed_transfers);
        if !(1..=status::MAX_NO_PARALLEL_JOBS as i32).contains(&entry.allowed_transfers) {
            fields.warn(format!(
                "allowed transfers {} out of range, using {}",
                entry.allowed_transfers,
                entry.allowed_transfers.clamp(1, status::MAX_NO_PARALLEL_JOBS as i32)
            ));
            entry.allowed_transfers = entry
                .allowed_transfers
                .clamp(1, status::MAX_NO_PARALLEL_JOBS as i32);
        }
        fields.number(6, &mut entry.max_errors);
        fields.number(7, &mut entry.retry_interval);
        fields.number(8, &mut entry.block_size);
        fields.number(9, &mut entry.successful_retries);
        fields.number(10, &mut entry.file_size_offset);
        fields.number(11, &mut entry.transfer_timeout);
        fields.number(12, &mut entry.number_of_no_bursts);
        fields.number(13, &mut entry.host_status);
        entry.host_status &= host_status::PERSISTED;
        fields.number(14, &mut entry.protocol_options);
        fields.number(15, &mut entry.transfer_rate_limit);
        fields.number(16, &mut entry.ttl);
        fields.number(17, &mut entry.socksnd_bufsize);
        fields.number(18, &mut entry.sockrcv_bufsize);
        fields.number(19, &mut entry.dup_check_timeout);
        fields.number(20, &mut entry.dup_check_flag);
        fields.number(21, &mut entry.keep_connected);
        fields.number(22, &mut entry.warn_time);
        fields.number(23, &mut entry.protocol_options2);
        entries.push(entry);
    }
    entries
}

fn valid_toggle(text: &str) -> bool {
    let bytes = text.as_bytes();
    matches!(
        bytes,
        [b'[', _, _, b']'] | [b'{', _, _, b'}']
    )
}

struct FieldReader<'a, 'd> {
    fields: &'a [&'a str],
    path: &'a Path,
    line_number: usize,
    alias: &'a str,
    diagnostics: &'d mut Diagnostics,
}

impl FieldReader<'_, '_> {
    fn text(&self, index: usize) -> Option<String> {
        self.fields
            .get(index)
            .filter(|field| !field.is_empty())
            .map(|field| (*field).to_string())
    }

    fn number<T: std::str::FromStr>(&mut self, index: usize, slot: &mut T) {
        let Some(field) = self.fields.get(index).filter(|field| !field.is_empty()) else {
            return;
        };
        match field.parse() {
            Ok(value) => *slot = value,
            Err(_) => {
                let message = format!(
                    "field {} of host '{}' is not a number ('{field}'), using default",
                    index + 1,
                    self.alias
                );
                self.warn(message);
            }
        }
    }

    fn warn(&mut self, message: String) {
        self.diagnostics.warn(self.path, self.line_number, message);
    }
}

/// Rewrites `path` with `entries`, replacing the file atomically.
pub fn write_host_config(path: &Path, entries: &[HostEntry]) -> Result<(), ConfigError> {
    let mut text = String::from(HEADER);
    for entry in entries {
        text.push_str(&entry.to_line());
        text.push('\n');
    }
    let staging = path.with_extension("tmp");
    fs::write(&staging, text).map_err(|error| ConfigError::io("write", &staging, error))?;
    fs::rename(&staging, path).map_err(|error| ConfigError::io("rename", path, error))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> (Vec<HostEntry>, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let entries = parse_host_config(text, Path::new("HOST_CONFIG"), &mut diagnostics);
        (entries, diagnostics)
    }

    #[test]
    fn alias_only_line_takes_defaults() {
        let (entries, diagnostics) = parse("H1\n");
        assert_eq!(diagnostics.warnings(), 0);
        assert_eq!(entries, [HostEntry::new("H1")]);
        let status = entries[0].to_status();
        assert_eq!(status.active_hostname(), "H1");
        assert_eq!(status.file_size_offset, -1);
        assert_eq!(status.transfer_timeout, 120);
    }

    #[test]
    fn full_line_fills_every_field() {
        let line = "H2:down:up:{12}:proxy1:3:4:60:4096:5:0:30:1:1:512:100:2:4096:8192:600:65537:15:3600:7";
        let (entries, diagnostics) = parse(line);
        assert_eq!(diagnostics.warnings(), 0);
        let entry = &entries[0];
        assert_eq!(entry.real_hostname, ["down".to_string(), "up".to_string()]);
        assert!(entry.auto_toggle());
        assert_eq!(entry.allowed_transfers, 3);
        assert_eq!(entry.max_errors, 4);
        assert_eq!(entry.retry_interval, 60);
        assert_eq!(entry.block_size, 4096);
        assert_eq!(entry.successful_retries, 5);
        assert_eq!(entry.file_size_offset, 0);
        assert_eq!(entry.transfer_timeout, 30);
        assert_eq!(entry.host_status, host_status::STOP_TRANSFER_STAT);
        assert_eq!(entry.protocol_options, 512);
        assert_eq!(entry.transfer_rate_limit, 100);
        assert_eq!(entry.dup_check_flag, 65537);
        assert_eq!(entry.keep_connected, 15);
        assert_eq!(entry.warn_time, 3600);
        assert_eq!(entry.protocol_options2, 7);
        assert_eq!(entry.to_line(), line);
    }

    #[test]
    fn bad_number_warns_and_keeps_default() {
        let (entries, diagnostics) = parse("H1:h1::::two:x\n");
        assert_eq!(diagnostics.warnings(), 2);
        assert_eq!(entries[0].allowed_transfers, 2);
        assert_eq!(entries[0].max_errors, 10);
    }

    #[test]
    fn duplicates_and_long_aliases_are_skipped_in_order() {
        let (entries, diagnostics) = parse("B\nA\nB\nthis_alias_is_too_long\nC\n");
        let aliases: Vec<_> = entries.iter().map(|entry| entry.alias.as_str()).collect();
        assert_eq!(aliases, ["B", "A", "C"]);
        assert_eq!(diagnostics.warnings(), 2);
    }

    #[test]
    fn apply_keeps_counters_and_runtime_status() {
        let mut status = HostEntry::new("H1").to_status();
        status.bytes_send = 4096;
        status.error_counter = 2;
        status.host_status = host_status::PAUSE_QUEUE_STAT;
        let mut entry = HostEntry::new("H1");
        entry.max_errors = 5;
        entry.apply(&mut status, false);
        assert_eq!(status.max_errors, 5);
        assert_eq!(status.bytes_send, 4096);
        assert_eq!(status.error_counter, 2);
        assert_eq!(status.host_status, host_status::PAUSE_QUEUE_STAT);
        assert!(HostEntry::from_status(&status).same_settings(&entry));
    }

    #[test]
    fn write_then_load_preserves_entries() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("HOST_CONFIG");
        let mut second = HostEntry::new("H2");
        second.real_hostname[1] = "backup".into();
        second.toggle_str = "[12]".into();
        let entries = vec![HostEntry::new("H1"), second];
        write_host_config(&path, &entries).unwrap();
        let mut diagnostics = Diagnostics::new();
        assert_eq!(load_host_config(&path, &mut diagnostics).unwrap(), entries);
        assert_eq!(diagnostics.warnings(), 0);
    }
}
