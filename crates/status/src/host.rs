//! Host Status Array (HSA) records.
//!
//! One [`HostStatus`] per configured host, in HOST_CONFIG order, followed by
//! [`MAX_NO_PARALLEL_JOBS`] [`JobStatus`] slots describing the transfers in
//! flight. Counters shared by several writers are updated under the
//! matching lock slot ([`HostStatus::LOCK_HS`], [`HostStatus::LOCK_EC`],
//! [`HostStatus::LOCK_CON`], [`HostStatus::LOCK_TFC`]).

use serde::Serialize;

use crate::codec::{
    get_i8, get_i32, get_i64, get_str, get_u8, get_u32, get_u64, put_i8, put_i32, put_i64,
    put_str, put_u8, put_u32, put_u64,
};
use crate::region::{LockSlot, Record};

/// Maximum parallel transfers per host.
pub const MAX_NO_PARALLEL_JOBS: usize = 5;
/// Length of the error history ring.
pub const ERROR_HISTORY_LENGTH: usize = 5;
/// Field width of a host alias (including terminator).
pub const MAX_HOSTNAME_LENGTH: usize = 16;
/// Field width of a real host name.
pub const MAX_REAL_HOSTNAME_LENGTH: usize = 72;
/// Field width of the proxy string.
pub const MAX_PROXY_NAME_LENGTH: usize = 80;
/// Field width of the toggle string.
pub const MAX_TOGGLE_STR_LENGTH: usize = 6;
/// Field width of a file name in use.
pub const MAX_FILENAME_LENGTH: usize = 256;
/// Field width of a message name.
pub const MAX_MSG_NAME_LENGTH: usize = 64;

/// `host_toggle` value selecting `real_hostname[0]`.
pub const HOST_ONE: u8 = 1;
/// `host_toggle` value selecting `real_hostname[1]`.
pub const HOST_TWO: u8 = 2;

/// Bits of [`HostStatus::host_status`].
pub mod host_status {
    /// Transfers to the host are stopped.
    pub const STOP_TRANSFER_STAT: u32 = 1 << 0;
    /// The queue for the host is paused.
    pub const PAUSE_QUEUE_STAT: u32 = 1 << 1;
    /// Queue paused automatically because of errors.
    pub const AUTO_PAUSE_QUEUE_STAT: u32 = 1 << 2;
    /// Queue paused because the pool ran short of space.
    pub const DANGER_PAUSE_QUEUE_STAT: u32 = 1 << 3;
    /// Operator acknowledged the current error.
    pub const HOST_ERROR_ACKNOWLEDGED: u32 = 1 << 4;
    /// Host declared offline; errors are not alarmed.
    pub const HOST_ERROR_OFFLINE: u32 = 1 << 5;
    /// Acknowledgement with a time limit.
    pub const HOST_ERROR_ACKNOWLEDGED_T: u32 = 1 << 6;
    /// Offline with a time limit.
    pub const HOST_ERROR_OFFLINE_T: u32 = 1 << 7;
    /// Acknowledgement survives successful transfers.
    pub const HOST_ERROR_EA_STATIC: u32 = 1 << 8;
    /// Offline survives successful transfers.
    pub const HOST_ERROR_OFFLINE_STATIC: u32 = 1 << 9;
    /// Keep queued data when the host is disabled.
    pub const DO_NOT_DELETE_DATA: u32 = 1 << 10;
    /// No successful connection within `warn_time`.
    pub const HOST_WARN_TIME_REACHED: u32 = 1 << 11;
    /// Jobs for the host sit in the error queue.
    pub const ERROR_QUEUE_SET: u32 = 1 << 12;
    /// Last action against the host succeeded.
    pub const HOST_ACTION_SUCCESS: u32 = 1 << 13;
    /// Report transfers as done without contacting the host.
    pub const SIMULATE_SEND_MODE: u32 = 1 << 14;
    /// Host disabled in HOST_CONFIG; nothing may be scheduled.
    pub const HOST_CONFIG_HOST_DISABLED: u32 = 1 << 15;
    /// Host uses two real host names.
    pub const HOST_TWO_FLAG: u32 = 1 << 16;
    /// `error_counter` reached `max_errors`.
    pub const PENDING_ERRORS: u32 = 1 << 17;
    /// `error_counter` passed `max_errors`; retries are delayed.
    pub const NOT_WORKING: u32 = 1 << 18;
    /// Host no longer referenced from any DIR_CONFIG.
    pub const HOST_NOT_IN_DIR_CONFIG: u32 = 1 << 19;
    /// Transfer-debug output enabled for the host.
    pub const DEBUG_MODE: u32 = 1 << 20;

    /// Bits persisted in HOST_CONFIG field 14.
    pub const PERSISTED: u32 = STOP_TRANSFER_STAT
        | PAUSE_QUEUE_STAT
        | HOST_ERROR_OFFLINE_STATIC
        | HOST_ERROR_EA_STATIC
        | DO_NOT_DELETE_DATA
        | SIMULATE_SEND_MODE
        | HOST_CONFIG_HOST_DISABLED;

    /// Any of these blocks scheduling.
    pub const NO_SCHEDULE: u32 = HOST_CONFIG_HOST_DISABLED | STOP_TRANSFER_STAT | PAUSE_QUEUE_STAT;
}

/// Bits of [`HostStatus::protocol_options`].
pub mod protocol_options {
    /// FTP passive mode.
    pub const FTP_PASSIVE_MODE: u32 = 1 << 0;
    /// Send keep-alive commands while idle.
    pub const STAT_KEEPALIVE: u32 = 1 << 1;
    /// Enable transport compression.
    pub const COMPRESSION: u32 = 1 << 2;
    /// Verify TLS certificates strictly.
    pub const STRICT_TLS_VERIFY: u32 = 1 << 3;
    /// Rename into place in one step.
    pub const FAST_RENAME: u32 = 1 << 4;
    /// Keep the modification time of sent files.
    pub const KEEP_TIME_STAMP: u32 = 1 << 5;
    /// Never reuse a connection for the next job.
    pub const DISABLE_BURSTING: u32 = 1 << 9;
    /// Retries do not lower a job's queue position.
    pub const NO_AGEING_JOBS: u32 = 1 << 10;
    /// Only one transfer at a time may hold the host's sequence lock.
    pub const USE_SEQUENCE_LOCKING: u32 = 1 << 11;
    /// Sort file names before sending.
    pub const SORT_FILE_NAMES: u32 = 1 << 12;
}

/// Bits of [`HostStatus::special_flag`].
pub mod special_flag {
    /// Referenced by at least one job.
    pub const HOST_IN_DIR_CONFIG: u32 = 1 << 0;
    /// An idle worker keeps a connection open.
    pub const KEEP_CON_IDLE: u32 = 1 << 1;
    /// Retry requested by the operator.
    pub const RETRY_REQUESTED: u32 = 1 << 2;
}

/// State of a job-status slot.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectStatus {
    /// Slot free.
    #[default]
    Disconnected,
    /// Opening the connection.
    Connecting,
    /// Sending files.
    Transferring,
    /// Sending files of a burst continuation.
    Burst,
    /// Connected and waiting for more work.
    KeepAlive,
    /// Closing the connection.
    Closing,
    /// Last attempt failed.
    NotWorking,
}

impl ConnectStatus {
    /// Stored byte.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Transferring => 2,
            Self::Burst => 3,
            Self::KeepAlive => 4,
            Self::Closing => 5,
            Self::NotWorking => 6,
        }
    }

    /// Parses a stored byte; unknown values read as disconnected.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Connecting,
            2 => Self::Transferring,
            3 => Self::Burst,
            4 => Self::KeepAlive,
            5 => Self::Closing,
            6 => Self::NotWorking,
            _ => Self::Disconnected,
        }
    }
}

/// One transfer slot of a host.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct JobStatus {
    /// Worker id holding the slot, 0 when free.
    pub pid: i32,
    /// State of the slot.
    pub connect_status: ConnectStatus,
    /// Job-status flags.
    pub special_flag: u32,
    /// Job being transferred.
    pub job_id: u32,
    /// Files in the current message.
    pub no_of_files: u32,
    /// Files of the current message already sent.
    pub no_of_files_done: u32,
    /// Bytes in the current message.
    pub file_size: u64,
    /// Bytes of the current message already sent.
    pub file_size_done: u64,
    /// Bytes sent by this slot since it was taken.
    pub bytes_send: u64,
    /// Size of the file being sent.
    pub file_size_in_use: u64,
    /// Bytes of that file already sent.
    pub file_size_in_use_done: u64,
    /// Name of the file being sent.
    pub file_name_in_use: String,
    /// Message name being worked on.
    pub unique_name: String,
}

impl JobStatus {
    /// Encoded size of one slot.
    pub const SIZE: usize = 384;

    const PID: usize = 0;
    const CONNECT_STATUS: usize = 4;
    const SPECIAL_FLAG: usize = 8;
    const JOB_ID: usize = 12;
    const NO_OF_FILES: usize = 16;
    const NO_OF_FILES_DONE: usize = 20;
    const FILE_SIZE: usize = 24;
    const FILE_SIZE_DONE: usize = 32;
    const BYTES_SEND: usize = 40;
    const FILE_SIZE_IN_USE: usize = 48;
    const FILE_SIZE_IN_USE_DONE: usize = 56;
    const FILE_NAME_IN_USE: usize = 64;
    const UNIQUE_NAME: usize = Self::FILE_NAME_IN_USE + MAX_FILENAME_LENGTH;

    fn decode(bytes: &[u8]) -> Self {
        Self {
            pid: get_i32(bytes, Self::PID),
            connect_status: ConnectStatus::from_code(get_u8(bytes, Self::CONNECT_STATUS)),
            special_flag: get_u32(bytes, Self::SPECIAL_FLAG),
            job_id: get_u32(bytes, Self::JOB_ID),
            no_of_files: get_u32(bytes, Self::NO_OF_FILES),
            no_of_files_done: get_u32(bytes, Self::NO_OF_FILES_DONE),
            file_size: get_u64(bytes, Self::FILE_SIZE),
            file_size_done: get_u64(bytes, Self::FILE_SIZE_DONE),
            bytes_send: get_u64(bytes, Self::BYTES_SEND),
            file_size_in_use: get_u64(bytes, Self::FILE_SIZE_IN_USE),
            file_size_in_use_done: get_u64(bytes, Self::FILE_SIZE_IN_USE_DONE),
            file_name_in_use: get_str(bytes, Self::FILE_NAME_IN_USE, MAX_FILENAME_LENGTH),
            unique_name: get_str(bytes, Self::UNIQUE_NAME, MAX_MSG_NAME_LENGTH),
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        put_i32(bytes, Self::PID, self.pid);
        put_u8(bytes, Self::CONNECT_STATUS, self.connect_status.code());
        put_u32(bytes, Self::SPECIAL_FLAG, self.special_flag);
        put_u32(bytes, Self::JOB_ID, self.job_id);
        put_u32(bytes, Self::NO_OF_FILES, self.no_of_files);
        put_u32(bytes, Self::NO_OF_FILES_DONE, self.no_of_files_done);
        put_u64(bytes, Self::FILE_SIZE, self.file_size);
        put_u64(bytes, Self::FILE_SIZE_DONE, self.file_size_done);
        put_u64(bytes, Self::BYTES_SEND, self.bytes_send);
        put_u64(bytes, Self::FILE_SIZE_IN_USE, self.file_size_in_use);
        put_u64(bytes, Self::FILE_SIZE_IN_USE_DONE, self.file_size_in_use_done);
        put_str(bytes, Self::FILE_NAME_IN_USE, MAX_FILENAME_LENGTH, &self.file_name_in_use);
        put_str(bytes, Self::UNIQUE_NAME, MAX_MSG_NAME_LENGTH, &self.unique_name);
    }

    /// Clears the slot back to its free state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Operational state of one host.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct HostStatus {
    /// Short unique name.
    pub host_alias: String,
    /// Primary and secondary host names.
    pub real_hostname: [String; 2],
    /// Toggle characters as configured (`[12]`, `{12}` or empty).
    pub toggle_str: String,
    /// Which real host name new connections use ([`HOST_ONE`]/[`HOST_TWO`]).
    pub host_toggle: u8,
    /// Whether errors flip `host_toggle` automatically.
    pub auto_toggle: bool,
    /// Toggle in effect before the last automatic switch.
    pub original_toggle: u8,
    /// Resume offset policy; −1 disables appending.
    pub file_size_offset: i8,
    /// Last distinct error codes, newest first.
    pub error_history: [u8; ERROR_HISTORY_LENGTH],
    /// Proxy login sequence.
    pub proxy_name: String,
    /// CRC-32 of the alias.
    pub host_id: u32,
    /// Scheme bitmap of jobs using the host.
    pub protocol: u32,
    /// See [`protocol_options`].
    pub protocol_options: u32,
    /// Second options word, passed to adapters uninterpreted.
    pub protocol_options2: u32,
    /// See [`host_status`].
    pub host_status: u32,
    /// See [`special_flag`].
    pub special_flag: u32,
    /// Maximum parallel transfers.
    pub allowed_transfers: i32,
    /// Errors before the host is considered not working.
    pub max_errors: i32,
    /// Seconds between retries while in error.
    pub retry_interval: i32,
    /// Transfer block size in bytes.
    pub block_size: i32,
    /// Successful transfers counted since an automatic toggle.
    pub successful_retries: i32,
    /// Successful transfers after which the original host is restored.
    pub max_successful_retries: i32,
    /// Seconds allowed per transport call.
    pub transfer_timeout: i64,
    /// Seconds an idle connection is kept open.
    pub keep_connected: u32,
    /// KiB/s shared by all transfers to the host, 0 = unlimited.
    pub transfer_rate_limit: u32,
    /// IP time to live, 0 = system default.
    pub ttl: i32,
    /// Socket send buffer size, 0 = system default.
    pub socksnd_bufsize: u32,
    /// Socket receive buffer size, 0 = system default.
    pub sockrcv_bufsize: u32,
    /// Consecutive jobs after which a burst stops.
    pub number_of_no_bursts: u32,
    /// Host-level dupcheck timeout in seconds.
    pub dup_check_timeout: i64,
    /// Host-level dupcheck flags.
    pub dup_check_flag: u64,
    /// Seconds without success before warning, 0 = never.
    pub warn_time: i64,
    /// Consecutive errors.
    pub error_counter: i32,
    /// Errors since start.
    pub total_errors: u32,
    /// Messages queued for the host.
    pub jobs_queued: u32,
    /// Transfers in progress.
    pub active_transfers: i32,
    /// Connections opened since start.
    pub connections: u32,
    /// Jobs delivered as burst continuations.
    pub burst2_counter: u32,
    /// Files delivered since start.
    pub file_counter_done: u32,
    /// Files queued for the host.
    pub total_file_counter: i32,
    /// Bytes queued for the host.
    pub total_file_size: u64,
    /// Bytes delivered since start.
    pub bytes_send: u64,
    /// Time of the last retry.
    pub last_retry_time: i64,
    /// Time of the last successful connection.
    pub last_connection: i64,
    /// Time the current error streak began.
    pub first_error_time: i64,
    /// Per-slot transfer state.
    pub job_status: [JobStatus; MAX_NO_PARALLEL_JOBS],
}

mod off {
    use super::{
        ERROR_HISTORY_LENGTH, MAX_HOSTNAME_LENGTH, MAX_PROXY_NAME_LENGTH,
        MAX_REAL_HOSTNAME_LENGTH, MAX_TOGGLE_STR_LENGTH,
    };

    pub(super) const HOST_ALIAS: usize = 0;
    pub(super) const REAL_HOSTNAME: usize = HOST_ALIAS + MAX_HOSTNAME_LENGTH;
    pub(super) const TOGGLE_STR: usize = REAL_HOSTNAME + 2 * MAX_REAL_HOSTNAME_LENGTH;
    pub(super) const HOST_TOGGLE: usize = TOGGLE_STR + MAX_TOGGLE_STR_LENGTH;
    pub(super) const AUTO_TOGGLE: usize = HOST_TOGGLE + 1;
    pub(super) const ORIGINAL_TOGGLE: usize = AUTO_TOGGLE + 1;
    pub(super) const FILE_SIZE_OFFSET: usize = ORIGINAL_TOGGLE + 1;
    pub(super) const ERROR_HISTORY: usize = FILE_SIZE_OFFSET + 1;
    pub(super) const PROXY_NAME: usize = 176;
    pub(super) const HOST_ID: usize = PROXY_NAME + MAX_PROXY_NAME_LENGTH;
    pub(super) const PROTOCOL: usize = HOST_ID + 4;
    pub(super) const PROTOCOL_OPTIONS: usize = PROTOCOL + 4;
    pub(super) const PROTOCOL_OPTIONS2: usize = PROTOCOL_OPTIONS + 4;
    pub(super) const HOST_STATUS: usize = PROTOCOL_OPTIONS2 + 4;
    pub(super) const SPECIAL_FLAG: usize = HOST_STATUS + 4;
    pub(super) const ALLOWED_TRANSFERS: usize = SPECIAL_FLAG + 4;
    pub(super) const MAX_ERRORS: usize = ALLOWED_TRANSFERS + 4;
    pub(super) const RETRY_INTERVAL: usize = MAX_ERRORS + 4;
    pub(super) const BLOCK_SIZE: usize = RETRY_INTERVAL + 4;
    pub(super) const SUCCESSFUL_RETRIES: usize = BLOCK_SIZE + 4;
    pub(super) const MAX_SUCCESSFUL_RETRIES: usize = SUCCESSFUL_RETRIES + 4;
    pub(super) const TRANSFER_TIMEOUT: usize = MAX_SUCCESSFUL_RETRIES + 4;
    pub(super) const KEEP_CONNECTED: usize = TRANSFER_TIMEOUT + 8;
    pub(super) const TRANSFER_RATE_LIMIT: usize = KEEP_CONNECTED + 4;
    pub(super) const TTL: usize = TRANSFER_RATE_LIMIT + 4;
    pub(super) const SOCKSND_BUFSIZE: usize = TTL + 4;
    pub(super) const SOCKRCV_BUFSIZE: usize = SOCKSND_BUFSIZE + 4;
    pub(super) const NUMBER_OF_NO_BURSTS: usize = SOCKRCV_BUFSIZE + 4;
    pub(super) const DUP_CHECK_TIMEOUT: usize = NUMBER_OF_NO_BURSTS + 4;
    pub(super) const DUP_CHECK_FLAG: usize = DUP_CHECK_TIMEOUT + 8;
    pub(super) const WARN_TIME: usize = DUP_CHECK_FLAG + 8;
    pub(super) const ERROR_COUNTER: usize = WARN_TIME + 8;
    pub(super) const TOTAL_ERRORS: usize = ERROR_COUNTER + 4;
    pub(super) const JOBS_QUEUED: usize = TOTAL_ERRORS + 4;
    pub(super) const ACTIVE_TRANSFERS: usize = JOBS_QUEUED + 4;
    pub(super) const CONNECTIONS: usize = ACTIVE_TRANSFERS + 4;
    pub(super) const BURST2_COUNTER: usize = CONNECTIONS + 4;
    pub(super) const FILE_COUNTER_DONE: usize = BURST2_COUNTER + 4;
    pub(super) const TOTAL_FILE_COUNTER: usize = FILE_COUNTER_DONE + 4;
    pub(super) const TOTAL_FILE_SIZE: usize = TOTAL_FILE_COUNTER + 4;
    pub(super) const BYTES_SEND: usize = TOTAL_FILE_SIZE + 8;
    pub(super) const LAST_RETRY_TIME: usize = BYTES_SEND + 8;
    pub(super) const LAST_CONNECTION: usize = LAST_RETRY_TIME + 8;
    pub(super) const FIRST_ERROR_TIME: usize = LAST_CONNECTION + 8;
    pub(super) const JOB_STATUS: usize = FIRST_ERROR_TIME + 8;

    const _: () = assert!(ERROR_HISTORY + ERROR_HISTORY_LENGTH <= PROXY_NAME);
    const _: () = assert!(JOB_STATUS == 432);
}

impl HostStatus {
    /// Guards `host_status`.
    pub const LOCK_HS: LockSlot = LockSlot::field(off::HOST_STATUS, 4);
    /// Guards `error_counter` and `total_errors`.
    pub const LOCK_EC: LockSlot = LockSlot::field(off::ERROR_COUNTER, 8);
    /// Guards `active_transfers` and `connections`.
    pub const LOCK_CON: LockSlot = LockSlot::field(off::ACTIVE_TRANSFERS, 8);
    /// Guards `total_file_counter` and `total_file_size`.
    pub const LOCK_TFC: LockSlot = LockSlot::field(off::TOTAL_FILE_COUNTER, 12);

    /// Guards `job_status[slot]`.
    #[must_use]
    pub const fn lock_job(slot: usize) -> LockSlot {
        LockSlot::field(off::JOB_STATUS + slot * JobStatus::SIZE, JobStatus::SIZE)
    }

    /// Host record with HOST_CONFIG defaults.
    #[must_use]
    pub fn new(host_alias: &str) -> Self {
        Self {
            host_alias: host_alias.to_string(),
            real_hostname: [host_alias.to_string(), String::new()],
            host_toggle: HOST_ONE,
            original_toggle: HOST_ONE,
            file_size_offset: -1,
            host_id: checksums::host_id(host_alias),
            allowed_transfers: 2,
            max_errors: 10,
            retry_interval: 120,
            block_size: 65536,
            transfer_timeout: 120,
            ..Self::default()
        }
    }

    /// Real host name new connections should use.
    #[must_use]
    pub fn active_hostname(&self) -> &str {
        let index = usize::from(self.host_toggle == HOST_TWO);
        &self.real_hostname[index]
    }

    /// The real host name not currently in use.
    #[must_use]
    pub fn other_hostname(&self) -> &str {
        let index = usize::from(self.host_toggle != HOST_TWO);
        &self.real_hostname[index]
    }

    /// Flips `host_toggle` between the two real host names.
    pub fn toggle(&mut self) {
        self.host_toggle = if self.host_toggle == HOST_TWO {
            HOST_ONE
        } else {
            HOST_TWO
        };
    }

    /// Whether any of `bits` are set in `host_status`.
    #[must_use]
    pub const fn has_status(&self, bits: u32) -> bool {
        self.host_status & bits != 0
    }

    /// Whether the scheduler may start transfers to this host.
    #[must_use]
    pub const fn is_schedulable(&self) -> bool {
        !self.has_status(host_status::NO_SCHEDULE)
    }

    /// Records an error code, shifting the history ring when it differs
    /// from the newest entry.
    pub fn push_error(&mut self, code: u8) {
        if self.error_history[0] == code {
            return;
        }
        self.error_history.copy_within(0..ERROR_HISTORY_LENGTH - 1, 1);
        self.error_history[0] = code;
    }

    /// First free job-status slot within `allowed_transfers`.
    #[must_use]
    pub fn free_slot(&self) -> Option<usize> {
        let allowed = usize::try_from(self.allowed_transfers)
            .unwrap_or(0)
            .min(MAX_NO_PARALLEL_JOBS);
        self.job_status[..allowed]
            .iter()
            .position(|slot| slot.pid == 0)
    }
}

impl Record for HostStatus {
    const SIZE: usize = off::JOB_STATUS + MAX_NO_PARALLEL_JOBS * JobStatus::SIZE;
    const VERSION: u8 = 2;

    fn decode(bytes: &[u8]) -> Self {
        let mut error_history = [0_u8; ERROR_HISTORY_LENGTH];
        error_history
            .copy_from_slice(&bytes[off::ERROR_HISTORY..off::ERROR_HISTORY + ERROR_HISTORY_LENGTH]);
        let job_status = std::array::from_fn(|slot| {
            let start = off::JOB_STATUS + slot * JobStatus::SIZE;
            JobStatus::decode(&bytes[start..start + JobStatus::SIZE])
        });
        Self {
            host_alias: get_str(bytes, off::HOST_ALIAS, MAX_HOSTNAME_LENGTH),
            real_hostname: [
                get_str(bytes, off::REAL_HOSTNAME, MAX_REAL_HOSTNAME_LENGTH),
                get_str(
                    bytes,
                    off::REAL_HOSTNAME + MAX_REAL_HOSTNAME_LENGTH,
                    MAX_REAL_HOSTNAME_LENGTH,
                ),
            ],
            toggle_str: get_str(bytes, off::TOGGLE_STR, MAX_TOGGLE_STR_LENGTH),
            host_toggle: get_u8(bytes, off::HOST_TOGGLE),
            auto_toggle: get_u8(bytes, off::AUTO_TOGGLE) != 0,
            original_toggle: get_u8(bytes, off::ORIGINAL_TOGGLE),
            file_size_offset: get_i8(bytes, off::FILE_SIZE_OFFSET),
            error_history,
            proxy_name: get_str(bytes, off::PROXY_NAME, MAX_PROXY_NAME_LENGTH),
            host_id: get_u32(bytes, off::HOST_ID),
            protocol: get_u32(bytes, off::PROTOCOL),
            protocol_options: get_u32(bytes, off::PROTOCOL_OPTIONS),
            protocol_options2: get_u32(bytes, off::PROTOCOL_OPTIONS2),
            host_status: get_u32(bytes, off::HOST_STATUS),
            special_flag: get_u32(bytes, off::SPECIAL_FLAG),
            allowed_transfers: get_i32(bytes, off::ALLOWED_TRANSFERS),
            max_errors: get_i32(bytes, off::MAX_ERRORS),
            retry_interval: get_i32(bytes, off::RETRY_INTERVAL),
            block_size: get_i32(bytes, off::BLOCK_SIZE),
            successful_retries: get_i32(bytes, off::SUCCESSFUL_RETRIES),
            max_successful_retries: get_i32(bytes, off::MAX_SUCCESSFUL_RETRIES),
            transfer_timeout: get_i64(bytes, off::TRANSFER_TIMEOUT),
            keep_connected: get_u32(bytes, off::KEEP_CONNECTED),
            transfer_rate_limit: get_u32(bytes, off::TRANSFER_RATE_LIMIT),
            ttl: get_i32(bytes, off::TTL),
            socksnd_bufsize: get_u32(bytes, off::SOCKSND_BUFSIZE),
            sockrcv_bufsize: get_u32(bytes, off::SOCKRCV_BUFSIZE),
            number_of_no_bursts: get_u32(bytes, off::NUMBER_OF_NO_BURSTS),
            dup_check_timeout: get_i64(bytes, off::DUP_CHECK_TIMEOUT),
            dup_check_flag: get_u64(bytes, off::DUP_CHECK_FLAG),
            warn_time: get_i64(bytes, off::WARN_TIME),
            error_counter: get_i32(bytes, off::ERROR_COUNTER),
            total_errors: get_u32(bytes, off::TOTAL_ERRORS),
            jobs_queued: get_u32(bytes, off::JOBS_QUEUED),
            active_transfers: get_i32(bytes, off::ACTIVE_TRANSFERS),
            connections: get_u32(bytes, off::CONNECTIONS),
            burst2_counter: get_u32(bytes, off::BURST2_COUNTER),
            file_counter_done: get_u32(bytes, off::FILE_COUNTER_DONE),
            total_file_counter: get_i32(bytes, off::TOTAL_FILE_COUNTER),
            total_file_size: get_u64(bytes, off::TOTAL_FILE_SIZE),
            bytes_send: get_u64(bytes, off::BYTES_SEND),
            last_retry_time: get_i64(bytes, off::LAST_RETRY_TIME),
            last_connection: get_i64(bytes, off::LAST_CONNECTION),
            first_error_time: get_i64(bytes, off::FIRST_ERROR_TIME),
            job_status,
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        put_str(bytes, off::HOST_ALIAS, MAX_HOSTNAME_LENGTH, &self.host_alias);
        put_str(
            bytes,
            off::REAL_HOSTNAME,
            MAX_REAL_HOSTNAME_LENGTH,
            &self.real_hostname[0],
        );
        put_str(
            bytes,
            off::REAL_HOSTNAME + MAX_REAL_HOSTNAME_LENGTH,
            MAX_REAL_HOSTNAME_LENGTH,
            &self.real_hostname[1],
        );
        put_str(bytes, off::TOGGLE_STR, MAX_TOGGLE_STR_LENGTH, &self.toggle_str);
        put_u8(bytes, off::HOST_TOGGLE, self.host_toggle);
        put_u8(bytes, off::AUTO_TOGGLE, u8::from(self.auto_toggle));
        put_u8(bytes, off::ORIGINAL_TOGGLE, self.original_toggle);
        put_i8(bytes, off::FILE_SIZE_OFFSET, self.file_size_offset);
        bytes[off::ERROR_HISTORY..off::ERROR_HISTORY + ERROR_HISTORY_LENGTH]
            .copy_from_slice(&self.error_history);
        put_str(bytes, off::PROXY_NAME, MAX_PROXY_NAME_LENGTH, &self.proxy_name);
        put_u32(bytes, off::HOST_ID, self.host_id);
        put_u32(bytes, off::PROTOCOL, self.protocol);
        put_u32(bytes, off::PROTOCOL_OPTIONS, self.protocol_options);
        put_u32(bytes, off::PROTOCOL_OPTIONS2, self.protocol_options2);
        put_u32(bytes, off::HOST_STATUS, self.host_status);
        put_u32(bytes, off::SPECIAL_FLAG, self.special_flag);
        put_i32(bytes, off::ALLOWED_TRANSFERS, self.allowed_transfers);
        put_i32(bytes, off::MAX_ERRORS, self.max_errors);
        put_i32(bytes, off::RETRY_INTERVAL, self.retry_interval);
        put_i32(bytes, off::BLOCK_SIZE, self.block_size);
        put_i32(bytes, off::SUCCESSFUL_RETRIES, self.successful_retries);
        put_i32(bytes, off::MAX_SUCCESSFUL_RETRIES, self.max_successful_retries);
        put_i64(bytes, off::TRANSFER_TIMEOUT, self.transfer_timeout);
        put_u32(bytes, off::KEEP_CONNECTED, self.keep_connected);
        put_u32(bytes, off::TRANSFER_RATE_LIMIT, self.transfer_rate_limit);
        put_i32(bytes, off::TTL, self.ttl);
        put_u32(bytes, off::SOCKSND_BUFSIZE, self.socksnd_bufsize);
        put_u32(bytes, off::SOCKRCV_BUFSIZE, self.sockrcv_bufsize);
        put_u32(bytes, off::NUMBER_OF_NO_BURSTS, self.number_of_no_bursts);
        put_i64(bytes, off::DUP_CHECK_TIMEOUT, self.dup_check_timeout);
        put_u64(bytes, off::DUP_CHECK_FLAG, self.dup_check_flag);
        put_i64(bytes, off::WARN_TIME, self.warn_time);
        put_i32(bytes, off::ERROR_COUNTER, self.error_counter);
        put_u32(bytes, off::TOTAL_ERRORS, self.total_errors);
        put_u32(bytes, off::JOBS_QUEUED, self.jobs_queued);
        put_i32(bytes, off::ACTIVE_TRANSFERS, self.active_transfers);
        put_u32(bytes, off::CONNECTIONS, self.connections);
        put_u32(bytes, off::BURST2_COUNTER, self.burst2_counter);
        put_u32(bytes, off::FILE_COUNTER_DONE, self.file_counter_done);
        put_i32(bytes, off::TOTAL_FILE_COUNTER, self.total_file_counter);
        put_u64(bytes, off::TOTAL_FILE_SIZE, self.total_file_size);
        put_u64(bytes, off::BYTES_SEND, self.bytes_send);
        put_i64(bytes, off::LAST_RETRY_TIME, self.last_retry_time);
        put_i64(bytes, off::LAST_CONNECTION, self.last_connection);
        put_i64(bytes, off::FIRST_ERROR_TIME, self.first_error_time);
        for (slot, status) in self.job_status.iter().enumerate() {
            let start = off::JOB_STATUS + slot * JobStatus::SIZE;
            status.encode(&mut bytes[start..start + JobStatus::SIZE]);
        }
    }

    fn key(&self) -> String {
        self.host_alias.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_through_bytes() {
        let mut host = HostStatus::new("h1");
        host.real_hostname[1] = "backup.example".into();
        host.error_counter = 3;
        host.dup_check_flag = 1 << 34;
        host.job_status[4].file_name_in_use = "x.dat".into();
        host.job_status[4].connect_status = ConnectStatus::Burst;
        let mut bytes = vec![0_u8; HostStatus::SIZE];
        host.encode(&mut bytes);
        assert_eq!(HostStatus::decode(&bytes), host);
    }

    #[test]
    fn lock_slots_cover_their_fields() {
        let mut host = HostStatus::new("h1");
        host.error_counter = 0x0102_0304;
        let mut bytes = vec![0_u8; HostStatus::SIZE];
        host.encode(&mut bytes);
        let slot = HostStatus::LOCK_EC;
        assert_eq!(
            &bytes[slot.offset..slot.offset + 4],
            &0x0102_0304_i32.to_le_bytes()
        );
    }

    #[test]
    fn error_history_skips_repeated_codes() {
        let mut host = HostStatus::new("h2");
        host.push_error(7);
        host.push_error(7);
        host.push_error(3);
        host.push_error(7);
        assert_eq!(host.error_history, [7, 3, 7, 0, 0]);
    }

    #[test]
    fn toggle_switches_active_hostname() {
        let mut host = HostStatus::new("h2");
        host.real_hostname = ["down".into(), "up".into()];
        assert_eq!(host.active_hostname(), "down");
        host.toggle();
        assert_eq!(host.host_toggle, HOST_TWO);
        assert_eq!(host.active_hostname(), "up");
        assert_eq!(host.other_hostname(), "down");
    }

    #[test]
    fn free_slot_honours_allowed_transfers() {
        let mut host = HostStatus::new("h1");
        host.allowed_transfers = 1;
        assert_eq!(host.free_slot(), Some(0));
        host.job_status[0].pid = 1;
        assert_eq!(host.free_slot(), None);
    }
}
