use serde::Serialize;

use crate::codec::{get_i32, get_i64, get_str, get_u32, get_u64, put_i32, put_i64, put_str, put_u32, put_u64};
use crate::region::{LockSlot, Record};

/// Bits of [`AfdStatus::amg_jobs`].
pub mod amg_jobs {
    /// FD asks AMG to stop emitting messages until the queue drains.
    pub const PAUSE_DISTRIBUTION: u32 = 1 << 0;
    /// A DIR_CONFIG reload is in progress.
    pub const REREADING_DIR_CONFIG: u32 = 1 << 1;
    /// FD is checking the pool for orphaned messages.
    pub const FD_DIR_CHECK_ACTIVE: u32 = 1 << 2;
}

/// Field width of the node name.
pub const MAX_NODE_NAME_LENGTH: usize = 64;

/// Process-wide status block (`afd.status`), a single-record array.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct AfdStatus {
    /// Pid of the supervising process, 0 when not running.
    pub afd_pid: i32,
    /// Whether AMG is running.
    pub amg_active: bool,
    /// Whether FD is running.
    pub fd_active: bool,
    /// See [`amg_jobs`].
    pub amg_jobs: u32,
    /// Messages waiting in the FD queue.
    pub jobs_in_queue: u32,
    /// Workers transferring right now.
    pub no_of_transfers: i32,
    /// Start time of the running instance.
    pub start_time: i64,
    /// Incremented by the supervisor every tick.
    pub heartbeat: u64,
    /// Node the instance runs on.
    pub hostname: String,
}

impl AfdStatus {
    /// Guards `amg_jobs`.
    pub const LOCK_AMG_JOBS: LockSlot = LockSlot::field(8, 4);

    /// Whether AMG must hold back new messages.
    #[must_use]
    pub const fn distribution_paused(&self) -> bool {
        self.amg_jobs & amg_jobs::PAUSE_DISTRIBUTION != 0
    }
}

impl Record for AfdStatus {
    const SIZE: usize = 40 + MAX_NODE_NAME_LENGTH;
    const VERSION: u8 = 1;

    fn decode(bytes: &[u8]) -> Self {
        let active = get_u32(bytes, 4);
        Self {
            afd_pid: get_i32(bytes, 0),
            amg_active: active & 1 != 0,
            fd_active: active & 2 != 0,
            amg_jobs: get_u32(bytes, 8),
            jobs_in_queue: get_u32(bytes, 12),
            no_of_transfers: get_i32(bytes, 16),
            start_time: get_i64(bytes, 24),
            heartbeat: get_u64(bytes, 32),
            hostname: get_str(bytes, 40, MAX_NODE_NAME_LENGTH),
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        put_i32(bytes, 0, self.afd_pid);
        put_u32(
            bytes,
            4,
            u32::from(self.amg_active) | (u32::from(self.fd_active) << 1),
        );
        put_u32(bytes, 8, self.amg_jobs);
        put_u32(bytes, 12, self.jobs_in_queue);
        put_i32(bytes, 16, self.no_of_transfers);
        put_i64(bytes, 24, self.start_time);
        put_u64(bytes, 32, self.heartbeat);
        put_str(bytes, 40, MAX_NODE_NAME_LENGTH, &self.hostname);
    }

    fn key(&self) -> String {
        "afd".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_round_trips() {
        let status = AfdStatus {
            afd_pid: 42,
            amg_active: true,
            fd_active: false,
            amg_jobs: amg_jobs::PAUSE_DISTRIBUTION,
            jobs_in_queue: 9,
            no_of_transfers: 2,
            start_time: 1_700_000_000,
            heartbeat: 5,
            hostname: "node1".into(),
        };
        let mut bytes = vec![0_u8; AfdStatus::SIZE];
        status.encode(&mut bytes);
        assert_eq!(AfdStatus::decode(&bytes), status);
        assert!(status.distribution_paused());
    }
}
