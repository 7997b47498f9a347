//! Integration tests for the mapped status arrays.
//!
//! Writers and readers open the same file independently, the way FD, AMG and
//! the viewers do.

use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use status::{
    Access, DirStatus, HostStatus, JobIdRecord, StatusArray, StatusError, dir_flag, host_status,
};

// ============================================================================
// Concurrent writers
// ============================================================================

/// Verifies concurrent counter updates under one lock slot are not lost.
#[test]
fn concurrent_error_counter_updates_are_serialised() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fsa_status");
    let hsa = Arc::new(StatusArray::create(&path, &[HostStatus::new("h1")]).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let hsa = Arc::clone(&hsa);
            thread::spawn(move || {
                for _ in 0..50 {
                    hsa.update(0, HostStatus::LOCK_EC, |host| {
                        host.error_counter += 1;
                        host.total_errors += 1;
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let host = hsa.get(0).unwrap();
    assert_eq!(host.error_counter, 200);
    assert_eq!(host.total_errors, 200);
}

/// Verifies two mappings of one file touching disjoint fields keep both.
#[test]
fn disjoint_field_writers_do_not_clobber() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fsa_status");
    let fd_side = StatusArray::create(&path, &[HostStatus::new("h1")]).unwrap();
    let cmd_side = StatusArray::<HostStatus>::open(&path, Access::ReadWrite).unwrap();

    fd_side
        .update(0, HostStatus::LOCK_TFC, |host| host.total_file_counter = 3)
        .unwrap();
    cmd_side
        .update(0, HostStatus::LOCK_HS, |host| {
            host.host_status |= host_status::STOP_TRANSFER_STAT;
        })
        .unwrap();

    let host = fd_side.get(0).unwrap();
    assert_eq!(host.total_file_counter, 3);
    assert!(!host.is_schedulable());
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Verifies readers follow a rebuild to the new generation.
#[test]
fn registry_rebuild_is_seen_after_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job_id_data");
    let job = |id| JobIdRecord {
        job_id: id,
        ..JobIdRecord::default()
    };
    let writer = StatusArray::create(&path, &[job(1)]).unwrap();
    let reader = StatusArray::<JobIdRecord>::open(&path, Access::ReadOnly).unwrap();

    writer.rebuild(&[job(1), job(2)]).unwrap();
    assert!(reader.refresh().unwrap());
    assert_eq!(reader.position("2"), Some(1));
}

/// Verifies a host file cannot be opened as a directory file.
#[test]
fn mismatched_layout_is_an_invariant_violation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fsa_status");
    StatusArray::create(&path, &[HostStatus::new("h1")]).unwrap();
    let error = StatusArray::<DirStatus>::open(&path, Access::ReadOnly).unwrap_err();
    assert!(
        matches!(error, StatusError::VersionMismatch { found: 2, expected: 3, .. }),
        "{error}"
    );
    assert!(error.is_invariant_violation());
}

proptest! {
    /// `FILES_IN_QUEUE` tracks `files_queued` through any sequence of
    /// queue and unqueue steps.
    #[test]
    fn files_in_queue_flag_tracks_counter(steps in proptest::collection::vec((any::<bool>(), 0_u32..5), 0..40)) {
        let mut dir = DirStatus::new("d", "/in/d");
        for (add, files) in steps {
            if add {
                dir.queue_files(files, u64::from(files) * 10);
            } else {
                dir.unqueue_files(files, u64::from(files) * 10);
            }
            prop_assert_eq!(dir.files_queued == 0, !dir.has_flag(dir_flag::FILES_IN_QUEUE));
        }
    }
}
