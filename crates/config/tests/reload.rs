//! Loading and republishing a work directory's configuration.

use std::fs;

use config::{DirConfigResult, HostConfigResult, loader};
use status::{Access, HostStatus, StatusArray, WorkDir, host_status};

const DIR_CONFIG: &str = "\
[directory] /data/in/obs
   [files]
   *.dat

      [destination]
         [recipient]
         ftp://user:secret@h1/out
         file://h2/archive/obs

         [options]
         priority 3
";

fn work_dir() -> (tempfile::TempDir, WorkDir) {
    let root = tempfile::tempdir().unwrap();
    let work = WorkDir::new(root.path());
    work.create_all().unwrap();
    fs::write(work.dir_config(), DIR_CONFIG).unwrap();
    (root, work)
}

fn reload(work: &WorkDir) -> loader::Published {
    let loaded = loader::load(work).unwrap();
    loader::publish(work, &loaded).unwrap()
}

// ============================================================================
// Idempotence
// ============================================================================

/// The first publish creates everything; an identical second one changes nothing.
#[test]
fn reloading_unchanged_files_reports_no_change() {
    let (_root, work) = work_dir();

    let first = reload(&work);
    assert_eq!(first.dir_result, DirConfigResult::Updated);
    assert_eq!(first.host_result, HostConfigResult::Recreated);
    assert_eq!(first.jobs.added, 2);
    assert!(!work.host_config().exists(), "HOST_CONFIG is only written on request");

    let second = reload(&work);
    assert_eq!(second.dir_result, DirConfigResult::NoChange);
    assert_eq!(second.host_result, HostConfigResult::NoChange);
    assert!(second.jobs.is_empty());
}

/// Job ids stay the same across loads.
#[test]
fn job_ids_are_stable() {
    let (_root, work) = work_dir();
    let first = loader::load(&work).unwrap();
    let second = loader::load(&work).unwrap();
    let ids = |loaded: &loader::LoadedConfig| {
        loaded.compiled.jobs.iter().map(|job| job.job_id).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
}

// ============================================================================
// Merging with running state
// ============================================================================

/// Counters and operator bits of a host survive a reload.
#[test]
fn running_host_state_survives_reload() {
    let (_root, work) = work_dir();
    reload(&work);

    let hsa = StatusArray::<HostStatus>::open(&work.fsa_status(), Access::ReadWrite).unwrap();
    hsa.update_by_alias("h1", HostStatus::LOCK_HS, |host| {
        host.file_counter_done = 17;
        host.host_status |= host_status::STOP_TRANSFER_STAT;
    })
    .unwrap();
    drop(hsa);

    let published = reload(&work);
    let h1 = published
        .hosts
        .iter()
        .find(|host| host.host_alias == "h1")
        .unwrap();
    assert_eq!(h1.file_counter_done, 17);
    assert!(h1.has_status(host_status::STOP_TRANSFER_STAT));
}

/// Dropping a recipient removes exactly one job; its host stays listed.
#[test]
fn removed_recipient_is_counted() {
    let (_root, work) = work_dir();
    reload(&work);
    loader::save_host_config(&work).unwrap();

    fs::write(
        work.dir_config(),
        DIR_CONFIG.replace("         file://h2/archive/obs\n", ""),
    )
    .unwrap();
    let published = reload(&work);
    assert_eq!(published.dir_result, DirConfigResult::Updated);
    assert_eq!(published.jobs.removed, 1);
    assert_eq!(published.jobs.added, 0);
    let h2 = published
        .hosts
        .iter()
        .find(|host| host.host_alias == "h2")
        .unwrap();
    assert!(h2.has_status(host_status::HOST_NOT_IN_DIR_CONFIG));
}

// ============================================================================
// Failures
// ============================================================================

/// A DIR_CONFIG without blocks is rejected before anything is published.
#[test]
fn empty_dir_config_is_rejected() {
    let (_root, work) = work_dir();
    fs::write(work.dir_config(), "# nothing yet\n").unwrap();
    let error = loader::load(&work).unwrap_err();
    assert_eq!(DirConfigResult::from_error(&error), DirConfigResult::Empty);
    assert!(!work.fsa_status().exists());
}

/// A missing DIR_CONFIG is an access error.
#[test]
fn missing_dir_config_is_an_access_error() {
    let (_root, work) = work_dir();
    fs::remove_file(work.dir_config()).unwrap();
    let error = loader::load(&work).unwrap_err();
    assert!(error.is_access_error());
    assert_eq!(DirConfigResult::from_error(&error), DirConfigResult::AccessError);
}
