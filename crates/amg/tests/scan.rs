//! Scanning published directories into pool batches and job messages.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use amg::{Amg, AmgOptions, ChannelSink, JobMessage, Pool, SCAN_ERROR_THRESHOLD, msg_flag};
use crossbeam_channel::Receiver;
use logging::{DeleteReason, LogRecord, MemorySink, RecordKind, RecordLogs};
use protocol::AdapterRegistry;
use status::{
    Access, AfdStatus, Clock, DirStatus, ManualClock, ScanState, StatusArray, SystemClock,
    WorkDir, amg_jobs, dir_flag,
};

struct Fixture {
    root: tempfile::TempDir,
    work: WorkDir,
    amg: Amg,
    messages: Receiver<JobMessage>,
    memory: Arc<MemorySink>,
    clock: Arc<ManualClock>,
}

/// One block per `(location, alias, dir options, recipients)`.
fn dir_config(blocks: &[(&str, &str, &[&str], &[String])]) -> String {
    let mut text = String::new();
    for (location, alias, options, recipients) in blocks {
        text.push_str(&format!("[directory] {location} {alias}\n   [dir options]\n"));
        for option in *options {
            text.push_str(&format!("   {option}\n"));
        }
        text.push_str("\n   [files]\n   *.dat\n\n      [destination]\n         [recipient]\n");
        for recipient in *recipients {
            text.push_str(&format!("         {recipient}\n"));
        }
        text.push('\n');
    }
    text
}

fn fixture_with(
    setup: impl FnOnce(&Path) -> String,
    before_start: impl FnOnce(&WorkDir),
) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let work = WorkDir::new(root.path().join("work"));
    work.create_all().unwrap();
    let text = setup(root.path());
    fs::write(work.dir_config(), text).unwrap();
    let loaded = config::loader::load(&work).unwrap();
    config::loader::publish(&work, &loaded).unwrap();
    before_start(&work);

    let clock = Arc::new(ManualClock::new(SystemClock.unix_time()));
    let (sender, messages) = crossbeam_channel::unbounded();
    let (logs, memory) = RecordLogs::memory();
    let amg = Amg::new(
        work.clone(),
        Arc::new(loaded.compiled),
        clock.clone(),
        Arc::new(ChannelSink::new(sender)),
        logs,
        AdapterRegistry::with_local_adapters(),
        AmgOptions::default(),
    )
    .unwrap();
    Fixture {
        root,
        work,
        amg,
        messages,
        memory,
        clock,
    }
}

/// A local directory `in` under `<root>/in`.
fn local_fixture(options: &[&str], recipients: usize) -> Fixture {
    fixture_with(
        |root| {
            let source = root.join("in");
            fs::create_dir_all(&source).unwrap();
            let recipients: Vec<String> = (0..recipients)
                .map(|index| format!("file://h{index}{}/out{index}", root.display()))
                .collect();
            dir_config(&[(source.to_str().unwrap(), "in", options, &recipients)])
        },
        |_| {},
    )
}

impl Fixture {
    fn source(&self) -> PathBuf {
        self.root.path().join("in")
    }

    fn write(&self, name: &str, len: usize) {
        fs::write(self.source().join(name), vec![b'x'; len]).unwrap();
    }

    fn drain(&self) -> Vec<JobMessage> {
        self.messages.try_iter().collect()
    }

    fn dir(&self, alias: &str) -> DirStatus {
        StatusArray::<DirStatus>::open(&self.work.fra_status(), Access::ReadOnly)
            .unwrap()
            .get_by_alias(alias)
            .unwrap()
    }

    fn pool(&self) -> Pool {
        Pool::new(self.work.pool_dir())
    }

    fn delete_reasons(&self) -> Vec<DeleteReason> {
        self.memory
            .of_kind(RecordKind::Delete)
            .into_iter()
            .filter_map(|record| match record {
                LogRecord::Delete(delete) => Some(delete.reason),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Local directories
// ============================================================================

/// Every job fed by a directory gets its own batch of the same file.
#[test]
fn local_scan_emits_one_message_per_job() {
    let mut fixture = local_fixture(&[], 2);
    fixture.write("x.dat", 1024);
    fixture.write("notes.txt", 10);

    let report = fixture.amg.scan_now("in").unwrap();
    assert_eq!(report.files_taken, 1);
    assert_eq!(report.messages, 2);

    let messages = fixture.drain();
    assert_eq!(messages.len(), 2);
    assert_ne!(messages[0].job_id(), messages[1].job_id());
    for message in &messages {
        assert_eq!(message.files, 1);
        assert_eq!(message.file_size, 1024);
        assert_eq!(message.flag & msg_flag::FROM_RETRIEVE, 0);
        let files = fixture.pool().files(&message.name).unwrap();
        assert_eq!(files[0].name, "x.dat");
    }
    assert_eq!(messages[0].name.unique_number, messages[1].name.unique_number);
    assert!(!fixture.source().join("x.dat").exists());
    assert!(fixture.source().join("notes.txt").exists(), "unmatched files stay");

    let dir = fixture.dir("in");
    assert_eq!(dir.files_received, 1);
    assert_eq!(dir.bytes_received, 1024);
    assert_eq!(dir.files_queued, 2);
    assert!(dir.has_flag(dir_flag::FILES_IN_QUEUE));
    assert_eq!(dir.dir_status, ScanState::Idle);
    assert_eq!(dir.error_counter, 0);

    assert_eq!(fixture.memory.of_kind(RecordKind::Input).len(), 1);
    let distribution = fixture.memory.of_kind(RecordKind::Distribution);
    let LogRecord::Distribution(record) = &distribution[0] else {
        panic!("expected a distribution record");
    };
    assert_eq!(record.job_ids.len(), 2);
}

/// A second `y.dat` within the dupcheck timeout is deleted as `DUP_INPUT`.
#[test]
fn duplicate_names_are_deleted() {
    // DC_FILENAME_ONLY | DC_DELETE
    let mut fixture = local_fixture(&["dupcheck 3600 16777217"], 1);
    fixture.write("y.dat", 10);
    fixture.amg.scan_now("in").unwrap();
    assert_eq!(fixture.drain().len(), 1);

    fixture.clock.advance(Duration::from_secs(10));
    fixture.write("y.dat", 20);
    let report = fixture.amg.scan_now("in").unwrap();
    assert_eq!(report.messages, 0);
    assert_eq!(report.files_deleted, 1);
    assert!(fixture.drain().is_empty());
    assert!(!fixture.source().join("y.dat").exists());
    assert_eq!(fixture.delete_reasons(), vec![DeleteReason::DupInput]);
    let hosts: Vec<String> = fixture
        .memory
        .of_kind(RecordKind::Delete)
        .into_iter()
        .filter_map(|record| match record {
            LogRecord::Delete(delete) => Some(delete.host_name),
            _ => None,
        })
        .collect();
    assert_eq!(hosts, [logging::NO_HOST]);
}

/// Once the timeout has passed the same name is new again.
#[test]
fn dupcheck_forgets_after_its_timeout() {
    let mut fixture = local_fixture(&["dupcheck 60 16777217"], 1);
    fixture.write("y.dat", 10);
    fixture.amg.scan_now("in").unwrap();

    fixture.clock.advance(Duration::from_secs(61));
    fixture.write("y.dat", 10);
    fixture.amg.tick().unwrap();
    assert_eq!(fixture.drain().len(), 2);
    assert!(fixture.delete_reasons().is_empty());
}

/// Files left behind by `max copied files` are not remembered as seen.
#[test]
fn dupcheck_skips_files_left_for_the_next_scan() {
    let mut fixture = local_fixture(&["dupcheck 3600 16777217", "max copied files 1"], 1);
    fixture.write("a.dat", 5);
    fixture.write("b.dat", 5);

    assert_eq!(fixture.amg.scan_now("in").unwrap().files_taken, 1);
    let second = fixture.amg.scan_now("in").unwrap();
    assert_eq!(second.files_taken, 1);
    assert_eq!(second.files_deleted, 0);
    let files: u32 = fixture.drain().iter().map(|message| message.files).sum();
    assert_eq!(files, 2);
    assert!(fixture.delete_reasons().is_empty());
}

/// Held files are not duplicates of themselves once the batch is released.
#[test]
fn dupcheck_with_accumulate_releases_held_files() {
    let mut fixture = local_fixture(&["dupcheck 3600 16777217", "accumulate 2"], 1);
    fixture.write("a.dat", 5);
    assert!(fixture.amg.scan_now("in").unwrap().accumulating);

    fixture.write("b.dat", 5);
    let report = fixture.amg.scan_now("in").unwrap();
    assert_eq!(report.files_taken, 2);
    assert_eq!(report.files_deleted, 0);
    let messages = fixture.drain();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].files, 2);
    assert!(fixture.delete_reasons().is_empty());

    // Once dispatched the name is remembered.
    fixture.write("a.dat", 5);
    assert_eq!(fixture.amg.scan_now("in").unwrap().files_deleted, 1);
}

/// `max copied files` splits a full directory over several scans.
#[test]
fn copy_limit_leaves_the_rest_for_the_next_scan() {
    let mut fixture = local_fixture(&["max copied files 2"], 1);
    for name in ["a.dat", "b.dat", "c.dat"] {
        fixture.write(name, 5);
    }

    let first = fixture.amg.scan_now("in").unwrap();
    assert_eq!(first.files_taken, 2);
    assert!(first.max_copied);
    let dir = fixture.dir("in");
    assert!(dir.has_flag(dir_flag::MAX_COPIED));
    assert_eq!(dir.next_check_time, fixture.clock.unix_time());

    let second = fixture.amg.scan_now("in").unwrap();
    assert_eq!(second.files_taken, 1);
    assert!(!fixture.dir("in").has_flag(dir_flag::MAX_COPIED));
    let files: u32 = fixture.drain().iter().map(|message| message.files).sum();
    assert_eq!(files, 3);
}

// ============================================================================
// Accumulate
// ============================================================================

/// Files wait until the count threshold is met, then leave as one batch.
#[test]
fn accumulate_count_holds_then_releases() {
    let mut fixture = local_fixture(&["accumulate 3"], 1);
    fixture.write("a.dat", 1);
    fixture.write("b.dat", 1);

    let held = fixture.amg.scan_now("in").unwrap();
    assert!(held.accumulating);
    assert!(fixture.drain().is_empty());
    assert!(fixture.dir("in").has_flag(dir_flag::ACCUMULATE_PENDING));
    assert!(fixture.source().join("a.dat").exists());

    fixture.write("c.dat", 1);
    fixture.amg.scan_now("in").unwrap();
    let messages = fixture.drain();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].files, 3);
    assert!(!fixture.dir("in").has_flag(dir_flag::ACCUMULATE_PENDING));
}

/// Reaching `accumulate size` releases the batch before the count is met.
#[test]
fn accumulate_size_releases_early() {
    let mut fixture = local_fixture(&["accumulate 10", "accumulate size 100"], 1);
    fixture.write("small.dat", 40);
    assert!(fixture.amg.scan_now("in").unwrap().accumulating);

    fixture.write("big.dat", 70);
    let report = fixture.amg.scan_now("in").unwrap();
    assert!(!report.accumulating);
    assert_eq!(report.files_taken, 2);
    assert_eq!(fixture.drain()[0].file_size, 110);
}

// ============================================================================
// Pause and failures
// ============================================================================

/// While distribution is paused nothing is queued.
#[test]
fn paused_distribution_queues_nothing() {
    let mut fixture = fixture_with(
        |root| {
            let source = root.join("in");
            fs::create_dir_all(&source).unwrap();
            let recipient = format!("file://h0{}/out", root.display());
            dir_config(&[(source.to_str().unwrap(), "in", &[], &[recipient])])
        },
        |work| {
            let afd = AfdStatus {
                amg_jobs: amg_jobs::PAUSE_DISTRIBUTION,
                ..AfdStatus::default()
            };
            StatusArray::create(&work.afd_status(), &[afd]).unwrap();
        },
    );
    fixture.write("x.dat", 3);

    let report = fixture.amg.scan_now("in").unwrap();
    assert_eq!(report.messages, 0);
    assert!(fixture.drain().is_empty());
    assert!(fixture.source().join("x.dat").exists());
}

/// Three failed scans in a row flag the directory; a good one clears it.
#[test]
fn repeated_failures_set_dir_error() {
    let mut fixture = local_fixture(&[], 1);
    fs::remove_dir(fixture.source()).unwrap();

    for attempt in 1..=SCAN_ERROR_THRESHOLD {
        assert!(fixture.amg.scan_now("in").is_err());
        let dir = fixture.dir("in");
        assert_eq!(dir.error_counter, attempt);
        assert_eq!(dir.has_flag(dir_flag::DIR_ERROR_SET), attempt >= SCAN_ERROR_THRESHOLD);
        assert_eq!(dir.dir_status, ScanState::Idle);
    }

    fs::create_dir(fixture.source()).unwrap();
    fixture.amg.scan_now("in").unwrap();
    let dir = fixture.dir("in");
    assert_eq!(dir.error_counter, 0);
    assert!(!dir.has_flag(dir_flag::DIR_ERROR_SET));
}

/// Disabled directories are skipped without touching their files.
#[test]
fn disabled_directories_are_skipped() {
    let mut fixture = local_fixture(&[], 1);
    fixture.write("x.dat", 3);
    let dsa = StatusArray::<DirStatus>::open(&fixture.work.fra_status(), Access::ReadWrite).unwrap();
    dsa.update_by_alias("in", DirStatus::LOCK_QUEUE, |dir| {
        dir.dir_flag |= dir_flag::DIR_DISABLED;
    })
    .unwrap();

    assert!(fixture.amg.scan_now("in").unwrap().skipped);
    assert!(fixture.source().join("x.dat").exists());
}

// ============================================================================
// Ticks and remote directories
// ============================================================================

/// A tick scans every due directory in parallel.
#[test]
fn tick_scans_all_due_directories() {
    let mut fixture = fixture_with(
        |root| {
            let mut blocks = Vec::new();
            let mut owned = Vec::new();
            for alias in ["a", "b", "c"] {
                let source = root.join(alias);
                fs::create_dir_all(&source).unwrap();
                fs::write(source.join(format!("{alias}.dat")), b"data").unwrap();
                owned.push((
                    source.to_str().unwrap().to_string(),
                    alias,
                    vec![format!("file://h{alias}{}/out", root.display())],
                ));
            }
            for (location, alias, recipients) in &owned {
                blocks.push((location.as_str(), *alias, &[][..], recipients.as_slice()));
            }
            dir_config(&blocks)
        },
        |_| {},
    );

    let report = fixture.amg.tick().unwrap();
    assert_eq!(report.scanned, 3);
    assert_eq!(report.messages, 3);
    assert!(report.failures.is_empty());
    assert_eq!(fixture.drain().len(), 3);
}

/// Remote files are fetched, removed at the source and queued as retrieved.
#[test]
fn remote_directory_is_retrieved_then_queued() {
    let mut fixture = fixture_with(
        |root| {
            let remote = root.join("remote");
            fs::create_dir_all(&remote).unwrap();
            fs::write(remote.join("a.dat"), b"remote bytes").unwrap();
            fs::write(remote.join("skip.txt"), b"no").unwrap();
            let url = format!("file://src{}", remote.display());
            let recipient = format!("file://h0{}/out", root.display());
            dir_config(&[(url.as_str(), "rem", &[], &[recipient])])
        },
        |_| {},
    );

    let report = fixture.amg.scan_now("rem").unwrap();
    assert_eq!(report.retrieved, 1);
    assert_eq!(report.messages, 1);

    let message = fixture.drain().remove(0);
    assert_ne!(message.flag & msg_flag::FROM_RETRIEVE, 0);
    assert_eq!(message.file_size, 12);
    let remote = fixture.root.path().join("remote");
    assert!(!remote.join("a.dat").exists());
    assert!(remote.join("skip.txt").exists());
    assert!(!fixture.work.incoming_dir().join("rem").join("a.dat").exists());

    let dir = fixture.dir("rem");
    assert!(dir.next_check_time > fixture.clock.unix_time());
}

/// The retrieve list outlives the instance that wrote it.
#[test]
fn retrieved_files_are_not_fetched_after_a_restart() {
    let mut fixture = fixture_with(
        |root| {
            let remote = root.join("remote");
            fs::create_dir_all(&remote).unwrap();
            fs::write(remote.join("a.dat"), b"kept remote").unwrap();
            let url = format!("file://src{}", remote.display());
            let recipient = format!("file://h0{}/out", root.display());
            dir_config(&[(url.as_str(), "rem", &["do not remove"], &[recipient])])
        },
        |_| {},
    );
    assert_eq!(fixture.amg.scan_now("rem").unwrap().retrieved, 1);
    assert!(fixture.root.path().join("remote").join("a.dat").exists());
    assert!(fixture.work.retrieve_list("rem").exists());

    let loaded = config::loader::load(&fixture.work).unwrap();
    let (sender, messages) = crossbeam_channel::unbounded();
    let mut restarted = Amg::new(
        fixture.work.clone(),
        Arc::new(loaded.compiled),
        fixture.clock.clone(),
        Arc::new(ChannelSink::new(sender)),
        RecordLogs::disabled(),
        AdapterRegistry::with_local_adapters(),
        AmgOptions::default(),
    )
    .unwrap();
    let report = restarted.scan_now("rem").unwrap();
    assert_eq!(report.retrieved, 0);
    assert!(messages.try_iter().next().is_none());
}
