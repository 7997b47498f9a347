//! Scanning, queueing and delivering end to end.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use amg::{Amg, AmgOptions, ChannelSink, JobMessage, Pool};
use crossbeam_channel::Receiver;
use fd::{DeleteCommand, Fd, FdCommand, FdOptions};
use logging::{DeleteReason, LogRecord, MemorySink, OutputType, RecordKind, RecordLogs};
use protocol::{AdapterRegistry, Scheme, ScriptedConnector};
use status::{Clock, HostStatus, LockSlot, ManualClock, SystemClock, WorkDir, special_flag};

const SETTLE: Duration = Duration::from_secs(10);

struct Fixture {
    root: tempfile::TempDir,
    work: WorkDir,
    amg: Amg,
    fd: Fd,
    messages: Receiver<JobMessage>,
    memory: Arc<MemorySink>,
    clock: Arc<ManualClock>,
    connector: ScriptedConnector,
}

/// Directory `in` under `<root>/in` feeding `recipient` with `options`.
fn fixture(recipient: impl FnOnce(&Path) -> String, options: &[&str]) -> Fixture {
    fixture_with(|root| {
        let mut text = format!(
            "[directory] {} in\n   [files]\n   *.dat\n\n      [destination]\n         [recipient]\n         {}\n",
            root.join("in").display(),
            recipient(root)
        );
        if !options.is_empty() {
            text.push_str("\n         [options]\n");
            for option in options {
                text.push_str(&format!("         {option}\n"));
            }
        }
        text
    })
}

/// Like [`fixture`] with the DIR_CONFIG written by `dir_config`.
fn fixture_with(dir_config: impl FnOnce(&Path) -> String) -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let work = WorkDir::new(root.path().join("work"));
    work.create_all().unwrap();
    fs::create_dir_all(root.path().join("in")).unwrap();
    fs::create_dir_all(root.path().join("out")).unwrap();
    fs::write(work.dir_config(), dir_config(root.path())).unwrap();
    let loaded = config::loader::load(&work).unwrap();
    config::loader::publish(&work, &loaded).unwrap();

    let clock = Arc::new(ManualClock::new(SystemClock.unix_time()));
    let (sender, messages) = crossbeam_channel::unbounded();
    let (logs, memory) = RecordLogs::memory();
    let connector = ScriptedConnector::new();
    let mut registry = AdapterRegistry::with_local_adapters();
    registry.register(Scheme::Ftp, Arc::new(connector.clone()));
    let compiled = Arc::new(loaded.compiled);
    let amg = Amg::new(
        work.clone(),
        compiled.clone(),
        clock.clone(),
        Arc::new(ChannelSink::new(sender)),
        logs.clone(),
        registry.clone(),
        AmgOptions::default(),
    )
    .unwrap();
    let fd = Fd::new(
        work.clone(),
        compiled,
        Arc::new(loaded.rename_rules),
        clock.clone(),
        logs,
        registry,
        FdOptions::default(),
    )
    .unwrap();
    Fixture {
        root,
        work,
        amg,
        fd,
        messages,
        memory,
        clock,
        connector,
    }
}

fn local(root: &Path) -> String {
    format!("file://h1{}/out", root.display())
}

fn remote(host: &'static str) -> impl FnOnce(&Path) -> String {
    move |_| format!("ftp://user:pw@{host}/out")
}

impl Fixture {
    /// Writes `name` and scans it into one queued message.
    fn arrive(&mut self, name: &str, len: usize) {
        fs::write(self.root.path().join("in").join(name), vec![b'x'; len]).unwrap();
        self.amg.scan_now("in").unwrap();
        for message in self.messages.try_iter().collect::<Vec<_>>() {
            self.fd.enqueue(message).unwrap();
        }
    }

    fn out(&self) -> PathBuf {
        self.root.path().join("out")
    }

    fn host(&self, alias: &str) -> HostStatus {
        self.fd.hosts().get_by_alias(alias).unwrap()
    }

    fn set_host(&self, alias: &str, f: impl FnOnce(&mut HostStatus)) {
        self.fd.hosts().update_by_alias(alias, LockSlot::WHOLE, f).unwrap();
    }

    fn outputs(&self) -> Vec<(OutputType, String)> {
        self.memory
            .of_kind(RecordKind::Output)
            .into_iter()
            .filter_map(|record| match record {
                LogRecord::Output(output) => Some((output.output_type, output.file_name)),
                _ => None,
            })
            .collect()
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

    fn pool_is_empty(&self) -> bool {
        Pool::new(self.work.pool_dir()).batches().unwrap().is_empty()
    }
}

/// A scanned file reaches its local target and every counter settles.
#[test]
fn local_file_is_delivered() {
    let mut fixture = fixture(local, &[]);
    fixture.arrive("a.dat", 100);
    assert_eq!(fixture.fd.queue().len(), 1);
    let queued = fixture.host("h1");
    assert_eq!(queued.jobs_queued, 1);
    assert_eq!(queued.total_file_counter, 1);
    assert_eq!(queued.total_file_size, 100);

    let report = fixture.fd.settle(SETTLE).unwrap();
    assert_eq!(report.started, 1);
    assert_eq!(report.delivered, 1);
    assert_eq!(fs::read(fixture.out().join("a.dat")).unwrap().len(), 100);

    let host = fixture.host("h1");
    assert_eq!(host.file_counter_done, 1);
    assert_eq!(host.bytes_send, 100);
    assert_eq!(host.total_file_counter, 0);
    assert_eq!(host.total_file_size, 0);
    assert_eq!(host.jobs_queued, 0);
    assert_eq!(host.active_transfers, 0);
    assert_eq!(host.error_counter, 0);
    assert!(host.last_connection > 0);
    assert!(host.job_status.iter().all(|slot| slot.pid == 0));
    assert!(fixture.fd.queue().is_empty());
    assert_eq!(fixture.fd.workers(), 0);
    assert!(fixture.pool_is_empty());
    assert_eq!(fixture.outputs(), vec![(OutputType::NormalDelivered, "a.dat".to_string())]);
}

#[test]
fn renamed_files_leave_a_production_record() {
    let mut fixture = fixture(local, &["toupper"]);
    fixture.arrive("b.dat", 10);
    fixture.fd.settle(SETTLE).unwrap();
    assert!(fixture.out().join("B.DAT").exists());
    let productions: Vec<_> = fixture
        .memory
        .of_kind(RecordKind::Production)
        .into_iter()
        .filter_map(|record| match record {
            LogRecord::Production(production) => Some((production.original_name, production.new_name, production.command)),
            _ => None,
        })
        .collect();
    assert_eq!(
        productions,
        vec![("b.dat".to_string(), "B.DAT".to_string(), "toupper".to_string())]
    );
}

/// A refused host is retried once `retry_interval` passed and then works.
#[test]
fn refused_connections_are_retried() {
    let mut fixture = fixture(remote("down"), &[]);
    fixture.connector.refuse("down", 3);
    fixture.set_host("down", |host| host.retry_interval = 60);
    fixture.arrive("a.dat", 10);

    for attempt in 1..=3 {
        let report = fixture.fd.settle(SETTLE).unwrap();
        assert_eq!(report.failed, 1, "attempt {attempt}");
        let host = fixture.host("down");
        assert_eq!(host.error_counter, attempt);

        // Nothing happens before the interval passed.
        assert_eq!(fixture.fd.settle(SETTLE).unwrap().started, 0);
        fixture.clock.advance(Duration::from_secs(60));
    }

    let report = fixture.fd.settle(SETTLE).unwrap();
    assert_eq!(report.delivered, 1);
    let host = fixture.host("down");
    assert_eq!(host.error_counter, 0);
    assert_eq!(host.total_errors, 3);
    assert_eq!(host.file_counter_done, 1);
    assert_eq!(fixture.connector.deliveries().len(), 1);
    assert!(fixture.fd.queue().is_empty());
}

/// Reaching `max_errors` switches to the second real host name.
#[test]
fn max_errors_toggle_to_the_other_host() {
    let mut fixture = fixture(remote("h2"), &[]);
    fixture.set_host("h2", |host| {
        host.real_hostname = ["down".into(), "up".into()];
        host.auto_toggle = true;
        host.max_errors = 3;
        host.retry_interval = 10;
    });
    fixture.connector.refuse("down", 3);
    fixture.arrive("x.dat", 1024);

    for _ in 0..2 {
        let report = fixture.fd.settle(SETTLE).unwrap();
        assert_eq!((report.failed, report.delivered), (1, 0));
        fixture.clock.advance(Duration::from_secs(10));
    }
    // The third refusal toggles and the retry on "up" goes out at once.
    let report = fixture.fd.settle(SETTLE).unwrap();
    assert_eq!((report.failed, report.delivered), (1, 1));
    assert_eq!(fixture.fd.settle(SETTLE).unwrap().delivered, 0);

    let host = fixture.host("h2");
    assert_eq!(host.host_toggle, status::HOST_TWO);
    assert_eq!(host.error_counter, 0);
    assert_eq!(host.total_errors, 3);
    assert_eq!(
        host.error_history,
        [protocol::ErrorCode::ConnectionRefusedError.code(), 0, 0, 0, 0]
    );
    assert_eq!(fixture.connector.connections(), vec!["up".to_string()]);
    assert_eq!(fixture.connector.deliveries()[0].bytes, 1024);
}

/// Messages older than their age limit are deleted instead of sent.
#[test]
fn aged_messages_are_deleted() {
    let mut fixture = fixture(remote("slow"), &["age-limit 60"]);
    fixture.arrive("old.dat", 10);
    fixture.clock.advance(Duration::from_secs(120));

    let report = fixture.fd.settle(SETTLE).unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.started, 0);
    assert!(fixture.connector.deliveries().is_empty());
    assert_eq!(fixture.delete_reasons(), vec![DeleteReason::AgeOutput]);
    assert_eq!(fixture.outputs(), vec![(OutputType::AgeLimitDelete, "old.dat".to_string())]);
    assert!(fixture.pool_is_empty());
    let host = fixture.host("slow");
    assert_eq!(host.jobs_queued, 0);
    assert_eq!(host.total_file_counter, 0);
}

/// With one slot the second message rides the first connection.
#[test]
fn one_slot_bursts_in_queue_order() {
    let mut fixture = fixture(remote("busy"), &[]);
    fixture.set_host("busy", |host| host.allowed_transfers = 1);
    fixture.arrive("first.dat", 10);
    fixture.arrive("second.dat", 10);
    assert_eq!(fixture.fd.queue().len(), 2);

    let report = fixture.fd.settle(SETTLE).unwrap();
    assert_eq!(report.started, 1);
    assert_eq!(report.bursts, 1);
    assert_eq!(report.delivered, 2);
    assert_eq!(fixture.connector.connections(), vec!["busy".to_string()]);
    let names: Vec<String> = fixture
        .connector
        .deliveries()
        .into_iter()
        .map(|delivery| delivery.name)
        .collect();
    assert_eq!(names, ["first.dat", "second.dat"]);
    let host = fixture.host("busy");
    assert_eq!(host.burst2_counter, 1);
    assert_eq!(host.connections, 1);
}

/// A `delete` job behind a normal one on the same connection is
/// removed, not sent along in the burst.
#[test]
fn burst_skips_messages_of_delete_jobs() {
    let mut fixture = fixture_with(|root| {
        format!(
            "[directory] {} in\n\
             [files]\na*.dat\n[destination]\n[recipient]\nftp://user:pw@busy/out\n\n\
             [files]\nb*.dat\n[destination]\n[recipient]\nftp://user:pw@busy/out\n[options]\ndelete\n",
            root.join("in").display()
        )
    });
    fixture.set_host("busy", |host| host.allowed_transfers = 1);
    fixture.arrive("a1.dat", 10);
    fixture.arrive("b1.dat", 10);
    fixture.arrive("a2.dat", 10);
    assert_eq!(fixture.fd.queue().len(), 3);

    let report = fixture.fd.settle(SETTLE).unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.deleted, 1);
    let names: Vec<String> = fixture
        .connector
        .deliveries()
        .into_iter()
        .map(|delivery| delivery.name)
        .collect();
    assert_eq!(names, ["a1.dat", "a2.dat"]);
    assert_eq!(fixture.delete_reasons(), vec![DeleteReason::UserDel]);
    assert!(fixture.fd.queue().is_empty());
}

/// Keep-alive leaves the worker idle until the time runs out.
#[test]
fn keep_connected_holds_the_session() {
    let mut fixture = fixture(remote("steady"), &[]);
    fixture.set_host("steady", |host| host.keep_connected = 30);
    fixture.arrive("a.dat", 10);
    fixture.fd.settle(SETTLE).unwrap();
    assert_eq!(fixture.fd.workers(), 1);
    let host = fixture.host("steady");
    assert_eq!(host.active_transfers, 1);
    assert_ne!(host.special_flag & special_flag::KEEP_CON_IDLE, 0);

    fixture.arrive("b.dat", 10);
    let report = fixture.fd.settle(SETTLE).unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(fixture.connector.connections().len(), 1);

    fixture.clock.advance(Duration::from_secs(31));
    fixture.fd.settle(SETTLE).unwrap();
    assert_eq!(fixture.fd.workers(), 0);
    assert_eq!(fixture.host("steady").active_transfers, 0);
    assert_eq!(fixture.connector.disconnects(), 1);
}

/// Operator deletes remove the batch and log every file.
#[test]
fn deleting_all_jobs_of_a_host() {
    let mut fixture = fixture(remote("gone"), &[]);
    fixture.connector.refuse("gone", 100);
    fixture.set_host("gone", |host| host.retry_interval = 3600);
    fixture.arrive("a.dat", 10);
    fixture.arrive("b.dat", 10);
    fixture.fd.settle(SETTLE).unwrap();

    let deleted = fixture
        .fd
        .delete(&DeleteCommand::AllJobsFromHost("gone".into()))
        .unwrap();
    assert_eq!(deleted, 2);
    assert!(fixture.fd.queue().is_empty());
    assert!(fixture.pool_is_empty());
    assert_eq!(fixture.delete_reasons(), vec![DeleteReason::UserDel; 2]);
    assert_eq!(fixture.host("gone").jobs_queued, 0);
}

/// A retry request bypasses the retry interval.
#[test]
fn retry_command_skips_the_wait() {
    let mut fixture = fixture(remote("flaky"), &[]);
    fixture.connector.refuse("flaky", 1);
    fixture.set_host("flaky", |host| host.retry_interval = 3600);
    fixture.arrive("a.dat", 10);
    assert_eq!(fixture.fd.settle(SETTLE).unwrap().failed, 1);
    assert_eq!(fixture.fd.settle(SETTLE).unwrap().started, 0);

    let position = fixture.fd.hosts().position("flaky").unwrap();
    fixture
        .fd
        .command(FdCommand::Retry(i32::try_from(position).unwrap()))
        .unwrap();
    assert_eq!(fixture.fd.settle(SETTLE).unwrap().delivered, 1);
    assert_eq!(fixture.host("flaky").special_flag & special_flag::RETRY_REQUESTED, 0);
}

/// The queue written on shutdown is picked up by the next distributor.
#[test]
fn queue_survives_a_restart() {
    let mut fixture = fixture(remote("later"), &[]);
    fixture.arrive("a.dat", 10);
    assert_eq!(fixture.fd.shutdown().unwrap(), 0);

    let loaded = config::loader::load(&fixture.work).unwrap();
    let (logs, _memory) = RecordLogs::memory();
    let mut registry = AdapterRegistry::with_local_adapters();
    registry.register(Scheme::Ftp, Arc::new(fixture.connector.clone()));
    let mut again = Fd::new(
        fixture.work.clone(),
        Arc::new(loaded.compiled),
        Arc::new(loaded.rename_rules),
        fixture.clock.clone(),
        logs,
        registry,
        FdOptions::default(),
    )
    .unwrap();
    assert_eq!(again.queue().len(), 1);
    assert_eq!(again.hosts().get_by_alias("later").unwrap().jobs_queued, 1);
    assert_eq!(again.settle(SETTLE).unwrap().delivered, 1);
}
