//! A supervisor serving a work directory through its fifos.

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use daemon::{DbUpdate, Liveness, Reply, Signals, Supervisor, SupervisorOptions};
use status::WorkDir;

fn wait_for(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    done()
}

#[test]
fn serves_fifos_until_shutdown() {
    let root = tempfile::tempdir().unwrap();
    let work = WorkDir::new(root.path().join("work"));
    work.create_all().unwrap();
    let source = root.path().join("in");
    let target = root.path().join("out");
    fs::create_dir_all(&source).unwrap();
    fs::create_dir_all(&target).unwrap();
    fs::write(
        work.dir_config(),
        format!(
            "[directory] {} in\n   [files]\n   *.dat\n\n      [destination]\n         [recipient]\n         file://local{}\n",
            source.display(),
            target.display()
        ),
    )
    .unwrap();

    let options = SupervisorOptions {
        tick_interval: Duration::from_millis(100),
        dir_check_interval: Duration::ZERO,
        ..SupervisorOptions::default()
    };
    let supervisor = Supervisor::start(work.clone(), options, Signals::detached()).unwrap();
    let running = thread::spawn(move || supervisor.run());

    assert!(wait_for(Duration::from_secs(5), || {
        daemon::probe(&work, Duration::from_millis(200)).unwrap() == Liveness::Active
    }));

    fs::write(source.join("a.dat"), b"hello").unwrap();
    assert!(wait_for(Duration::from_secs(10), || target.join("a.dat").exists()));
    assert_eq!(fs::read(target.join("a.dat")).unwrap(), b"hello");

    let reply = daemon::db_update::request(&work, DbUpdate::RereadHostConfig(0), Duration::from_secs(5)).unwrap();
    assert!(matches!(reply, Reply::Host(host) if host.warnings == 0));

    daemon::request_shutdown(&work, Duration::from_secs(60)).unwrap();
    running.join().unwrap().unwrap();
    assert_eq!(daemon::probe(&work, Duration::from_millis(50)).unwrap(), Liveness::NotActive);
    let status = daemon::lifecycle::read_afd_status(&work).unwrap().unwrap();
    assert_eq!(status.afd_pid, 0);
    assert!(status.heartbeat > 0);
}

#[test]
fn disabled_marker_wins_over_a_missing_dir_config() {
    let root = tempfile::tempdir().unwrap();
    let work = WorkDir::new(root.path().join("work"));
    work.create_all().unwrap();
    fs::write(work.disabled_marker(), b"").unwrap();
    assert!(!work.dir_config().exists());

    let error = Supervisor::start(work, SupervisorOptions::default(), Signals::detached()).unwrap_err();
    assert!(matches!(error, daemon::DaemonError::Disabled { .. }));
}
