//! HOST_CONFIG reloads while transfers are running.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use amg::{Amg, AmgOptions, ChannelSink};
use config::{HostConfigResult, HostEntry, write_host_config};
use daemon::{DbUpdate, Reloader, Reply};
use fd::{Fd, FdOptions};
use logging::RecordLogs;
use protocol::{AdapterRegistry, Scheme, ScriptedConnector};
use status::{Clock, ManualClock, SystemClock, WorkDir};

fn host_config(path: &Path, max_errors: i32) {
    let mut entry = HostEntry::new("h1");
    entry.real_hostname = ["h1".to_string(), String::new()];
    entry.allowed_transfers = 4;
    entry.max_errors = max_errors;
    write_host_config(path, &[entry]).unwrap();
}

#[test]
fn host_reload_during_transfers() {
    let root = tempfile::tempdir().unwrap();
    let work = WorkDir::new(root.path().join("work"));
    work.create_all().unwrap();
    let source = root.path().join("in");
    fs::create_dir_all(&source).unwrap();
    fs::write(
        work.dir_config(),
        format!(
            "[directory] {} in\n   [files]\n   *\n\n      [destination]\n         [recipient]\n         ftp://user:pw@h1/out\n",
            source.display()
        ),
    )
    .unwrap();
    host_config(&work.host_config(), 10);
    let loaded = config::loader::load(&work).unwrap();
    config::loader::publish(&work, &loaded).unwrap();

    let clock = Arc::new(ManualClock::new(SystemClock.unix_time()));
    let connector = ScriptedConnector::new();
    connector.set_send_delay(Duration::from_millis(300));
    let mut registry = AdapterRegistry::with_local_adapters();
    registry.register(Scheme::Ftp, Arc::new(connector.clone()));
    let (sender, messages) = crossbeam_channel::unbounded();
    let compiled = Arc::new(loaded.compiled);
    let mut amg = Amg::new(
        work.clone(),
        Arc::clone(&compiled),
        clock.clone(),
        Arc::new(ChannelSink::new(sender)),
        RecordLogs::disabled(),
        registry.clone(),
        AmgOptions::default(),
    )
    .unwrap();
    let mut fd = Fd::new(
        work.clone(),
        compiled,
        Arc::new(loaded.rename_rules),
        clock.clone(),
        RecordLogs::disabled(),
        registry,
        FdOptions::default(),
    )
    .unwrap();

    for index in 0..4 {
        fs::write(source.join(format!("f{index}")), b"payload").unwrap();
        amg.scan_now("in").unwrap();
    }
    for message in messages.try_iter() {
        fd.enqueue(message).unwrap();
    }
    assert_eq!(fd.queue().len(), 4);
    assert_eq!(fd.tick().unwrap().started, 4);
    assert_eq!(fd.hosts().get_by_alias("h1").unwrap().active_transfers, 4);

    host_config(&work.host_config(), 5);
    let (control, installs) = crossbeam_channel::unbounded();
    let mut reloader = Reloader::new(work.clone());
    reloader.connect_fd(control);
    let reply = reloader.apply(DbUpdate::RereadHostConfig(0));
    assert_eq!(reply.to_bytes().len(), 8);
    let Reply::Host(reply) = reply else {
        panic!("host command answered with {reply:?}");
    };
    assert_eq!(reply.result, HostConfigResult::DataChanged);
    assert_eq!(reply.warnings, 0);

    for install in installs.try_iter() {
        assert!(fd.handle(install).unwrap());
    }
    let host = fd.hosts().get_by_alias("h1").unwrap();
    assert_eq!(host.max_errors, 5);
    assert_eq!(host.active_transfers, 4);

    fd.settle(Duration::from_secs(10)).unwrap();
    assert_eq!(connector.deliveries().len(), 4);
    let host = fd.hosts().get_by_alias("h1").unwrap();
    assert_eq!(host.active_transfers, 0);
    assert_eq!(host.file_counter_done, 4);
    assert_eq!(host.error_counter, 0);
}

#[test]
fn unchanged_files_are_not_reloaded() {
    let root = tempfile::tempdir().unwrap();
    let work = WorkDir::new(root.path());
    work.create_all().unwrap();
    let source = root.path().join("in");
    fs::create_dir_all(&source).unwrap();
    fs::write(
        work.dir_config(),
        format!(
            "[directory] {} in\n   [files]\n   *\n\n      [destination]\n         [recipient]\n         ftp://h2/out\n",
            source.display()
        ),
    )
    .unwrap();
    let loaded = config::loader::load(&work).unwrap();
    config::loader::publish(&work, &loaded).unwrap();

    let mut reloader = Reloader::new(work.clone());
    assert!(reloader.check_files().is_none());

    let Reply::Dir(reply) = reloader.apply(DbUpdate::RereadDirConfig(0)) else {
        panic!("directory command answered with a host reply");
    };
    assert_eq!(reply.result, config::DirConfigResult::NoChange);
    assert_eq!(reply.jobs_removed, 0);
    assert_eq!(
        Reply::Dir(reply).to_bytes().len(),
        config::DirReloadReply::LEN
    );
}
