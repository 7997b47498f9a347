//! Integration tests for adapter dispatch and session reuse.

use std::sync::Arc;

use protocol::{
    AdapterRegistry, ErrorCode, ErrorKind, LockScheme, Progress, Scheme, ScriptedConnector,
    SendRequest, SessionOptions, Target,
};

#[derive(Default)]
struct Recorded {
    started: Vec<(String, u64)>,
    bytes: u64,
    finished: usize,
}

impl Progress for Recorded {
    fn file_started(&mut self, name: &str, size: u64) {
        self.started.push((name.to_string(), size));
    }

    fn transferred(&mut self, bytes: u64) {
        self.bytes += bytes;
    }

    fn file_finished(&mut self) {
        self.finished += 1;
    }
}

fn ftp_target(host: &str, dir: &str) -> Target {
    let mut target = Target::local(dir);
    target.scheme = Scheme::Ftp;
    target.user = "afd".into();
    target.host = host.into();
    target
}

// ============================================================================
// Dispatch
// ============================================================================

/// Verifies a registered connector serves its scheme and errors map to codes.
#[test]
fn registered_connector_handles_its_scheme() {
    let scripted = ScriptedConnector::new();
    scripted.refuse("down", 1);
    let mut registry = AdapterRegistry::with_local_adapters();
    registry.register(Scheme::Ftp, Arc::new(scripted.clone()));

    let error = registry
        .connect(&ftp_target("down", "/in"), &SessionOptions::default(), false)
        .err()
        .unwrap();
    assert_eq!(error.code(), ErrorCode::ConnectionRefusedError);
    assert_eq!(error.kind(), ErrorKind::TransientTransport);

    assert!(
        registry
            .connect(&ftp_target("down", "/in"), &SessionOptions::default(), false)
            .is_ok()
    );
    assert_eq!(scripted.connections(), ["down"]);
}

// ============================================================================
// Session reuse
// ============================================================================

/// Verifies one session delivers to several directories in order.
#[test]
fn session_changes_target_without_reconnecting() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("f");
    std::fs::write(&file, vec![0_u8; 300]).unwrap();

    let scripted = ScriptedConnector::new();
    let mut registry = AdapterRegistry::empty();
    registry.register(Scheme::Ftp, Arc::new(scripted.clone()));

    let first = ftp_target("h3", "/a");
    let second = ftp_target("h3", "/b");
    assert_eq!(first.connection_key(), second.connection_key());

    let mut progress = Recorded::default();
    let mut session = registry
        .connect(&first, &SessionOptions::default(), false)
        .unwrap();
    let request = SendRequest {
        local_path: &file,
        remote_name: "one",
        resume_offset: 0,
        lock: &LockScheme::Dot,
        mode: None,
    };
    session.send_file(&request, &mut progress).unwrap();
    session.change_target(&second).unwrap();
    session
        .send_file(
            &SendRequest {
                remote_name: "two",
                ..request
            },
            &mut progress,
        )
        .unwrap();
    session.disconnect().unwrap();

    let deliveries = scripted.deliveries();
    assert_eq!(scripted.connections().len(), 1);
    assert_eq!(
        deliveries.iter().map(|d| (d.dir.as_str(), d.name.as_str())).collect::<Vec<_>>(),
        [("/a", "one"), ("/b", "two")]
    );
    assert_eq!(progress.bytes, 600);
    assert_eq!(progress.finished, 2);
    assert_eq!(progress.started[0], ("one".to_string(), 300));
}

/// Verifies simulate mode reports success without contacting the remote.
#[test]
fn simulate_mode_bypasses_the_connector() {
    let temp = tempfile::tempdir().unwrap();
    let file = temp.path().join("f");
    std::fs::write(&file, b"abcd").unwrap();

    let scripted = ScriptedConnector::new();
    scripted.refuse("h", 10);
    let mut registry = AdapterRegistry::empty();
    registry.register(Scheme::Ftp, Arc::new(scripted.clone()));

    let mut session = registry
        .connect(&ftp_target("h", "/x"), &SessionOptions::default(), true)
        .unwrap();
    let sent = session
        .send_file(
            &SendRequest {
                local_path: &file,
                remote_name: "f",
                resume_offset: 0,
                lock: &LockScheme::Off,
                mode: None,
            },
            &mut Recorded::default(),
        )
        .unwrap();
    assert_eq!(sent, 4);
    assert!(scripted.connections().is_empty());
}
