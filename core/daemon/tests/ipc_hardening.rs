use chrono::Utc;
use hallmonitor_daemon_protocol::{
    EventEnvelope, EventType, Method, Request, Response, PROTOCOL_VERSION,
};
use std::fs;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_daemon(home: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_hallmonitor-daemon"))
        .env("HOME", home)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn hallmonitor-daemon")
}

fn socket_path(home: &Path) -> PathBuf {
    home.join(".hallmonitor").join("daemon.sock")
}

fn config_path(home: &Path) -> PathBuf {
    home.join(".hallmonitor").join("config.toml")
}

fn write_config(home: &Path, contents: &str) {
    fs::create_dir_all(home.join(".hallmonitor")).expect("create config dir");
    fs::write(config_path(home), contents).expect("write config");
}

fn can_bind_socket(home: &Path) -> bool {
    let check_path = home.join("bind-check.sock");
    match UnixListener::bind(&check_path) {
        Ok(listener) => {
            drop(listener);
            let _ = fs::remove_file(&check_path);
            true
        }
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => false,
        Err(_) => true,
    }
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() && UnixStream::connect(path).is_ok() {
            return;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("timed out waiting for daemon socket at {}", path.display());
}

fn send_request(socket: &Path, request: Request) -> Response {
    let mut stream = UnixStream::connect(socket).expect("failed to connect to daemon socket");
    serde_json::to_writer(&mut stream, &request).expect("failed to serialize request");
    stream.write_all(b"\n").expect("failed to write request");
    stream.flush().expect("failed to flush request");
    read_response(&mut stream)
}

fn send_raw_request(socket: &Path, payload: &[u8]) -> Response {
    let mut stream = UnixStream::connect(socket).expect("failed to connect to daemon socket");
    stream
        .write_all(payload)
        .expect("failed to write raw payload");
    stream.flush().expect("failed to flush raw payload");
    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Response {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).expect("failed to read response");
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    serde_json::from_slice(response_bytes).expect("failed to parse response JSON")
}

fn health(socket: &Path) -> Response {
    send_request(
        socket,
        Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::GetHealth,
            id: Some("health".to_string()),
            params: None,
        },
    )
}

fn error_code(response: &Response) -> Option<&str> {
    response.error.as_ref().map(|err| err.code.as_str())
}

fn temp_home(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in("/tmp")
        .expect("failed to create temp HOME")
}

#[test]
fn daemon_handles_malformed_payload_flood_without_losing_health() {
    let home = temp_home("hallmonitor-hardening-malformed");
    if !can_bind_socket(home.path()) {
        eprintln!(
            "Skipping malformed flood hardening test: unix socket binding not permitted in this environment."
        );
        return;
    }

    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let mut guard = Some(DaemonGuard { child });
    wait_for_socket(&socket, Duration::from_secs(5));

    for _ in 0..128 {
        let response = send_raw_request(&socket, b"{\"bad_json\": true\n");
        assert!(!response.ok, "malformed payload must be rejected");
        assert_eq!(error_code(&response), Some("invalid_json"));
    }

    assert!(
        health(&socket).ok,
        "daemon should remain healthy after malformed flood"
    );

    drop(guard.take());
}

#[test]
fn daemon_rejects_protocol_mismatch_and_invalid_events() {
    let home = temp_home("hallmonitor-hardening-invalid");
    if !can_bind_socket(home.path()) {
        eprintln!(
            "Skipping invalid event hardening test: unix socket binding not permitted in this environment."
        );
        return;
    }

    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let mut guard = Some(DaemonGuard { child });
    wait_for_socket(&socket, Duration::from_secs(5));

    let mismatch = send_request(
        &socket,
        Request {
            protocol_version: PROTOCOL_VERSION + 1,
            method: Method::GetHealth,
            id: Some("future".to_string()),
            params: None,
        },
    );
    assert_eq!(error_code(&mismatch), Some("protocol_mismatch"));
    assert_eq!(mismatch.id.as_deref(), Some("future"));

    let event = EventEnvelope::new(
        "evt-no-value".to_string(),
        Utc::now().to_rfc3339(),
        EventType::Proximity,
    );
    let missing = send_request(
        &socket,
        Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::Event,
            id: Some("evt-no-value".to_string()),
            params: Some(serde_json::to_value(&event).expect("serialize event")),
        },
    );
    assert_eq!(error_code(&missing), Some("missing_field"));

    let no_params = send_request(
        &socket,
        Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::Event,
            id: None,
            params: None,
        },
    );
    assert_eq!(error_code(&no_params), Some("invalid_params"));

    let mut unknown_widget = EventEnvelope::new(
        "evt-widget".to_string(),
        Utc::now().to_rfc3339(),
        EventType::WidgetConfigured,
    );
    unknown_widget.widget_id = Some(42);
    unknown_widget.ok = Some(true);
    let widget = send_request(
        &socket,
        Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::Event,
            id: Some("evt-widget".to_string()),
            params: Some(serde_json::to_value(&unknown_widget).expect("serialize event")),
        },
    );
    assert_eq!(error_code(&widget), Some("widget_error"));

    assert!(health(&socket).ok);
    drop(guard.take());
}

#[test]
fn daemon_idle_connection_returns_read_timeout_error() {
    let home = temp_home("hallmonitor-hardening-timeout");
    if !can_bind_socket(home.path()) {
        eprintln!(
            "Skipping timeout hardening test: unix socket binding not permitted in this environment."
        );
        return;
    }

    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let mut guard = Some(DaemonGuard { child });
    wait_for_socket(&socket, Duration::from_secs(5));

    let mut idle = UnixStream::connect(&socket).expect("failed to connect idle stream");
    let response = read_response(&mut idle);
    assert!(!response.ok, "idle request should return an error");
    assert_eq!(error_code(&response), Some("read_timeout"));

    drop(guard.take());
}

#[test]
fn daemon_starts_with_defaults_when_config_is_malformed() {
    let home = temp_home("hallmonitor-hardening-config");
    if !can_bind_socket(home.path()) {
        eprintln!(
            "Skipping config hardening test: unix socket binding not permitted in this environment."
        );
        return;
    }
    write_config(home.path(), "pref_enabled = [not toml");

    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let mut guard = Some(DaemonGuard { child });
    wait_for_socket(&socket, Duration::from_secs(5));

    let response = health(&socket);
    assert!(response.ok);
    assert_eq!(
        response
            .data
            .as_ref()
            .and_then(|data| data.get("service_running"))
            .and_then(|value| value.as_bool()),
        Some(false)
    );

    drop(guard.take());
}

#[test]
fn daemon_restart_honours_persisted_preference() {
    let home = temp_home("hallmonitor-hardening-restart");
    if !can_bind_socket(home.path()) {
        eprintln!(
            "Skipping restart hardening test: unix socket binding not permitted in this environment."
        );
        return;
    }
    write_config(home.path(), "pref_enabled = true\n");

    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let mut guard = Some(DaemonGuard { child });
    wait_for_socket(&socket, Duration::from_secs(5));

    let stop = EventEnvelope::new(
        "evt-stop".to_string(),
        Utc::now().to_rfc3339(),
        EventType::StopService,
    );
    let response = send_request(
        &socket,
        Request {
            protocol_version: PROTOCOL_VERSION,
            method: Method::Event,
            id: Some("evt-stop".to_string()),
            params: Some(serde_json::to_value(&stop).expect("serialize event")),
        },
    );
    assert!(response.ok, "stop_service should succeed");

    drop(guard.take());

    let child = spawn_daemon(home.path());
    let _guard = DaemonGuard { child };
    wait_for_socket(&socket, Duration::from_secs(5));

    let response = health(&socket);
    assert!(response.ok);
    assert_eq!(
        response
            .data
            .as_ref()
            .and_then(|data| data.get("service_running"))
            .and_then(|value| value.as_bool()),
        Some(false),
        "service must stay stopped across restarts"
    );
}

fn event_request(event: &EventEnvelope) -> Request {
    Request {
        protocol_version: PROTOCOL_VERSION,
        method: Method::Event,
        id: Some(event.event_id.clone()),
        params: Some(serde_json::to_value(event).expect("serialize event")),
    }
}

fn widget_id(response: &Response) -> Option<u64> {
    response
        .data
        .as_ref()
        .and_then(|data| data.get("widget_id"))
        .and_then(|value| value.as_u64())
}

#[test]
fn daemon_replays_outcome_for_retried_event_id() {
    let home = temp_home("hallmonitor-hardening-retry");
    if !can_bind_socket(home.path()) {
        eprintln!(
            "Skipping retry hardening test: unix socket binding not permitted in this environment."
        );
        return;
    }

    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let _guard = DaemonGuard { child };
    wait_for_socket(&socket, Duration::from_secs(5));

    let mut register = EventEnvelope::new(
        "evt-register".to_string(),
        Utc::now().to_rfc3339(),
        EventType::RegisterWidget,
    );
    register.widget_kind = Some("media".to_string());

    let first = send_request(&socket, event_request(&register));
    let retried = send_request(&socket, event_request(&register));
    assert!(first.ok && retried.ok);
    assert!(widget_id(&first).is_some());
    assert_eq!(widget_id(&first), widget_id(&retried));

    register.event_id = "evt-register-2".to_string();
    let fresh = send_request(&socket, event_request(&register));
    assert!(fresh.ok);
    assert_ne!(widget_id(&first), widget_id(&fresh));

    // Ids are sequential; the retry did not allocate one.
    assert_eq!(widget_id(&fresh), widget_id(&first).map(|id| id + 1));
}
