//! Hallmonitor daemon entrypoint.
//!
//! A small, single-writer service that owns the cover state. Platform glue
//! (sensor listeners, broadcast receivers, init scripts) reports events over
//! a Unix socket; every request goes through one serialized event queue.

use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hall_core::config::{default_config_path, load_config};
use hall_core::{
    BackgroundExecutor, CommandPlatform, Executor, HallConfig, HallFile, HallMonitor, SuShell,
};
use hallmonitor_daemon_protocol::{
    parse_event, ErrorInfo, EventEnvelope, EventType, Method, Request, Response,
    MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use serde_json::Value;

mod dedup;
mod queue;

use dedup::RecentEvents;
use queue::EventQueue;

const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

fn main() {
    init_logging();

    let socket_path = match daemon_socket_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon socket path");
            std::process::exit(1);
        }
    };

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let monitor = match build_monitor() {
        Ok(monitor) => monitor,
        Err(err) => {
            error!(error = %err, "Failed to start cover monitor");
            std::process::exit(1);
        }
    };
    monitor.boot();

    let queue = {
        let monitor = monitor.clone();
        let mut recent = RecentEvents::default();
        match EventQueue::spawn(move |request| handle_request(request, &monitor, &mut recent)) {
            Ok(queue) => queue,
            Err(err) => {
                error!(error = %err, "Failed to start event queue");
                std::process::exit(1);
            }
        }
    };

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(
        path = %socket_path.display(),
        service_running = monitor.service_running(),
        "Hallmonitor daemon started"
    );

    let queue = Arc::new(queue);
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let queue = Arc::clone(&queue);
                thread::spawn(move || handle_connection(stream, &queue));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn init_logging() {
    let debug_enabled = env::var("HALLMONITOR_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_monitor() -> Result<HallMonitor, String> {
    let config_path = default_config_path().map_err(|err| err.to_string())?;
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load config; using defaults");
            HallConfig::default()
        }
    };
    info!(
        config = %config_path.display(),
        pref_enabled = config.pref_enabled,
        pref_delay = config.pref_delay,
        root_enabled = config.root_enabled,
        hall_file = %config.hall_file.display(),
        "Configuration loaded"
    );

    let platform = CommandPlatform::new(config.platform.clone(), config.command_timeout());
    let shell = SuShell::new(config.su_program.clone(), config.command_timeout());
    let executor = BackgroundExecutor::spawn(Executor::new(Arc::new(platform), Arc::new(shell)))
        .map_err(|err| format!("Failed to start effect worker: {}", err))?;
    let status = HallFile::new(config.hall_file.clone());

    Ok(HallMonitor::with_config_path(
        config,
        Arc::new(status),
        Arc::new(executor),
        config_path,
    ))
}

fn daemon_socket_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".hallmonitor").join(SOCKET_NAME))
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, queue: &EventQueue) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = queue.dispatch(request);
    let _ = write_response(&mut stream, response);
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    let request_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn handle_request(
    request: Request,
    monitor: &HallMonitor,
    recent: &mut RecentEvents,
) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    match request.method {
        Method::GetHealth => Response::ok(
            request.id,
            serde_json::json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
                "service_running": monitor.service_running(),
            }),
        ),
        Method::GetState => match serde_json::to_value(monitor.snapshot()) {
            Ok(value) => Response::ok(request.id, value),
            Err(err) => Response::error(
                request.id,
                "serialization_error",
                format!("Failed to serialize monitor state: {}", err),
            ),
        },
        Method::Event => handle_event(request, monitor, recent),
    }
}

fn handle_event(request: Request, monitor: &HallMonitor, recent: &mut RecentEvents) -> Response {
    let params = match request.params {
        Some(params) => params,
        None => return Response::error(request.id, "invalid_params", "event payload is required"),
    };

    let event = match parse_event(params) {
        Ok(event) => event,
        Err(err) => return Response::error_with_info(request.id, err),
    };

    let outcome = match recent.get(&event.event_id) {
        Some(outcome) => {
            info!(event_id = %event.event_id, "Duplicate event; replaying stored outcome");
            outcome.clone()
        }
        None => {
            info!(
                event_id = %event.event_id,
                event_type = ?event.event_type,
                "Received event"
            );
            let outcome = apply_event(&event, monitor);
            recent.record(&event.event_id, outcome.clone());
            outcome
        }
    };

    match outcome {
        Ok(data) => Response::ok(request.id, data),
        Err(err) => Response::error_with_info(request.id, err),
    }
}

fn apply_event(event: &EventEnvelope, monitor: &HallMonitor) -> Result<Value, ErrorInfo> {
    // Payload fields were checked by `validate`; the defaults below are unreachable.
    let data = match event.event_type {
        EventType::Proximity => {
            let transition = monitor.on_reading(event.value.unwrap_or(1.0));
            serde_json::json!({ "accepted": true, "transition": transition })
        }
        EventType::ScreenOn => {
            monitor.screen_on();
            accepted()
        }
        EventType::Boot => serde_json::json!({ "service_running": monitor.boot() }),
        EventType::StartService => serde_json::json!({ "start": monitor.start_service() }),
        EventType::StopService => {
            monitor.stop_service();
            accepted()
        }
        EventType::AdminRequestResult => {
            monitor.admin_request_result(event.granted.unwrap_or(false));
            accepted()
        }
        EventType::DeviceAdminStatus => {
            monitor.device_admin_status(event.active.unwrap_or(false));
            accepted()
        }
        EventType::IncomingCall => {
            let screened = monitor.incoming_call(event.number.as_deref().unwrap_or_default());
            serde_json::json!({ "screened": screened })
        }
        EventType::CallFinished => {
            monitor.call_finished();
            accepted()
        }
        EventType::AnswerCall => {
            monitor.answer_call();
            accepted()
        }
        EventType::HangupCall => {
            monitor.hangup_call();
            accepted()
        }
        EventType::RegisterWidget => {
            let id = monitor.register_widget(event.widget_kind.as_deref().unwrap_or_default());
            serde_json::json!({ "widget_id": id })
        }
        EventType::UnregisterWidget => {
            let removed =
                monitor.unregister_widget(event.widget_kind.as_deref().unwrap_or_default());
            serde_json::json!({ "widget_id": removed })
        }
        EventType::WidgetPicked | EventType::WidgetConfigured => {
            let id = event.widget_id.unwrap_or_default();
            let ok = event.ok.unwrap_or(false);
            let result = if event.event_type == EventType::WidgetPicked {
                monitor.widget_picked(id, ok)
            } else {
                monitor.widget_configured(id, ok)
            };
            result.map_err(|err| ErrorInfo::new("widget_error", err.to_string()))?;
            accepted()
        }
    };
    Ok(data)
}

fn accepted() -> Value {
    serde_json::json!({ "accepted": true })
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
