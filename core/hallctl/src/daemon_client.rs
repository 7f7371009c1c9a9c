//! Client for the hallmonitor daemon socket.
//!
//! The daemon owns all cover state. `hallctl` only builds envelopes, sends
//! them and reports what came back; a delivery failure is surfaced to the
//! caller so init scripts can notice it.

use chrono::Utc;
use hallmonitor_daemon_protocol::{
    EventEnvelope, EventType, Method, Request, Response, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use rand::RngCore;
use serde_json::Value;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const SOCKET_ENV: &str = "HALLMONITOR_DAEMON_SOCKET";
const SOCKET_NAME: &str = "daemon.sock";
// Outlasts the daemon's 5 s queue reply timeout, so a slow event surfaces
// as the daemon's `queue_timeout` error rather than a client-side retry.
const READ_TIMEOUT_MS: u64 = 6000;
const WRITE_TIMEOUT_MS: u64 = 600;
const RETRY_DELAY_MS: u64 = 50;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to connect to daemon socket {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error talking to daemon: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed daemon message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timed out waiting for daemon response")]
    Timeout,

    #[error("Daemon response was empty")]
    EmptyResponse,

    #[error("Daemon response exceeded maximum size")]
    ResponseTooLarge,

    #[error("Daemon rejected request: {code}: {message}")]
    Rejected { code: String, message: String },
}

pub type Result<T> = std::result::Result<T, ClientError>;

pub fn socket_path() -> Result<PathBuf> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or(ClientError::HomeDirNotFound)?;
    Ok(home.join(".hallmonitor").join(SOCKET_NAME))
}

/// Sends one event and returns the daemon's `data` payload.
///
/// `fill` sets the type-specific payload fields. One retry is attempted with
/// the same event id; the daemon remembers recent ids and answers a repeat
/// with the stored outcome instead of applying the event again.
pub fn send_event<F>(event_type: EventType, fill: F) -> Result<Value>
where
    F: Fn(&mut EventEnvelope),
{
    let event_id = make_event_id(std::process::id());
    let recorded_at = Utc::now().to_rfc3339();
    let build = || {
        let mut envelope = EventEnvelope::new(event_id.clone(), recorded_at.clone(), event_type);
        fill(&mut envelope);
        envelope
    };

    match send_event_once(build()) {
        Ok(data) => Ok(data),
        Err(err @ ClientError::Rejected { .. }) => Err(err),
        Err(err) => {
            tracing::warn!(error = %err, event_type = ?event_type, "Failed to send event to daemon");
            std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
            send_event_once(build()).inspect_err(|retry_err| {
                tracing::warn!(
                    error = %retry_err,
                    event_type = ?event_type,
                    "Retry failed sending event to daemon"
                );
            })
        }
    }
}

pub fn get_health() -> Result<Value> {
    query(Method::GetHealth, "health-check")
}

pub fn get_state() -> Result<Value> {
    query(Method::GetState, "state-check")
}

fn query(method: Method, id: &str) -> Result<Value> {
    let request = Request {
        protocol_version: PROTOCOL_VERSION,
        method,
        id: Some(id.to_string()),
        params: None,
    };
    into_data(send_request(&request)?)
}

fn send_event_once(event: EventEnvelope) -> Result<Value> {
    let request = Request {
        protocol_version: PROTOCOL_VERSION,
        method: Method::Event,
        id: Some(event.event_id.clone()),
        params: Some(serde_json::to_value(event)?),
    };
    into_data(send_request(&request)?)
}

fn into_data(response: Response) -> Result<Value> {
    if response.ok {
        return Ok(response.data.unwrap_or(Value::Null));
    }
    let (code, message) = response
        .error
        .map(|err| (err.code, err.message))
        .unwrap_or_else(|| ("unknown".to_string(), "Unknown daemon error".to_string()));
    Err(ClientError::Rejected { code, message })
}

fn send_request(request: &Request) -> Result<Response> {
    let path = socket_path()?;
    let mut stream = UnixStream::connect(&path).map_err(|source| ClientError::Connect {
        path: path.clone(),
        source,
    })?;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

    serde_json::to_writer(&mut stream, request)?;
    stream.write_all(b"\n")?;
    stream.flush().ok();

    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Result<Response> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ClientError::ResponseTooLarge);
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Err(ClientError::Timeout);
            }
            Err(err) => return Err(err.into()),
        }
    }

    let response_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err(ClientError::EmptyResponse);
    }

    Ok(serde_json::from_slice(response_bytes)?)
}

fn make_event_id(pid: u32) -> String {
    let mut random = rand::thread_rng();
    let rand = random.next_u64();
    format!("evt-{}-{}-{:x}", Utc::now().timestamp_millis(), pid, rand)
}
