//! IPC protocol types and validation for hallmonitor-daemon.
//!
//! Shared by the daemon and `hallctl` so platform glue and the daemon agree
//! on one schema. The daemon remains the authority on validation.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;
const MAX_EVENT_ID_LEN: usize = 128;
const MAX_NUMBER_LEN: usize = 64;
const MAX_WIDGET_KIND_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    GetState,
    Event,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// Platform callbacks the daemon reacts to.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum EventType {
    /// Proximity sensor reading; requires `value`.
    Proximity,
    ScreenOn,
    Boot,
    StartService,
    StopService,
    /// Outcome of the admin request; requires `granted`.
    AdminRequestResult,
    /// Admin rights changed; requires `active`.
    DeviceAdminStatus,
    /// Requires `number`.
    IncomingCall,
    CallFinished,
    AnswerCall,
    HangupCall,
    /// Requires `widget_kind`.
    RegisterWidget,
    /// Requires `widget_kind`.
    UnregisterWidget,
    /// Requires `widget_id` and `ok`.
    WidgetPicked,
    /// Requires `widget_id` and `ok`.
    WidgetConfigured,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EventEnvelope {
    pub event_id: String,
    pub recorded_at: String,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
}

impl EventEnvelope {
    /// An envelope with every payload field unset.
    pub fn new(event_id: String, recorded_at: String, event_type: EventType) -> Self {
        Self {
            event_id,
            recorded_at,
            event_type,
            value: None,
            granted: None,
            active: None,
            number: None,
            widget_kind: None,
            widget_id: None,
            ok: None,
        }
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.event_id.trim().is_empty() {
            return Err(ErrorInfo::new("invalid_event_id", "event_id is required"));
        }
        if self.event_id.len() > MAX_EVENT_ID_LEN {
            return Err(ErrorInfo::new(
                "invalid_event_id",
                format!("event_id must be {} characters or fewer", MAX_EVENT_ID_LEN),
            ));
        }

        if DateTime::parse_from_rfc3339(&self.recorded_at).is_err() {
            return Err(ErrorInfo::new(
                "invalid_timestamp",
                "recorded_at must be RFC3339",
            ));
        }

        match self.event_type {
            EventType::Proximity => match self.value {
                Some(value) if value.is_finite() => {}
                Some(_) => {
                    return Err(ErrorInfo::new("invalid_value", "value must be finite"));
                }
                None => return Err(missing("value")),
            },
            EventType::AdminRequestResult => require_bool(&self.granted, "granted")?,
            EventType::DeviceAdminStatus => require_bool(&self.active, "active")?,
            EventType::IncomingCall => require_string(&self.number, "number", MAX_NUMBER_LEN)?,
            EventType::RegisterWidget | EventType::UnregisterWidget => {
                require_string(&self.widget_kind, "widget_kind", MAX_WIDGET_KIND_LEN)?
            }
            EventType::WidgetPicked | EventType::WidgetConfigured => {
                if self.widget_id.is_none() {
                    return Err(missing("widget_id"));
                }
                require_bool(&self.ok, "ok")?;
            }
            EventType::ScreenOn
            | EventType::Boot
            | EventType::StartService
            | EventType::StopService
            | EventType::CallFinished
            | EventType::AnswerCall
            | EventType::HangupCall => {}
        }

        Ok(())
    }
}

pub fn parse_event(params: Value) -> Result<EventEnvelope, ErrorInfo> {
    let envelope: EventEnvelope = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("event payload is invalid JSON: {}", err),
        )
    })?;
    envelope.validate()?;
    Ok(envelope)
}

fn missing(field: &str) -> ErrorInfo {
    ErrorInfo::new("missing_field", format!("{} is required", field))
}

fn require_string(value: &Option<String>, field: &str, max_len: usize) -> Result<(), ErrorInfo> {
    match value {
        Some(candidate) if candidate.trim().is_empty() => Err(missing(field)),
        Some(candidate) if candidate.len() > max_len => Err(ErrorInfo::new(
            "invalid_field",
            format!("{} must be {} characters or fewer", field, max_len),
        )),
        Some(_) => Ok(()),
        None => Err(missing(field)),
    }
}

fn require_bool(value: &Option<bool>, field: &str) -> Result<(), ErrorInfo> {
    match value {
        Some(_) => Ok(()),
        None => Err(missing(field)),
    }
}
