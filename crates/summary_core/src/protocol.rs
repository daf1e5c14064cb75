//! Wire envelopes exchanged between UI surfaces and the background relay.
//!
//! Envelopes travel over a port as `serde_json::Value` frames. Decoding is the
//! receiver's job, so an unrecognized `type` surfaces as a [`ProtocolError`]
//! instead of being silently ignored.
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Server-sent event name carrying a partial or full summary.
pub const SSE_EVENT_SUMMARY: &str = "summary";
/// Server-sent event name signalling the end of the stream.
pub const SSE_EVENT_CLOSE: &str = "close";

const KNOWN_TYPES: [&str; 4] = ["request", "response", "sse", "error"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    #[serde(rename_all = "camelCase")]
    Request {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_init: Option<RequestInit>,
    },
    #[serde(rename_all = "camelCase")]
    Response {
        #[serde(default)]
        response_ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response_json: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    Sse {
        #[serde(default)]
        sse_event: String,
        #[serde(default)]
        sse_data: Value,
    },
    Error {
        #[serde(default)]
        error: ErrorRecord,
    },
}

impl Envelope {
    pub fn request(url: impl Into<String>, init: RequestInit) -> Self {
        Envelope::Request {
            request_url: Some(url.into()),
            request_init: Some(init),
        }
    }

    pub fn response(ok: bool, json: Option<Value>) -> Self {
        Envelope::Response {
            response_ok: ok,
            response_json: json,
        }
    }

    pub fn sse(event: impl Into<String>, data: Value) -> Self {
        Envelope::Sse {
            sse_event: event.into(),
            sse_data: data,
        }
    }

    pub fn error(record: ErrorRecord) -> Self {
        Envelope::Error { error: record }
    }

    /// Wire tag of this envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Request { .. } => "request",
            Envelope::Response { .. } => "response",
            Envelope::Sse { .. } => "sse",
            Envelope::Error { .. } => "error",
        }
    }

    /// A `RESPONSE` or `ERROR` is always the last envelope on a port.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Envelope::Response { .. } | Envelope::Error { .. })
    }

    pub fn to_value(&self) -> Value {
        // Serializing a derive-only enum with string keys cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let tag = match value.get("type") {
            Some(Value::String(tag)) => tag.clone(),
            Some(other) => return Err(ProtocolError::UnknownType(other.to_string())),
            None => return Err(ProtocolError::MissingType),
        };
        if !KNOWN_TYPES.contains(&tag.as_str()) {
            return Err(ProtocolError::UnknownType(tag));
        }
        serde_json::from_value(value).map_err(|err| ProtocolError::Malformed(err.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|err| ProtocolError::Malformed(err.to_string()))?;
        Self::from_value(value)
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }
}

/// Outbound HTTP call description carried by a `REQUEST` envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl RequestInit {
    pub fn post_json(body: &Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            method: Some("POST".to_string()),
            headers: Some(headers),
            body: Some(body.to_string()),
        }
    }

    pub fn method_or_default(&self) -> &str {
        self.method.as_deref().unwrap_or("GET")
    }
}

/// An error reduced to plain fields so it can cross a port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorRecord {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Reduces any error to a record; the `source()` chain becomes the stack.
    pub fn from_error(name: impl Into<String>, err: &(dyn StdError + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        Self {
            name: name.into(),
            message: err.to_string(),
            stack: (!causes.is_empty()).then(|| causes.join("\n")),
        }
    }

    pub fn protocol_violation(err: &ProtocolError) -> Self {
        Self::new("ProtocolError", err.to_string())
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("envelope has no type")]
    MissingType,
    #[error("unrecognized envelope type {0}")]
    UnknownType(String),
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("unexpected {0} envelope")]
    Unexpected(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEventKind {
    Summary,
    Close,
    Other(String),
}

impl SseEventKind {
    pub fn parse(name: &str) -> Self {
        match name {
            SSE_EVENT_SUMMARY => SseEventKind::Summary,
            SSE_EVENT_CLOSE => SseEventKind::Close,
            other => SseEventKind::Other(other.to_string()),
        }
    }
}
