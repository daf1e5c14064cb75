use summary_core::ErrorRecord;
use thiserror::Error;

use crate::settings::SettingsError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("invalid sender, senderId={0}")]
    InvalidSender(String),
    #[error("invalid request, message={0}")]
    InvalidRequest(String),
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid method {0}")]
    InvalidMethod(String),
    #[error("onopen, invalid response, status={0}")]
    FatalStatus(u16),
    #[error("onopen, invalid response, status={0}")]
    RetriableStatus(u16),
    #[error("onopen, invalid response, contentType={0}")]
    UnexpectedContentType(String),
    #[error("request timed out")]
    Timeout(#[source] reqwest::Error),
    #[error("network error")]
    Network(#[source] reqwest::Error),
    #[error("failed to decode response body")]
    Decode(#[source] reqwest::Error),
    #[error("stream transport error: {0}")]
    Stream(String),
    #[error("gave up after {attempts} retriable failures, last: {last}")]
    RetriesExhausted { attempts: usize, last: String },
    #[error("anonymous id unavailable: {0}")]
    Identity(String),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl RelayError {
    /// Error name carried in the reduced record.
    pub fn name(&self) -> &'static str {
        match self {
            RelayError::InvalidSender(_) | RelayError::InvalidRequest(_) => "ProtocolError",
            RelayError::InvalidUrl { .. } | RelayError::InvalidMethod(_) => "TypeError",
            RelayError::FatalStatus(_)
            | RelayError::UnexpectedContentType(_)
            | RelayError::RetriesExhausted { .. } => "FatalError",
            RelayError::RetriableStatus(_) => "RetriableError",
            RelayError::Timeout(_) => "TimeoutError",
            RelayError::Network(_) | RelayError::Stream(_) => "NetworkError",
            RelayError::Decode(_) => "DecodeError",
            RelayError::Identity(_) => "IdentityError",
            RelayError::Settings(_) => "SettingsError",
        }
    }

    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord::from_error(self.name(), self)
    }

    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return RelayError::Timeout(err);
        }
        if err.is_decode() {
            return RelayError::Decode(err);
        }
        RelayError::Network(err)
    }
}

/// How an HTTP status observed when a stream opens is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// Permanent client error; never retried.
    Fatal,
    /// 429 and everything else that is not a success or a client error.
    Retriable,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        429 => StatusClass::Retriable,
        400..=499 => StatusClass::Fatal,
        _ => StatusClass::Retriable,
    }
}
