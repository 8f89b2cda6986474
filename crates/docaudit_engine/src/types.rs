use std::fmt;
use std::sync::Arc;

use docaudit_core::{AgentReply, AuditEvent, ErrorInfo};

/// Produces the RFC 3339 timestamps stamped on requests and errors.
pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

pub fn utc_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().to_rfc3339())
}

pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport failure, no response.
    Network,
    /// No response within the configured timeout.
    Timeout,
    /// 401/403, expired session, or a failed code exchange.
    Auth,
    /// Any other non-success status.
    HttpStatus(u16),
    /// Rejected by the client-side allow-list before any network call.
    UnsupportedType,
    /// One file's transfer failed; its siblings are unaffected.
    PartialUpload,
    /// Audit stream closed abnormally mid-sequence.
    Stream,
    /// Malformed request or response.
    Validation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "network error"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Auth => write!(f, "authentication error"),
            ErrorKind::HttpStatus(code) => write!(f, "http status {code}"),
            ErrorKind::UnsupportedType => write!(f, "unsupported file type"),
            ErrorKind::PartialUpload => write!(f, "upload failed"),
            ErrorKind::Stream => write!(f, "stream error"),
            ErrorKind::Validation => write!(f, "validation error"),
        }
    }
}

/// Normalized failure of any single backend request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
    pub received_at: String,
}

impl ApiError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status_code: None,
            message: message.into(),
            received_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub(crate) fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => ErrorKind::Auth,
            code => ErrorKind::HttpStatus(code),
        };
        Self {
            status_code: Some(status),
            ..Self::new(kind, message)
        }
    }

    pub(crate) fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_auth(&self) -> bool {
        self.kind == ErrorKind::Auth
    }

    /// The `{received_at, status_code, message}` shape the page renders.
    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            received_at: self.received_at.clone(),
            status_code: self.status_code,
            message: self.message.clone(),
        }
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(ErrorKind::Timeout, "request timed out");
    }
    if let Some(status) = err.status() {
        return ApiError::from_status(status.as_u16(), err.to_string());
    }
    if err.is_decode() {
        return ApiError::new(ErrorKind::Validation, err.to_string());
    }
    ApiError::new(ErrorKind::Network, err.to_string())
}

/// What one audit stream reports, in order: `Opened`, any number of `Event`s,
/// then exactly one of `Completed` or `Failed`. A closed stream reports nothing more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditStreamEvent {
    Opened,
    Event(AuditEvent),
    Completed,
    Failed(ApiError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    QueryCompleted(Result<AgentReply, ApiError>),
    Audit { run: u64, event: AuditStreamEvent },
}
