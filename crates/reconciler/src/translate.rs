//! Translation of raw remote-API failures into [`ErrorKind`].
//!
//! Clients describe what went wrong as a [`RemoteFailure`]: the HTTP status
//! (when a response arrived), an optional machine-readable error code from the
//! body, and whether the request failed below HTTP. [`translate`] is a pure
//! function of those fields.

use std::fmt;

use crate::error::{ErrorKind, ResourceError};

/// Discriminating fields of a failed remote call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteFailure {
    /// HTTP status code, if a response was received.
    pub status: Option<u16>,
    /// Error code reported in the response body.
    pub code: Option<String>,
    /// The request never produced a response (connect, reset, timeout).
    pub transport: bool,
    pub message: String,
}

impl RemoteFailure {
    /// A failure carried by an HTTP response.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            ..Self::default()
        }
    }

    /// A failure below HTTP.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            transport: true,
            message: message.into(),
            ..Self::default()
        }
    }

    /// A failure with no response and no transport signal, such as an
    /// undecodable body.
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attach a remote error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, "{status} {code}: {}", self.message),
            (Some(status), None) => write!(f, "{status}: {}", self.message),
            (None, Some(code)) => write!(f, "{code}: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// Classify a failure.
///
/// A transport failure wins, then a recognised error code, then the status
/// code. Unrecognised shapes are `Unknown`.
pub fn classify(failure: &RemoteFailure) -> ErrorKind {
    if failure.transport {
        return ErrorKind::Transport;
    }
    failure
        .code
        .as_deref()
        .and_then(classify_code)
        .or_else(|| failure.status.and_then(classify_status))
        .unwrap_or(ErrorKind::Unknown)
}

fn classify_code(code: &str) -> Option<ErrorKind> {
    match code.to_ascii_lowercase().as_str() {
        "not_found" | "notfound" | "resource_not_found" => Some(ErrorKind::NotFound),
        "conflict" | "already_exists" | "duplicate" | "precondition_failed" => {
            Some(ErrorKind::Conflict)
        }
        "rate_limited" | "too_many_requests" | "throttled" => Some(ErrorKind::RateLimited),
        "invalid_request" | "validation_failed" | "bad_request" | "invalid_argument" => {
            Some(ErrorKind::Validation)
        }
        "timeout" | "unavailable" | "deadline_exceeded" => Some(ErrorKind::Transport),
        _ => None,
    }
}

const fn classify_status(status: u16) -> Option<ErrorKind> {
    match status {
        404 | 410 => Some(ErrorKind::NotFound),
        409 | 412 => Some(ErrorKind::Conflict),
        429 => Some(ErrorKind::RateLimited),
        400 | 422 => Some(ErrorKind::Validation),
        408 | 502 | 503 | 504 => Some(ErrorKind::Transport),
        _ => None,
    }
}

/// Translate a failure, prefixing the message with what was being done.
pub fn translate(failure: &RemoteFailure, context: &str) -> ResourceError {
    ResourceError::new(classify(failure), format!("{context}: {failure}"))
}
