//! Error types for the reconciler crate.
//!
//! Two layers live here:
//!
//! - [`ResourceError`]: a remote failure already translated into the small
//!   [`ErrorKind`] taxonomy. This is the only error shape handlers return and
//!   the only one recorded in a [`SyncStatus`](crate::status::SyncStatus).
//! - [`Error`]: failures of the machinery around the engine (registry,
//!   store, loop).

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a remote-API failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The remote object does not exist.
    NotFound,
    /// Optimistic-concurrency failure or duplicate.
    Conflict,
    /// The remote asked us to back off.
    RateLimited,
    /// The payload was rejected; retrying without a spec change is pointless.
    Validation,
    /// Network failure or timeout.
    Transport,
    /// Anything unrecognised.
    Unknown,
}

impl ErrorKind {
    /// Stable name used in logs and persisted status.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::Conflict => "Conflict",
            Self::RateLimited => "RateLimited",
            Self::Validation => "Validation",
            Self::Transport => "Transport",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether re-attempting the same request may succeed.
    #[inline]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::Validation)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A translated remote-API failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ResourceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ResourceError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create a rate-limited error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    /// Create an unknown error.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Whether this is a not-found error.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// Reconciler machinery errors.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("no handler registered for kind '{kind}'")]
    HandlerNotRegistered { kind: String },

    #[error("resource '{key}' not found")]
    ResourceNotFound { key: String },

    #[error("resource '{key}' is pending deletion")]
    DeletionPending { key: String },

    #[error("invalid status record: {reason}")]
    InvalidStatus { reason: String },

    #[error("reconciliation failed: {reason}")]
    ReconcileFailed { reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a handler not registered error.
    pub fn handler_not_registered(kind: impl Into<String>) -> Self {
        Self::HandlerNotRegistered { kind: kind.into() }
    }

    /// Create a resource not found error.
    pub fn resource_not_found(key: impl Into<String>) -> Self {
        Self::ResourceNotFound { key: key.into() }
    }

    /// Create a deletion pending error.
    pub fn deletion_pending(key: impl Into<String>) -> Self {
        Self::DeletionPending { key: key.into() }
    }

    /// Create an invalid status error.
    pub fn invalid_status(reason: impl Into<String>) -> Self {
        Self::InvalidStatus {
            reason: reason.into(),
        }
    }

    /// Create a reconcile failed error.
    pub fn reconcile_failed(reason: impl Into<String>) -> Self {
        Self::ReconcileFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_error_display() {
        let err = ResourceError::transport("error creating logs metric: connection reset");
        assert_eq!(
            err.to_string(),
            "Transport: error creating logs metric: connection reset"
        );
    }

    #[test]
    fn test_only_validation_is_terminal() {
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(ErrorKind::Transport.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::Conflict.is_retryable());
    }

    #[test]
    fn test_handler_not_registered() {
        let err = Error::handler_not_registered("synthetics_test");
        assert!(err.to_string().contains("synthetics_test"));
    }
}
