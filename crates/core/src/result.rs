//! Result type definition and extension traits.
//!
//! Provides logging combinators for Result types, so fallible side effects
//! can be observed and dropped without unwrap/expect/panic.

use std::fmt::Display;

use crate::error::Error;

/// The standard Result type for syncer-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing logging combinators for any displayable error.
pub trait ResultExt<T> {
    /// Convert a Result to an Option, logging the error if present.
    fn into_option_logged(self, operation: &str) -> Option<T>;
}

impl<T, E: Display> ResultExt<T> for std::result::Result<T, E> {
    fn into_option_logged(self, operation: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(operation, error = %e, "Operation failed");
                None
            }
        }
    }
}

/// Generic tap-style combinators for side effects on either rail.
pub trait TapResult<T, E> {
    /// Perform a side effect on the Ok value without consuming the Result.
    fn tap_ok<F: FnOnce(&T)>(self, f: F) -> Self;

    /// Perform a side effect on the Err value without consuming the Result.
    fn tap_err<F: FnOnce(&E)>(self, f: F) -> Self;
}

impl<T, E> TapResult<T, E> for std::result::Result<T, E> {
    fn tap_ok<F: FnOnce(&T)>(self, f: F) -> Self {
        if let Ok(ref v) = self {
            f(v);
        }
        self
    }

    fn tap_err<F: FnOnce(&E)>(self, f: F) -> Self {
        if let Err(ref e) = self {
            f(e);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_into_option_ok() {
        let result: Result<i32> = Ok(42);
        assert_eq!(result.into_option_logged("test"), Some(42));
    }

    #[test]
    fn test_result_into_option_err() {
        let result: Result<i32> = Err(Error::invalid_config("test"));
        assert_eq!(result.into_option_logged("test"), None);
    }

    #[test]
    fn test_into_option_foreign_error() {
        let result: std::result::Result<i32, String> = Err("boom".to_string());
        assert_eq!(result.into_option_logged("test"), None);
    }

    #[test]
    fn test_tap_ok() {
        let mut observed = 0;
        let result: std::result::Result<i32, &str> = Ok(42);
        let _ = result.tap_ok(|v| observed = *v);
        assert_eq!(observed, 42);
    }

    #[test]
    fn test_tap_err() {
        let mut observed = String::new();
        let result: std::result::Result<i32, &str> = Err("error");
        let _ = result.tap_err(|e| observed = (*e).to_string());
        assert_eq!(observed, "error");
    }
}
