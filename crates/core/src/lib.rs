//! Shared building blocks for syncer crates.
//!
//! - **Errors**: typed configuration and file errors
//! - **Result combinators**: log-and-continue helpers for fallible side effects
//! - **Configuration**: TOML settings for the reconciliation loop and remote API

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod config;
pub mod error;
pub mod result;

pub use config::{ApiSettings, Config, ReconcileSettings};
pub use error::Error;
pub use result::{Result, ResultExt, TapResult};
