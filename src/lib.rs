//! # syncer
//!
//! Keeps log-based metrics declared in a YAML manifest in sync with a remote
//! management API.
//!
//! The reconciliation engine lives in `syncer-reconciler`; this crate adds
//! the pieces the binary wires together:
//!
//! - **manifest**: YAML list of declared resources
//! - **state**: JSON file persisting statuses between runs
//! - **client**: reqwest transport for the logs-metrics API

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod client;
pub mod manifest;
pub mod state;

pub use client::HttpLogsMetricsClient;
pub use manifest::{load_manifest, parse_manifest};
pub use state::{SeedSummary, StateEntry, StateError, StateFile, seed_store};
