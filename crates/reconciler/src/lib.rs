//! K8s-style reconciliation of declared resources against remote APIs.
//!
//! A declared resource (kind tag + JSON payload) is kept in sync with an
//! object living in a remote management API:
//!
//! - **Hash**: a SHA-256 fingerprint of the canonicalized spec detects drift
//! - **Status**: the persisted record of remote id, applied hash and state
//! - **Handlers**: one [`ResourceHandler`] per remote kind (create, fetch,
//!   update, delete)
//! - **Engine**: [`Reconciler`] picks exactly one action per pass
//! - **Translator**: remote failures become a small [`ErrorKind`] taxonomy
//!
//! # Decision policy
//!
//! 1. No remote id yet: create.
//! 2. Forced resync requested: fetch; recreate if gone, update if drifted.
//! 3. Spec hash differs from the applied hash: update.
//! 4. Otherwise nothing to do.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use syncer_reconciler::{
//!     handlers::{InMemoryLogsMetrics, LogsMetricsHandler, LOGS_METRIC_KIND},
//!     DeclaredSpec, Reconciler, ResourceKey, ResourceKind, SyncStatus,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let handler = LogsMetricsHandler::new(Arc::new(InMemoryLogsMetrics::new()));
//!     let spec = DeclaredSpec::new(
//!         ResourceKey::new("monitoring", "checkout-errors"),
//!         ResourceKind::new(LOGS_METRIC_KIND),
//!         r#"{"data":{"id":"checkout.errors","attributes":{"compute":{"aggregation_type":"count"}}}}"#,
//!     );
//!
//!     let outcome = Reconciler::default()
//!         .reconcile(&spec, SyncStatus::new(), &handler, false)
//!         .await;
//!     assert!(outcome.succeeded());
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod handler;
pub mod handlers;
pub mod hash;
pub mod r#loop;
pub mod reconciler;
pub mod status;
pub mod store;
pub mod translate;
pub mod types;

// Re-export main types
pub use error::{Error, ErrorKind, ResourceError, Result};
pub use handler::{HandlerRegistry, ResourceHandler, TracingHandler, json_contains};
pub use hash::{SpecHash, canonical_payload, spec_hash};
pub use r#loop::{LoopConfig, LoopStopper, ReconciliationLoop, TickSummary, force_sync_due};
pub use reconciler::{
    Clock, DeleteOutcome, FixedClock, ReconcileOutcome, Reconciler, ReconcilerBuilder,
    ReconcilerConfig, SystemClock, plan,
};
pub use status::{SyncState, SyncStatus};
pub use store::{InMemoryResourceStore, ResourceStore, StoredResource};
pub use translate::{RemoteFailure, classify, translate};
pub use types::{DeclaredSpec, ReconcileAction, RemoteId, RemoteObject, ResourceKey, ResourceKind};
