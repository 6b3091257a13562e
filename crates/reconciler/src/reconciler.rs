//! Reconciliation engine.
//!
//! One call to [`Reconciler::reconcile`] takes exactly one action for one
//! resource and returns the updated status. The engine keeps no state between
//! calls; the caller persists the returned status and serializes passes for
//! the same resource.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{Error, ResourceError, Result};
use crate::handler::ResourceHandler;
use crate::hash::{SpecHash, spec_hash};
use crate::status::{SyncState, SyncStatus};
use crate::types::{DeclaredSpec, ReconcileAction, RemoteId, RemoteObject};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant, for tests and previews.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Timeout for each handler call. An elapsed timeout is a `Transport`
    /// error.
    pub operation_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(30),
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// The action selected by the decision policy.
    pub action: ReconcileAction,
    /// Updated status; always present, also on failure.
    pub status: SyncStatus,
    /// Translated error of the failed remote call, if any.
    pub error: Option<ResourceError>,
}

impl ReconcileOutcome {
    /// Whether the pass ended without error.
    #[inline]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of deleting a resource.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The remote object is gone; the caller drops the status record.
    Cleared,
    /// Deletion failed; keep the returned record and retry later.
    Retained {
        status: SyncStatus,
        error: ResourceError,
    },
}

/// Decide the next action without touching the remote.
///
/// Create wins over a forced resync, which wins over hash drift. The hash is
/// not consulted until something has been created.
pub fn plan(hash: &SpecHash, status: &SyncStatus, force_sync: bool) -> ReconcileAction {
    if status.remote_id().is_none() {
        ReconcileAction::Create
    } else if force_sync {
        ReconcileAction::ForceSync
    } else if !status.is_applied(hash) {
        ReconcileAction::Update
    } else {
        ReconcileAction::Reconciled
    }
}

/// Hash-driven reconciliation engine.
pub struct Reconciler {
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a reconciler using wall-clock time.
    pub fn new(config: ReconcilerConfig) -> Self {
        Self::with_clock(Arc::new(SystemClock), config)
    }

    /// Create a reconciler with an injected clock.
    pub fn with_clock(clock: Arc<dyn Clock>, config: ReconcilerConfig) -> Self {
        Self { clock, config }
    }

    /// Reconcile one resource.
    ///
    /// Never fails as a whole: every remote failure is recorded in the
    /// returned status and echoed in [`ReconcileOutcome::error`].
    pub async fn reconcile(
        &self,
        spec: &DeclaredSpec,
        status: SyncStatus,
        handler: &dyn ResourceHandler,
        force_sync: bool,
    ) -> ReconcileOutcome {
        let hash = spec_hash(spec);
        let action = plan(&hash, &status, force_sync);

        debug!(
            resource = %spec.key,
            kind = %spec.kind,
            action = %action,
            state = %status.state(),
            "Reconciling"
        );

        let mut status = status;
        let error = match action {
            ReconcileAction::Create => self.create(spec, &hash, &mut status, handler).await,
            ReconcileAction::ForceSync => self.force_sync(spec, &hash, &mut status, handler).await,
            ReconcileAction::Update => self.update(spec, &hash, &mut status, handler).await,
            ReconcileAction::Reconciled => {
                if matches!(
                    status.state(),
                    SyncState::UpdatePending | SyncState::UpdateError
                ) {
                    status.record_confirmed(self.clock.now());
                }
                None
            }
            ReconcileAction::Delete => None,
        };

        match &error {
            None if action.touches_remote() => {
                info!(resource = %spec.key, action = %action, "Reconciled");
            }
            None => {}
            Some(e) => warn!(
                resource = %spec.key,
                action = %action,
                error_kind = %e.kind,
                retryable = e.kind.is_retryable(),
                error = %e.message,
                state = %status.state(),
                "Reconciliation failed"
            ),
        }

        ReconcileOutcome {
            action,
            status,
            error,
        }
    }

    /// Delete the remote counterpart of a removed resource.
    ///
    /// `NotFound` counts as success. A record that never got a remote id is
    /// cleared without a remote call.
    pub async fn delete(&self, status: SyncStatus, handler: &dyn ResourceHandler) -> DeleteOutcome {
        let Some(remote_id) = status.remote_id().cloned() else {
            debug!("Nothing was created remotely, clearing status");
            return DeleteOutcome::Cleared;
        };

        match self.call("delete", handler.delete(&remote_id)).await {
            Ok(()) => {
                info!(remote_id = %remote_id, "Deleted remote object");
                DeleteOutcome::Cleared
            }
            Err(e) if e.is_not_found() => {
                info!(remote_id = %remote_id, "Remote object already gone");
                DeleteOutcome::Cleared
            }
            Err(e) => {
                warn!(remote_id = %remote_id, error = %e, "Delete failed");
                let mut status = status;
                status.record_delete_failed(e.clone(), self.clock.now());
                DeleteOutcome::Retained { status, error: e }
            }
        }
    }

    async fn create(
        &self,
        spec: &DeclaredSpec,
        hash: &SpecHash,
        status: &mut SyncStatus,
        handler: &dyn ResourceHandler,
    ) -> Option<ResourceError> {
        let created = self
            .call("create", handler.create(spec))
            .await
            .and_then(|remote| {
                RemoteId::new(remote.id.clone())
                    .map(|id| (id, remote))
                    .ok_or_else(|| ResourceError::unknown("remote returned an empty identifier"))
            });

        let now = self.clock.now();
        match created {
            Ok((remote_id, remote)) => {
                info!(resource = %spec.key, remote_id = %remote_id, "Created remote object");
                status.record_created(remote_id, &remote, hash.clone(), now);
                None
            }
            Err(e) => {
                status.record_create_failed(e.clone(), now);
                Some(e)
            }
        }
    }

    async fn update(
        &self,
        spec: &DeclaredSpec,
        hash: &SpecHash,
        status: &mut SyncStatus,
        handler: &dyn ResourceHandler,
    ) -> Option<ResourceError> {
        let Some(remote_id) = status.remote_id().cloned() else {
            return self.create(spec, hash, status, handler).await;
        };

        let result = self.call("update", handler.update(&remote_id, spec)).await;
        let now = self.clock.now();
        match result {
            Ok(_) => {
                status.record_applied(hash.clone(), now);
                None
            }
            Err(e) => {
                status.record_update_failed(e.clone(), now);
                Some(e)
            }
        }
    }

    async fn force_sync(
        &self,
        spec: &DeclaredSpec,
        hash: &SpecHash,
        status: &mut SyncStatus,
        handler: &dyn ResourceHandler,
    ) -> Option<ResourceError> {
        let Some(remote_id) = status.remote_id().cloned() else {
            return self.create(spec, hash, status, handler).await;
        };

        let fetched: std::result::Result<RemoteObject, ResourceError> =
            self.call("fetch", handler.fetch(&remote_id)).await;

        match fetched {
            Err(e) if e.is_not_found() => {
                info!(
                    resource = %spec.key,
                    remote_id = %remote_id,
                    "Remote object deleted out-of-band, recreating"
                );
                self.create(spec, hash, status, handler).await
            }
            Err(e) => {
                status.record_update_failed(e.clone(), self.clock.now());
                Some(e)
            }
            Ok(remote) => {
                status.record_force_synced(self.clock.now());
                if status.is_applied(hash) && handler.matches(spec, &remote) {
                    status.record_confirmed(self.clock.now());
                    None
                } else {
                    info!(resource = %spec.key, remote_id = %remote_id, "Drift detected");
                    self.update(spec, hash, status, handler).await
                }
            }
        }
    }

    async fn call<T, F>(&self, operation: &str, fut: F) -> std::result::Result<T, ResourceError>
    where
        F: Future<Output = std::result::Result<T, ResourceError>>,
    {
        let timeout = self.config.operation_timeout;
        tokio::time::timeout(timeout, fut).await.unwrap_or_else(|_| {
            Err(ResourceError::transport(format!(
                "{operation} timed out after {}ms",
                timeout.as_millis()
            )))
        })
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcilerConfig::default())
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    clock: Option<Arc<dyn Clock>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            clock: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set a custom clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = timeout;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero operation timeout.
    pub fn build(self) -> Result<Reconciler> {
        if self.config.operation_timeout.is_zero() {
            return Err(Error::invalid_config("operation timeout must be positive"));
        }
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        Ok(Reconciler::with_clock(clock, self.config))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::error::ErrorKind;
    use crate::status::SyncState;
    use crate::types::{ResourceKey, ResourceKind};
    use async_trait::async_trait;

    fn spec(json: &str) -> DeclaredSpec {
        DeclaredSpec::new(
            ResourceKey::new("default", "m"),
            ResourceKind::new("slow"),
            json,
        )
    }

    struct SlowHandler {
        kind: ResourceKind,
    }

    #[async_trait]
    impl ResourceHandler for SlowHandler {
        fn kind(&self) -> &ResourceKind {
            &self.kind
        }

        async fn create(
            &self,
            _spec: &DeclaredSpec,
        ) -> std::result::Result<RemoteObject, ResourceError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(RemoteObject::new("late", serde_json::Value::Null))
        }

        async fn fetch(&self, _id: &RemoteId) -> std::result::Result<RemoteObject, ResourceError> {
            Err(ResourceError::unknown("unused"))
        }

        async fn update(
            &self,
            _id: &RemoteId,
            _spec: &DeclaredSpec,
        ) -> std::result::Result<RemoteObject, ResourceError> {
            Err(ResourceError::unknown("unused"))
        }

        async fn delete(&self, _id: &RemoteId) -> std::result::Result<(), ResourceError> {
            Ok(())
        }
    }

    #[test]
    fn test_plan_order() {
        let s = spec("{}");
        let hash = spec_hash(&s);
        let now = Utc::now();

        assert_eq!(plan(&hash, &SyncStatus::new(), true), ReconcileAction::Create);

        let synced = SyncStatus::synced(RemoteId::new("abc").unwrap(), hash.clone(), now);
        assert_eq!(plan(&hash, &synced, true), ReconcileAction::ForceSync);
        assert_eq!(plan(&hash, &synced, false), ReconcileAction::Reconciled);

        let drifted = spec_hash(&spec(r#"{"a": 1}"#));
        assert_eq!(plan(&drifted, &synced, false), ReconcileAction::Update);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_transport_error() {
        let reconciler = ReconcilerBuilder::new()
            .operation_timeout(Duration::from_secs(1))
            .build()
            .unwrap();
        let handler = SlowHandler {
            kind: ResourceKind::new("slow"),
        };

        let outcome = reconciler
            .reconcile(&spec("{}"), SyncStatus::new(), &handler, false)
            .await;

        assert_eq!(outcome.action, ReconcileAction::Create);
        assert_eq!(outcome.status.state(), SyncState::CreateError);
        assert_eq!(outcome.error.map(|e| e.kind), Some(ErrorKind::Transport));
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        let result = ReconcilerBuilder::new()
            .operation_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
