//! Continuous reconciliation loop.
//!
//! Each tick reconciles every stored resource exactly once. Ticks never
//! overlap, so at most one pass per resource is in flight; distinct resources
//! run concurrently up to `max_concurrent`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use syncer_core::ResultExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::handler::HandlerRegistry;
use crate::reconciler::{Clock, DeleteOutcome, Reconciler, SystemClock};
use crate::status::SyncStatus;
use crate::store::{ResourceStore, StoredResource};

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Interval between reconciliation cycles.
    pub interval: Duration,
    /// Age after which a created resource is force-resynced. `None` disables
    /// periodic forced resync.
    pub force_sync_period: Option<Duration>,
    /// Maximum passes in flight during one tick.
    pub max_concurrent: usize,
    /// Maximum consecutive tick errors before stopping.
    pub max_errors: usize,
    /// Whether to stop on first error.
    pub stop_on_error: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            force_sync_period: Some(Duration::from_secs(3600)),
            max_concurrent: 10,
            max_errors: 10,
            stop_on_error: false,
        }
    }
}

/// Whether a resource is due for a forced resync.
pub fn force_sync_due(status: &SyncStatus, now: DateTime<Utc>, period: Option<Duration>) -> bool {
    let Some(period) = period else {
        return false;
    };
    if status.remote_id().is_none() {
        return false;
    }
    status.last_force_sync_at().is_none_or(|last| {
        now.signed_duration_since(last)
            .to_std()
            .is_ok_and(|age| age >= period)
    })
}

/// What happened to one resource during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResult {
    /// Reconciled without error.
    Converged,
    /// The pass recorded an error in the status.
    Failed,
    /// The remote object was deleted and the record dropped.
    Deleted,
    /// No handler is bound to the resource's kind.
    Skipped,
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub converged: usize,
    pub failed: usize,
    pub deleted: usize,
    pub skipped: usize,
}

impl TickSummary {
    fn record(mut self, result: PassResult) -> Self {
        match result {
            PassResult::Converged => self.converged = self.converged.saturating_add(1),
            PassResult::Failed => self.failed = self.failed.saturating_add(1),
            PassResult::Deleted => self.deleted = self.deleted.saturating_add(1),
            PassResult::Skipped => self.skipped = self.skipped.saturating_add(1),
        }
        self
    }

    /// Total resources visited.
    pub fn total(&self) -> usize {
        self.converged
            .saturating_add(self.failed)
            .saturating_add(self.deleted)
            .saturating_add(self.skipped)
    }

    /// Whether every visited resource converged or was deleted.
    pub fn all_converged(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Continuous reconciliation loop.
pub struct ReconciliationLoop {
    reconciler: Arc<Reconciler>,
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn ResourceStore>,
    clock: Arc<dyn Clock>,
    config: LoopConfig,
    stop_rx: watch::Receiver<bool>,
    stop_tx: watch::Sender<bool>,
}

impl ReconciliationLoop {
    /// Create a new reconciliation loop.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero interval or zero concurrency.
    pub fn new(
        reconciler: Arc<Reconciler>,
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn ResourceStore>,
        config: LoopConfig,
    ) -> Result<Self> {
        if config.interval.is_zero() {
            return Err(Error::invalid_config("loop interval must be positive"));
        }
        if config.max_concurrent == 0 {
            return Err(Error::invalid_config("max_concurrent must be at least 1"));
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        Ok(Self {
            reconciler,
            registry,
            store,
            clock: Arc::new(SystemClock),
            config,
            stop_rx,
            stop_tx,
        })
    }

    /// Use a custom clock for force-sync scheduling.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run the reconciliation loop.
    ///
    /// This runs until stopped or max errors reached.
    ///
    /// # Errors
    ///
    /// Returns the tick error when `stop_on_error` is set, or
    /// `ReconcileFailed` after `max_errors` consecutive failed ticks.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            interval_ms = self.config.interval.as_millis(),
            max_concurrent = self.config.max_concurrent,
            "Starting reconciliation loop"
        );

        let mut consecutive_errors = 0usize;
        let mut interval = tokio::time::interval(self.config.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.reconcile_once().await {
                        Ok(summary) => {
                            consecutive_errors = 0;
                            if summary.all_converged() {
                                debug!(resources = summary.total(), "All resources converged");
                            }
                        }
                        Err(e) => {
                            consecutive_errors = consecutive_errors.saturating_add(1);
                            error!(
                                error = %e,
                                consecutive = consecutive_errors,
                                "Reconciliation error"
                            );

                            if self.config.stop_on_error {
                                return Err(e);
                            }

                            if consecutive_errors >= self.config.max_errors {
                                error!("Max errors reached, stopping loop");
                                return Err(Error::reconcile_failed(format!(
                                    "Max errors ({}) reached",
                                    self.config.max_errors
                                )));
                            }
                        }
                    }
                }
                _ = self.stop_rx.changed() => {
                    if *self.stop_rx.borrow() {
                        info!("Reconciliation loop stopped");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run a single reconciliation cycle over every stored resource.
    ///
    /// # Errors
    ///
    /// Fails only when the store cannot be listed; per-resource failures are
    /// recorded in their statuses and counted in the summary.
    pub async fn reconcile_once(&self) -> Result<TickSummary> {
        let resources = self.store.list().await?;
        let summary = stream::iter(resources)
            .map(|resource| self.process(resource))
            .buffer_unordered(self.config.max_concurrent)
            .fold(TickSummary::default(), |summary, result| async move {
                summary.record(result)
            })
            .await;

        info!(
            converged = summary.converged,
            failed = summary.failed,
            deleted = summary.deleted,
            skipped = summary.skipped,
            "Reconciliation tick complete"
        );
        Ok(summary)
    }

    async fn process(&self, resource: StoredResource) -> PassResult {
        let StoredResource {
            spec,
            status,
            deletion_requested,
        } = resource;

        let handler = match self.registry.get(&spec.kind) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(resource = %spec.key, error = %e, "Skipping resource");
                return PassResult::Skipped;
            }
        };

        if deletion_requested {
            return match self.reconciler.delete(status, handler.as_ref()).await {
                DeleteOutcome::Cleared => {
                    self.store
                        .remove(&spec.key)
                        .await
                        .into_option_logged("remove resource");
                    PassResult::Deleted
                }
                DeleteOutcome::Retained { status, .. } => {
                    self.store
                        .save_status(&spec.key, status)
                        .await
                        .into_option_logged("save status");
                    PassResult::Failed
                }
            };
        }

        let force_sync = force_sync_due(&status, self.clock.now(), self.config.force_sync_period);
        let before = status.clone();
        let outcome = self
            .reconciler
            .reconcile(&spec, status, handler.as_ref(), force_sync)
            .await;
        let succeeded = outcome.succeeded();

        if outcome.status != before {
            self.store
                .save_status(&spec.key, outcome.status)
                .await
                .into_option_logged("save status");
        }

        if succeeded {
            PassResult::Converged
        } else {
            PassResult::Failed
        }
    }

    /// Get a stopper handle.
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }
}

/// Handle to stop a reconciliation loop.
#[derive(Clone)]
pub struct LoopStopper {
    stop_tx: watch::Sender<bool>,
}

impl LoopStopper {
    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::hash::SpecHash;
    use crate::types::RemoteId;

    fn synced_at(at: DateTime<Utc>) -> SyncStatus {
        let hash: SpecHash = serde_json::from_value(serde_json::json!("00")).unwrap();
        SyncStatus::synced(RemoteId::new("abc").unwrap(), hash, at)
    }

    #[test]
    fn test_force_sync_due() {
        let t0 = Utc::now();
        let period = Some(Duration::from_secs(60));
        let status = synced_at(t0);

        assert!(!force_sync_due(&status, t0 + chrono::Duration::seconds(59), period));
        assert!(force_sync_due(&status, t0 + chrono::Duration::seconds(60), period));
        assert!(!force_sync_due(&status, t0 + chrono::Duration::days(1), None));
        assert!(!force_sync_due(&SyncStatus::new(), t0, period));
    }

    #[test]
    fn test_clock_skew_does_not_force_sync() {
        let t0 = Utc::now();
        let status = synced_at(t0);
        let earlier = t0 - chrono::Duration::seconds(30);
        assert!(!force_sync_due(&status, earlier, Some(Duration::from_secs(1))));
    }

    #[test]
    fn test_tick_summary() {
        let summary = TickSummary::default()
            .record(PassResult::Converged)
            .record(PassResult::Deleted)
            .record(PassResult::Failed);
        assert_eq!(summary.total(), 3);
        assert!(!summary.all_converged());
    }

    #[test]
    fn test_new_rejects_zero_interval() {
        let result = ReconciliationLoop::new(
            Arc::new(Reconciler::default()),
            Arc::new(HandlerRegistry::new()),
            Arc::new(crate::store::InMemoryResourceStore::new()),
            LoopConfig {
                interval: Duration::ZERO,
                ..LoopConfig::default()
            },
        );
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_stopper_ends_run() {
        let mut reconciliation_loop = ReconciliationLoop::new(
            Arc::new(Reconciler::default()),
            Arc::new(HandlerRegistry::new()),
            Arc::new(crate::store::InMemoryResourceStore::new()),
            LoopConfig {
                interval: Duration::from_millis(10),
                ..LoopConfig::default()
            },
        )
        .unwrap();
        let stopper = reconciliation_loop.stopper();

        let handle = tokio::spawn(async move { reconciliation_loop.run().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        stopper.stop();

        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }
}
