//! Persisted statuses between runs.
//!
//! The state file is a JSON array of `{spec, status, deletionRequested}`
//! records. On startup the manifest is merged with it: declared resources get
//! their previous status back, and resources that vanished from the manifest
//! are queued for deletion of their remote counterpart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use syncer_core::TapResult;
use syncer_reconciler::{DeclaredSpec, ResourceKey, ResourceStore, StoredResource, SyncStatus};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from loading, saving or replaying state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    File(#[from] syncer_core::Error),

    #[error(transparent)]
    Store(#[from] syncer_reconciler::Error),
}

/// One persisted resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEntry {
    pub spec: DeclaredSpec,
    pub status: SyncStatus,
    #[serde(default)]
    pub deletion_requested: bool,
}

impl From<StoredResource> for StateEntry {
    fn from(resource: StoredResource) -> Self {
        Self {
            spec: resource.spec,
            status: resource.status,
            deletion_requested: resource.deletion_requested,
        }
    }
}

/// JSON state file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted entries. A missing file is an empty state.
    ///
    /// # Errors
    ///
    /// Returns `FileReadFailed` or `JsonParseFailed`.
    pub fn load(&self) -> Result<Vec<StateEntry>, StateError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No state file yet");
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| syncer_core::Error::file_read_failed(&self.path, e.to_string()))?;
        let entries = serde_json::from_str(&text)
            .map_err(|e| syncer_core::Error::json_parse_failed(e.to_string()))?;
        Ok(entries)
    }

    /// Write entries, replacing the file atomically.
    ///
    /// # Errors
    ///
    /// Returns `FileWriteFailed`.
    pub fn save(&self, entries: &[StateEntry]) -> Result<(), StateError> {
        let write_failed =
            |e: &dyn std::fmt::Display| syncer_core::Error::file_write_failed(&self.path, e.to_string());
        let text = serde_json::to_string_pretty(entries).map_err(|e| write_failed(&e))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(|e| write_failed(&e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| write_failed(&e))?;
        Ok(())
    }

    /// Save a snapshot of every stored resource.
    ///
    /// # Errors
    ///
    /// Returns the store's listing error or `FileWriteFailed`.
    pub async fn snapshot(&self, store: &dyn ResourceStore) -> Result<usize, StateError> {
        let entries: Vec<StateEntry> = store.list().await?.into_iter().map(Into::into).collect();
        self.save(&entries)
            .map(|()| entries.len())
            .tap_ok(|count| debug!(path = %self.path.display(), resources = count, "Saved state"))
            .tap_err(|e| warn!(path = %self.path.display(), error = %e, "Failed to save state"))
    }
}

/// Outcome of [`seed_store`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Declared resources.
    pub declared: usize,
    /// Declared resources whose previous status was restored.
    pub restored: usize,
    /// Previously created resources no longer declared, queued for deletion.
    pub orphaned: usize,
}

/// Fill a store from the manifest and the previous state.
///
/// Corrupt status records are dropped with a warning; the resource then
/// starts from a fresh status.
///
/// # Errors
///
/// Returns the first store error.
pub async fn seed_store(
    store: &dyn ResourceStore,
    manifest: Vec<DeclaredSpec>,
    previous: Vec<StateEntry>,
) -> Result<SeedSummary, StateError> {
    let mut previous: BTreeMap<ResourceKey, StateEntry> = previous
        .into_iter()
        .filter(|entry| match entry.status.check_invariants() {
            Ok(()) => true,
            Err(e) => {
                warn!(resource = %entry.spec.key, error = %e, "Dropping invalid persisted status");
                false
            }
        })
        .map(|entry| (entry.spec.key.clone(), entry))
        .collect();

    let mut summary = SeedSummary::default();
    for spec in manifest {
        let key = spec.key.clone();
        summary.declared = summary.declared.saturating_add(1);
        store.apply(spec.clone()).await?;
        if let Some(entry) = previous.remove(&key) {
            store.save_status(&key, entry.status).await?;
            // Re-applying marks drift between the persisted and declared spec.
            store.apply(spec).await?;
            summary.restored = summary.restored.saturating_add(1);
        }
    }

    for (key, entry) in previous {
        if entry.status.remote_id().is_none() {
            continue;
        }
        info!(resource = %key, "Resource no longer declared, scheduling deletion");
        store.apply(entry.spec).await?;
        store.save_status(&key, entry.status).await?;
        store.request_delete(&key).await?;
        summary.orphaned = summary.orphaned.saturating_add(1);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use chrono::Utc;
    use syncer_reconciler::{InMemoryResourceStore, RemoteId, ResourceKind, SyncState, spec_hash};

    fn spec(name: &str, json: &str) -> DeclaredSpec {
        DeclaredSpec::new(
            ResourceKey::new("monitoring", name),
            ResourceKind::new("logs_metric"),
            json,
        )
    }

    fn synced_entry(name: &str, json: &str) -> StateEntry {
        let declared = spec(name, json);
        StateEntry {
            status: SyncStatus::synced(
                RemoteId::new(format!("{name}-id")).unwrap(),
                spec_hash(&declared),
                Utc::now(),
            ),
            spec: declared,
            deletion_requested: false,
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateFile::new(dir.path().join("state.json"));
        assert!(state.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateFile::new(dir.path().join("state.json"));
        let entries = vec![synced_entry("a", "{}")];

        state.save(&entries).unwrap();
        assert_eq!(state.load().unwrap(), entries);
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "[{").unwrap();
        let result = StateFile::new(path).load();
        assert!(matches!(
            result,
            Err(StateError::File(syncer_core::Error::JsonParseFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_seed_restores_status() {
        let store = InMemoryResourceStore::new();
        let previous = vec![synced_entry("a", r#"{"x": 1}"#)];

        let summary = seed_store(&store, vec![spec("a", r#"{"x": 1}"#)], previous)
            .await
            .unwrap();

        assert_eq!(summary.restored, 1);
        let stored = store.get(&ResourceKey::new("monitoring", "a")).await.unwrap().unwrap();
        assert_eq!(stored.status.state(), SyncState::Ok);
        assert_eq!(stored.status.remote_id().map(RemoteId::as_str), Some("a-id"));
    }

    #[tokio::test]
    async fn test_seed_marks_changed_spec() {
        let store = InMemoryResourceStore::new();
        let previous = vec![synced_entry("a", r#"{"x": 1}"#)];

        seed_store(&store, vec![spec("a", r#"{"x": 2}"#)], previous)
            .await
            .unwrap();

        let stored = store.get(&ResourceKey::new("monitoring", "a")).await.unwrap().unwrap();
        assert_eq!(stored.status.state(), SyncState::UpdatePending);
    }

    #[tokio::test]
    async fn test_seed_schedules_orphans_for_deletion() {
        let store = InMemoryResourceStore::new();
        let previous = vec![synced_entry("gone", "{}")];

        let summary = seed_store(&store, vec![spec("a", "{}")], previous).await.unwrap();

        assert_eq!(
            summary,
            SeedSummary {
                declared: 1,
                restored: 0,
                orphaned: 1
            }
        );
        let orphan = store
            .get(&ResourceKey::new("monitoring", "gone"))
            .await
            .unwrap()
            .unwrap();
        assert!(orphan.deletion_requested);
        assert_eq!(orphan.status.state(), SyncState::DeletePending);
    }

    #[tokio::test]
    async fn test_seed_drops_invalid_status() {
        let store = InMemoryResourceStore::new();
        let mut entry = synced_entry("a", "{}");
        entry.status = serde_json::from_value(serde_json::json!({
            "remoteId": "a-id",
            "syncStatus": "CreatePending"
        }))
        .unwrap();

        let summary = seed_store(&store, vec![spec("a", "{}")], vec![entry]).await.unwrap();

        assert_eq!(summary.restored, 0);
        let stored = store.get(&ResourceKey::new("monitoring", "a")).await.unwrap().unwrap();
        assert!(stored.status.remote_id().is_none());
    }
}
