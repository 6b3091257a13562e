//! Resource store trait and implementations.
//!
//! The store is the caller-side home of declared specs and their persisted
//! statuses. The engine never touches it; the reconciliation loop reads a
//! snapshot per tick and writes statuses back.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::hash::spec_hash;
use crate::reconciler::{Clock, SystemClock};
use crate::status::SyncStatus;
use crate::types::{DeclaredSpec, ResourceKey};

/// A declared resource together with its persisted status.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResource {
    pub spec: DeclaredSpec,
    pub status: SyncStatus,
    /// The user removed the resource; the remote object must be deleted.
    pub deletion_requested: bool,
}

/// Trait for resource storage backends.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// All stored resources, ordered by key.
    async fn list(&self) -> Result<Vec<StoredResource>>;

    /// A single resource.
    async fn get(&self, key: &ResourceKey) -> Result<Option<StoredResource>>;

    /// Declare or re-declare a resource.
    async fn apply(&self, spec: DeclaredSpec) -> Result<()>;

    /// Request deletion of a resource and its remote counterpart.
    async fn request_delete(&self, key: &ResourceKey) -> Result<()>;

    /// Persist the status produced by a reconciliation pass.
    async fn save_status(&self, key: &ResourceKey, status: SyncStatus) -> Result<()>;

    /// Drop a resource whose remote counterpart is gone.
    async fn remove(&self, key: &ResourceKey) -> Result<()>;
}

/// In-memory resource store.
pub struct InMemoryResourceStore {
    resources: RwLock<BTreeMap<ResourceKey, StoredResource>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryResourceStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryResourceStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose pending marks use the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            resources: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Create a new in-memory store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored resources.
    pub async fn len(&self) -> usize {
        self.resources.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.resources.read().await.is_empty()
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn list(&self) -> Result<Vec<StoredResource>> {
        Ok(self.resources.read().await.values().cloned().collect())
    }

    async fn get(&self, key: &ResourceKey) -> Result<Option<StoredResource>> {
        Ok(self.resources.read().await.get(key).cloned())
    }

    async fn apply(&self, spec: DeclaredSpec) -> Result<()> {
        let now = self.clock.now();
        let mut resources = self.resources.write().await;
        match resources.get_mut(&spec.key) {
            Some(existing) if existing.deletion_requested => {
                Err(Error::deletion_pending(spec.key.to_string()))
            }
            Some(existing) => {
                if !existing.status.is_applied(&spec_hash(&spec)) {
                    existing.status.mark_update_pending(now);
                }
                existing.spec = spec;
                Ok(())
            }
            None => {
                let mut status = SyncStatus::new();
                status.mark_create_pending(now);
                resources.insert(
                    spec.key.clone(),
                    StoredResource {
                        spec,
                        status,
                        deletion_requested: false,
                    },
                );
                Ok(())
            }
        }
    }

    async fn request_delete(&self, key: &ResourceKey) -> Result<()> {
        let now = self.clock.now();
        let mut resources = self.resources.write().await;
        let resource = resources
            .get_mut(key)
            .ok_or_else(|| Error::resource_not_found(key.to_string()))?;
        resource.deletion_requested = true;
        resource.status.mark_delete_pending(now);
        Ok(())
    }

    async fn save_status(&self, key: &ResourceKey, status: SyncStatus) -> Result<()> {
        let mut resources = self.resources.write().await;
        let resource = resources
            .get_mut(key)
            .ok_or_else(|| Error::resource_not_found(key.to_string()))?;
        resource.status = status;
        Ok(())
    }

    async fn remove(&self, key: &ResourceKey) -> Result<()> {
        self.resources
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::resource_not_found(key.to_string()))
    }
}
