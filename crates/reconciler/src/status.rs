//! Persisted sync status of a declared resource.
//!
//! Fields are private. The engine moves a status between states only through
//! the transition methods below, which keep these invariants:
//!
//! - a remote id is present iff the state is not pre-create
//!   (`Unknown`, `CreatePending`, `CreateError`);
//! - `last_error` is present iff the state is an error state;
//! - `current_hash` changes only when a create or update succeeded.
//!
//! Records read back from storage can be checked with
//! [`SyncStatus::check_invariants`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, ResourceError, Result};
use crate::hash::SpecHash;
use crate::types::{RemoteId, RemoteObject};

/// Sync state of a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncState {
    #[default]
    Unknown,
    #[serde(rename = "OK")]
    Ok,
    CreatePending,
    CreateError,
    UpdatePending,
    UpdateError,
    DeletePending,
    DeleteError,
    Conflict,
}

impl SyncState {
    /// Stable name used in logs and persisted status.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Ok => "OK",
            Self::CreatePending => "CreatePending",
            Self::CreateError => "CreateError",
            Self::UpdatePending => "UpdatePending",
            Self::UpdateError => "UpdateError",
            Self::DeletePending => "DeletePending",
            Self::DeleteError => "DeleteError",
            Self::Conflict => "Conflict",
        }
    }

    /// States in which nothing has been created remotely.
    #[inline]
    pub const fn is_pre_create(self) -> bool {
        matches!(self, Self::Unknown | Self::CreatePending | Self::CreateError)
    }

    /// States that carry a `last_error`.
    #[inline]
    pub const fn is_error(self) -> bool {
        matches!(
            self,
            Self::CreateError | Self::UpdateError | Self::DeleteError | Self::Conflict
        )
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync status record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncStatus {
    #[serde(deserialize_with = "empty_as_none")]
    remote_id: Option<RemoteId>,
    created_at: Option<DateTime<Utc>>,
    last_force_sync_at: Option<DateTime<Utc>>,
    creator: String,
    sync_status: SyncState,
    current_hash: Option<SpecHash>,
    last_error: Option<ResourceError>,
    last_transition_at: Option<DateTime<Utc>>,
}

/// Records written before creation carry `"remoteId": ""`.
fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<RemoteId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.and_then(RemoteId::new))
}

impl SyncStatus {
    /// An empty status for a resource seen for the first time.
    pub fn new() -> Self {
        Self::default()
    }

    /// The status of a resource whose spec `hash` was applied to `remote_id`
    /// at `now`. Used to seed state imported from elsewhere.
    pub fn synced(remote_id: RemoteId, hash: SpecHash, now: DateTime<Utc>) -> Self {
        Self {
            remote_id: Some(remote_id),
            created_at: Some(now),
            last_force_sync_at: Some(now),
            creator: String::new(),
            sync_status: SyncState::Ok,
            current_hash: Some(hash),
            last_error: None,
            last_transition_at: Some(now),
        }
    }

    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn last_force_sync_at(&self) -> Option<DateTime<Utc>> {
        self.last_force_sync_at
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn state(&self) -> SyncState {
        self.sync_status
    }

    pub fn current_hash(&self) -> Option<&SpecHash> {
        self.current_hash.as_ref()
    }

    pub fn last_error(&self) -> Option<&ResourceError> {
        self.last_error.as_ref()
    }

    pub fn last_transition_at(&self) -> Option<DateTime<Utc>> {
        self.last_transition_at
    }

    /// Whether the applied hash equals `hash`.
    #[inline]
    pub fn is_applied(&self, hash: &SpecHash) -> bool {
        self.current_hash.as_ref() == Some(hash)
    }

    fn set_state(&mut self, state: SyncState, now: DateTime<Utc>) {
        if self.sync_status != state {
            self.sync_status = state;
            self.last_transition_at = Some(now);
        }
    }

    /// Mark a resource that has never been created as waiting for creation.
    /// Returns whether the state changed.
    pub fn mark_create_pending(&mut self, now: DateTime<Utc>) -> bool {
        self.mark_pending(SyncState::CreatePending, false, now)
    }

    /// Mark a created resource as waiting for an update.
    pub fn mark_update_pending(&mut self, now: DateTime<Utc>) -> bool {
        self.mark_pending(SyncState::UpdatePending, true, now)
    }

    /// Mark a created resource as waiting for deletion.
    pub fn mark_delete_pending(&mut self, now: DateTime<Utc>) -> bool {
        self.mark_pending(SyncState::DeletePending, true, now)
    }

    fn mark_pending(&mut self, state: SyncState, needs_remote: bool, now: DateTime<Utc>) -> bool {
        if self.remote_id.is_some() != needs_remote || self.sync_status == state {
            return false;
        }
        self.last_error = None;
        self.set_state(state, now);
        true
    }

    /// A create succeeded: adopt the remote id and the applied hash.
    pub(crate) fn record_created(
        &mut self,
        remote_id: RemoteId,
        remote: &RemoteObject,
        hash: SpecHash,
        now: DateTime<Utc>,
    ) {
        self.remote_id = Some(remote_id);
        self.created_at = Some(now);
        self.last_force_sync_at = Some(now);
        self.creator = remote.creator.clone().unwrap_or_default();
        self.current_hash = Some(hash);
        self.last_error = None;
        self.set_state(SyncState::Ok, now);
    }

    /// An update succeeded.
    pub(crate) fn record_applied(&mut self, hash: SpecHash, now: DateTime<Utc>) {
        self.current_hash = Some(hash);
        self.last_error = None;
        self.set_state(SyncState::Ok, now);
    }

    /// A forced resync found the remote object matching the applied spec.
    pub(crate) fn record_confirmed(&mut self, now: DateTime<Utc>) {
        self.last_error = None;
        self.set_state(SyncState::Ok, now);
    }

    /// A forced resync fetched the remote object.
    pub(crate) fn record_force_synced(&mut self, now: DateTime<Utc>) {
        self.last_force_sync_at = Some(now);
    }

    /// A create failed. The resource is back in a pre-create state; any
    /// stale remote id (from an object deleted out-of-band) is dropped.
    pub(crate) fn record_create_failed(&mut self, error: ResourceError, now: DateTime<Utc>) {
        self.remote_id = None;
        self.created_at = None;
        self.last_error = Some(error);
        self.set_state(SyncState::CreateError, now);
    }

    /// An update (or the fetch preceding it) failed.
    pub(crate) fn record_update_failed(&mut self, error: ResourceError, now: DateTime<Utc>) {
        self.last_error = Some(error);
        self.set_state(SyncState::UpdateError, now);
    }

    /// A delete failed; the record is kept for retry.
    pub(crate) fn record_delete_failed(&mut self, error: ResourceError, now: DateTime<Utc>) {
        self.last_error = Some(error);
        self.set_state(SyncState::DeleteError, now);
    }

    /// Validate a record, typically one read back from storage.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStatus` naming the violated invariant.
    pub fn check_invariants(&self) -> Result<()> {
        let state = self.sync_status;
        if state.is_pre_create() == self.remote_id.is_some() {
            return Err(Error::invalid_status(format!(
                "state {state} with remote id {:?}",
                self.remote_id.as_ref().map(RemoteId::as_str)
            )));
        }
        if state.is_error() != self.last_error.is_some() {
            return Err(Error::invalid_status(format!(
                "state {state} with last error {:?}",
                self.last_error.as_ref().map(|e| e.kind)
            )));
        }
        if state == SyncState::Ok && self.current_hash.is_none() {
            return Err(Error::invalid_status("state OK without an applied hash"));
        }
        Ok(())
    }
}
