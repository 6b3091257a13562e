//! Core types for the reconciler.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ResourceError;

/// Tag selecting which handler manages a resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(String);

impl ResourceKind {
    /// Create a kind tag.
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    /// Get the tag as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a declared resource on the caller side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    /// Create a key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Identifier assigned by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// Wrap a remote identifier. Returns `None` for an empty string.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() { None } else { Some(Self(id)) }
    }

    /// Get the identifier as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RemoteId {
    type Error = &'static str;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        Self::new(id).ok_or("remote id must not be empty")
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The user's declared intent for one remote resource.
///
/// The payload is kind-specific JSON text; only the bound handler knows its
/// shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredSpec {
    #[serde(flatten)]
    pub key: ResourceKey,
    pub kind: ResourceKind,
    pub json_spec: String,
}

impl DeclaredSpec {
    /// Create a declared spec.
    pub fn new(key: ResourceKey, kind: ResourceKind, json_spec: impl Into<String>) -> Self {
        Self {
            key,
            kind,
            json_spec: json_spec.into(),
        }
    }

    /// Parse the payload into a kind-specific request body.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error when the payload does not match `T`.
    pub fn parse_payload<T: DeserializeOwned>(&self, what: &str) -> Result<T, ResourceError> {
        serde_json::from_str(&self.json_spec).map_err(|e| {
            ResourceError::validation(format!("invalid {what} in spec of {}: {e}", self.key))
        })
    }

    /// The payload as untyped JSON, if it parses.
    pub fn payload_value(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.json_spec).ok()
    }
}

/// A remote object as observed after a create, fetch or update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub id: String,
    /// Attribution reported by the remote, if any.
    pub creator: Option<String>,
    /// Observed state in the same JSON shape as the declared payload.
    pub payload: serde_json::Value,
}

impl RemoteObject {
    /// Create a remote object without attribution.
    pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            creator: None,
            payload,
        }
    }

    /// Set the creator.
    #[must_use]
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }
}

/// Action chosen for one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconcileAction {
    /// Nothing exists remotely yet.
    Create,
    /// Verify the remote object, recreating or updating as needed.
    ForceSync,
    /// Declared spec drifted from the last applied one.
    Update,
    /// Already converged; no remote call.
    Reconciled,
    /// Resource removed by the user.
    Delete,
}

impl ReconcileAction {
    /// Stable name used in logs.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::ForceSync => "force_sync",
            Self::Update => "update",
            Self::Reconciled => "reconciled",
            Self::Delete => "delete",
        }
    }

    /// Whether this action calls the remote API.
    #[inline]
    pub const fn touches_remote(self) -> bool {
        !matches!(self, Self::Reconciled)
    }
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
