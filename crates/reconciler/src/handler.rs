//! Resource handler trait, registry and tracing decorator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, ResourceError, Result};
use crate::types::{DeclaredSpec, RemoteId, RemoteObject, ResourceKind};

/// Create/fetch/update/delete against one remote resource kind.
///
/// Implementations hold only their injected client; they keep no per-call
/// state and must be safe to call concurrently for distinct resources. Every
/// failure is returned already translated into a [`ResourceError`].
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// The kind this handler manages.
    fn kind(&self) -> &ResourceKind;

    /// Create the remote object described by `spec`.
    ///
    /// A payload that does not parse is a `Validation` error.
    async fn create(&self, spec: &DeclaredSpec) -> std::result::Result<RemoteObject, ResourceError>;

    /// Fetch the remote object. A missing object is `NotFound`.
    async fn fetch(&self, id: &RemoteId) -> std::result::Result<RemoteObject, ResourceError>;

    /// Replace the remote object with the state described by `spec`.
    async fn update(
        &self,
        id: &RemoteId,
        spec: &DeclaredSpec,
    ) -> std::result::Result<RemoteObject, ResourceError>;

    /// Delete the remote object.
    async fn delete(&self, id: &RemoteId) -> std::result::Result<(), ResourceError>;

    /// Whether the observed remote state still matches the declared spec.
    ///
    /// The default requires every field of the declared payload to be present
    /// with an equal value in the observed payload; fields the remote adds on
    /// its own are ignored.
    fn matches(&self, spec: &DeclaredSpec, remote: &RemoteObject) -> bool {
        spec.payload_value()
            .is_some_and(|desired| json_contains(&remote.payload, &desired))
    }
}

/// Whether `observed` contains everything in `desired`.
///
/// Objects match by key subset, arrays element-wise with equal length,
/// scalars by equality.
pub fn json_contains(observed: &Value, desired: &Value) -> bool {
    match (observed, desired) {
        (Value::Object(have), Value::Object(want)) => want
            .iter()
            .all(|(k, v)| have.get(k).is_some_and(|h| json_contains(h, v))),
        (Value::Array(have), Value::Array(want)) => {
            have.len() == want.len() && have.iter().zip(want).all(|(h, w)| json_contains(h, w))
        }
        (have, want) => have == want,
    }
}

/// Registry of handlers keyed by resource kind.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ResourceKind, Arc<dyn ResourceHandler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own kind, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn ResourceHandler>) {
        self.handlers.insert(handler.kind().clone(), handler);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, handler: Arc<dyn ResourceHandler>) -> Self {
        self.register(handler);
        self
    }

    /// Get the handler bound to a kind.
    ///
    /// # Errors
    ///
    /// Returns `HandlerNotRegistered` for an unknown kind.
    pub fn get(&self, kind: &ResourceKind) -> Result<Arc<dyn ResourceHandler>> {
        self.handlers
            .get(kind)
            .cloned()
            .ok_or_else(|| Error::handler_not_registered(kind.as_str()))
    }

    /// Check if a handler exists for the given kind.
    pub fn has(&self, kind: &ResourceKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Get all registered kinds.
    pub fn kinds(&self) -> Vec<&ResourceKind> {
        self.handlers.keys().collect()
    }

    /// Get the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// A wrapper that adds tracing to a handler.
pub struct TracingHandler<H: ResourceHandler> {
    inner: H,
}

impl<H: ResourceHandler> TracingHandler<H> {
    /// Create a new tracing handler.
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

fn trace_result<T>(
    operation: &'static str,
    kind: &ResourceKind,
    result: std::result::Result<T, ResourceError>,
) -> std::result::Result<T, ResourceError> {
    match &result {
        Ok(_) => tracing::trace!(operation, kind = %kind, "Handler call succeeded"),
        Err(e) => tracing::debug!(
            operation,
            kind = %kind,
            error_kind = %e.kind,
            error = %e.message,
            "Handler call failed"
        ),
    }
    result
}

#[async_trait]
impl<H: ResourceHandler> ResourceHandler for TracingHandler<H> {
    fn kind(&self) -> &ResourceKind {
        self.inner.kind()
    }

    async fn create(&self, spec: &DeclaredSpec) -> std::result::Result<RemoteObject, ResourceError> {
        tracing::debug!(kind = %self.kind(), resource = %spec.key, "Creating remote object");
        trace_result("create", self.kind(), self.inner.create(spec).await)
    }

    async fn fetch(&self, id: &RemoteId) -> std::result::Result<RemoteObject, ResourceError> {
        tracing::debug!(kind = %self.kind(), remote_id = %id, "Fetching remote object");
        trace_result("fetch", self.kind(), self.inner.fetch(id).await)
    }

    async fn update(
        &self,
        id: &RemoteId,
        spec: &DeclaredSpec,
    ) -> std::result::Result<RemoteObject, ResourceError> {
        tracing::debug!(
            kind = %self.kind(),
            resource = %spec.key,
            remote_id = %id,
            "Updating remote object"
        );
        trace_result("update", self.kind(), self.inner.update(id, spec).await)
    }

    async fn delete(&self, id: &RemoteId) -> std::result::Result<(), ResourceError> {
        tracing::debug!(kind = %self.kind(), remote_id = %id, "Deleting remote object");
        trace_result("delete", self.kind(), self.inner.delete(id).await)
    }

    fn matches(&self, spec: &DeclaredSpec, remote: &RemoteObject) -> bool {
        self.inner.matches(spec, remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticHandler {
        kind: ResourceKind,
    }

    #[async_trait]
    impl ResourceHandler for StaticHandler {
        fn kind(&self) -> &ResourceKind {
            &self.kind
        }

        async fn create(
            &self,
            spec: &DeclaredSpec,
        ) -> std::result::Result<RemoteObject, ResourceError> {
            Ok(RemoteObject::new("id-1", spec.payload_value().unwrap_or(Value::Null)))
        }

        async fn fetch(&self, _id: &RemoteId) -> std::result::Result<RemoteObject, ResourceError> {
            Err(ResourceError::not_found("missing"))
        }

        async fn update(
            &self,
            id: &RemoteId,
            spec: &DeclaredSpec,
        ) -> std::result::Result<RemoteObject, ResourceError> {
            Ok(RemoteObject::new(id.as_str(), spec.payload_value().unwrap_or(Value::Null)))
        }

        async fn delete(&self, _id: &RemoteId) -> std::result::Result<(), ResourceError> {
            Ok(())
        }
    }

    #[test]
    fn test_json_contains_subset() {
        let observed = json!({"a": 1, "b": {"c": [1, {"d": true, "e": 2}]}, "extra": "x"});
        assert!(json_contains(&observed, &json!({"b": {"c": [1, {"d": true}]}})));
        assert!(!json_contains(&observed, &json!({"a": 2})));
        assert!(!json_contains(&observed, &json!({"missing": 1})));
        assert!(!json_contains(&observed, &json!({"b": {"c": [1]}})));
    }

    #[test]
    fn test_default_matches_rejects_unparseable_spec() {
        let handler = StaticHandler {
            kind: ResourceKind::new("static"),
        };
        let spec = DeclaredSpec::new(
            crate::types::ResourceKey::new("ns", "n"),
            ResourceKind::new("static"),
            "{broken",
        );
        assert!(!handler.matches(&spec, &RemoteObject::new("x", json!({}))));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = HandlerRegistry::new().with(Arc::new(StaticHandler {
            kind: ResourceKind::new("static"),
        }));
        assert_eq!(registry.len(), 1);
        assert!(registry.has(&ResourceKind::new("static")));
        assert!(registry.get(&ResourceKind::new("static")).is_ok());
        assert!(matches!(
            registry.get(&ResourceKind::new("monitor")),
            Err(Error::HandlerNotRegistered { .. })
        ));
    }

    #[tokio::test]
    async fn test_tracing_handler_delegates() {
        let handler = TracingHandler::new(StaticHandler {
            kind: ResourceKind::new("static"),
        });
        let id = RemoteId::new("id-1");
        assert!(id.is_some());
        if let Some(id) = id {
            let result = handler.fetch(&id).await;
            assert!(matches!(result, Err(ref e) if e.is_not_found()));
            assert!(handler.delete(&id).await.is_ok());
        }
        assert_eq!(handler.kind().as_str(), "static");
    }
}
