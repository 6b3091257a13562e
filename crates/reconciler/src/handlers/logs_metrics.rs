//! Handler for log-based metrics.
//!
//! The declared payload is the create request body:
//!
//! ```json
//! {
//!   "data": {
//!     "id": "checkout.errors",
//!     "type": "logs_metrics",
//!     "attributes": {
//!       "compute": { "aggregation_type": "count" },
//!       "filter": { "query": "service:checkout status:error" },
//!       "group_by": [{ "path": "@http.status_code", "tag_name": "status_code" }]
//!     }
//!   }
//! }
//! ```
//!
//! Updates parse the same payload as an update request; fields that cannot
//! change after creation (`id`, `compute.aggregation_type`, `compute.path`)
//! are ignored there.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ResourceError;
use crate::handler::ResourceHandler;
use crate::translate::{RemoteFailure, translate};
use crate::types::{DeclaredSpec, RemoteId, RemoteObject, ResourceKind};

/// Kind tag of log-based metrics.
pub const LOGS_METRIC_KIND: &str = "logs_metric";

const LOGS_METRICS_TYPE: &str = "logs_metrics";

fn logs_metrics_type() -> String {
    LOGS_METRICS_TYPE.to_string()
}

/// How matching logs are aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    Count,
    Distribution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsMetricCompute {
    pub aggregation_type: AggregationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_percentiles: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsMetricFilter {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsMetricGroupBy {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsMetricCreateAttributes {
    pub compute: LogsMetricCompute,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<LogsMetricFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<LogsMetricGroupBy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsMetricCreateData {
    pub id: String,
    #[serde(rename = "type", default = "logs_metrics_type")]
    pub kind: String,
    pub attributes: LogsMetricCreateAttributes,
}

/// Body of a create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsMetricCreateRequest {
    pub data: LogsMetricCreateData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsMetricUpdateCompute {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_percentiles: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsMetricUpdateAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute: Option<LogsMetricUpdateCompute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<LogsMetricFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<LogsMetricGroupBy>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsMetricUpdateData {
    #[serde(rename = "type", default = "logs_metrics_type")]
    pub kind: String,
    pub attributes: LogsMetricUpdateAttributes,
}

/// Body of an update call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsMetricUpdateRequest {
    pub data: LogsMetricUpdateData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsMetricResponseData {
    pub id: String,
    #[serde(rename = "type", default = "logs_metrics_type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Value,
}

/// A logs metric as returned by the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsMetricResponse {
    pub data: LogsMetricResponseData,
}

impl LogsMetricResponse {
    fn into_remote_object(self) -> RemoteObject {
        let payload = serde_json::json!({
            "data": {
                "id": self.data.id,
                "type": self.data.kind,
                "attributes": self.data.attributes,
            }
        });
        RemoteObject::new(self.data.id, payload)
    }
}

/// Remote API for log-based metrics.
#[async_trait]
pub trait LogsMetricsApi: Send + Sync {
    async fn create_logs_metric(
        &self,
        body: &LogsMetricCreateRequest,
    ) -> Result<LogsMetricResponse, RemoteFailure>;

    async fn get_logs_metric(&self, metric_id: &str) -> Result<LogsMetricResponse, RemoteFailure>;

    async fn update_logs_metric(
        &self,
        metric_id: &str,
        body: &LogsMetricUpdateRequest,
    ) -> Result<LogsMetricResponse, RemoteFailure>;

    async fn delete_logs_metric(&self, metric_id: &str) -> Result<(), RemoteFailure>;
}

/// [`ResourceHandler`] for log-based metrics.
pub struct LogsMetricsHandler {
    kind: ResourceKind,
    client: Arc<dyn LogsMetricsApi>,
}

impl LogsMetricsHandler {
    /// Create a handler bound to a client.
    pub fn new(client: Arc<dyn LogsMetricsApi>) -> Self {
        Self {
            kind: ResourceKind::new(LOGS_METRIC_KIND),
            client,
        }
    }
}

/// Parse and check a create request.
///
/// # Errors
///
/// Returns a `Validation` error when the payload is malformed or has an
/// empty metric id.
pub fn parse_create_request(spec: &DeclaredSpec) -> Result<LogsMetricCreateRequest, ResourceError> {
    let request: LogsMetricCreateRequest = spec.parse_payload("logs metric create request")?;
    if request.data.id.trim().is_empty() {
        return Err(ResourceError::validation(format!(
            "logs metric in spec of {} has an empty id",
            spec.key
        )));
    }
    Ok(request)
}

/// Parse an update request.
///
/// # Errors
///
/// Returns a `Validation` error when the payload is malformed.
pub fn parse_update_request(spec: &DeclaredSpec) -> Result<LogsMetricUpdateRequest, ResourceError> {
    spec.parse_payload("logs metric update request")
}

#[async_trait]
impl ResourceHandler for LogsMetricsHandler {
    fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    async fn create(&self, spec: &DeclaredSpec) -> Result<RemoteObject, ResourceError> {
        let body = parse_create_request(spec)?;
        self.client
            .create_logs_metric(&body)
            .await
            .map(LogsMetricResponse::into_remote_object)
            .map_err(|e| translate(&e, "error creating logs metric"))
    }

    async fn fetch(&self, id: &RemoteId) -> Result<RemoteObject, ResourceError> {
        self.client
            .get_logs_metric(id.as_str())
            .await
            .map(LogsMetricResponse::into_remote_object)
            .map_err(|e| translate(&e, "error getting logs metric"))
    }

    async fn update(&self, id: &RemoteId, spec: &DeclaredSpec) -> Result<RemoteObject, ResourceError> {
        let body = parse_update_request(spec)?;
        self.client
            .update_logs_metric(id.as_str(), &body)
            .await
            .map(LogsMetricResponse::into_remote_object)
            .map_err(|e| translate(&e, "error updating logs metric"))
    }

    async fn delete(&self, id: &RemoteId) -> Result<(), ResourceError> {
        self.client
            .delete_logs_metric(id.as_str())
            .await
            .map_err(|e| translate(&e, "error deleting logs metric"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::error::ErrorKind;
    use crate::types::ResourceKey;

    const CREATE: &str = r#"{
        "data": {
            "id": "checkout.errors",
            "type": "logs_metrics",
            "attributes": {
                "compute": { "aggregation_type": "count" },
                "filter": { "query": "service:checkout status:error" },
                "group_by": [{ "path": "@http.status_code", "tag_name": "status_code" }]
            }
        }
    }"#;

    fn spec(json: &str) -> DeclaredSpec {
        DeclaredSpec::new(
            ResourceKey::new("monitoring", "checkout-errors"),
            ResourceKind::new(LOGS_METRIC_KIND),
            json,
        )
    }

    #[test]
    fn test_parse_create_request() {
        let request = parse_create_request(&spec(CREATE)).unwrap();
        assert_eq!(request.data.id, "checkout.errors");
        assert_eq!(
            request.data.attributes.compute.aggregation_type,
            AggregationType::Count
        );
        assert_eq!(request.data.attributes.group_by.len(), 1);
    }

    #[test]
    fn test_create_payload_parses_as_update() {
        let request = parse_update_request(&spec(CREATE)).unwrap();
        assert_eq!(
            request.data.attributes.filter.map(|f| f.query),
            Some("service:checkout status:error".to_string())
        );
        assert_eq!(
            request.data.attributes.compute,
            Some(LogsMetricUpdateCompute {
                include_percentiles: None
            })
        );
    }

    #[test]
    fn test_missing_compute_is_validation_error() {
        let err = parse_create_request(&spec(r#"{"data": {"id": "m", "attributes": {}}}"#))
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_blank_id_is_validation_error() {
        let json = r#"{"data": {"id": " ", "attributes": {"compute": {"aggregation_type": "count"}}}}"#;
        let err = parse_create_request(&spec(json)).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("empty id"));
    }

    #[test]
    fn test_unknown_aggregation_is_validation_error() {
        let json = r#"{"data": {"id": "m", "attributes": {"compute": {"aggregation_type": "sum"}}}}"#;
        assert!(parse_create_request(&spec(json)).is_err());
    }

    #[test]
    fn test_type_defaults() {
        let json = r#"{"data": {"id": "m", "attributes": {"compute": {"aggregation_type": "distribution", "path": "@duration"}}}}"#;
        let request = parse_create_request(&spec(json)).unwrap();
        assert_eq!(request.data.kind, "logs_metrics");
    }
}
