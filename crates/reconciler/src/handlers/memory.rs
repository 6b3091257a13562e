//! In-memory logs-metrics remote for testing.
//!
//! Behaves like the real API for the cases the engine cares about: duplicate
//! ids conflict, unknown ids are 404, updates replace the mutable attributes.
//! Failures can be queued to exercise error paths.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::handlers::logs_metrics::{
    LogsMetricCreateRequest, LogsMetricResponse, LogsMetricResponseData, LogsMetricUpdateRequest,
    LogsMetricsApi,
};
use crate::translate::RemoteFailure;

#[derive(Default)]
struct State {
    metrics: BTreeMap<String, LogsMetricResponseData>,
    failures: VecDeque<RemoteFailure>,
    calls: Vec<String>,
}

impl State {
    fn begin(&mut self, call: String) -> Result<(), RemoteFailure> {
        self.calls.push(call);
        self.failures.pop_front().map_or(Ok(()), Err)
    }

    fn missing(metric_id: &str) -> RemoteFailure {
        RemoteFailure::http(404, format!("logs metric '{metric_id}' not found"))
    }
}

/// In-memory logs-metrics API.
#[derive(Default)]
pub struct InMemoryLogsMetrics {
    state: Mutex<State>,
}

impl InMemoryLogsMetrics {
    /// Create an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call fail with `failure`. Queued failures are consumed
    /// in order.
    pub async fn inject_failure(&self, failure: RemoteFailure) {
        self.state.lock().await.failures.push_back(failure);
    }

    /// Delete a metric behind the reconciler's back.
    pub async fn delete_out_of_band(&self, metric_id: &str) -> bool {
        self.state.lock().await.metrics.remove(metric_id).is_some()
    }

    /// Overwrite a metric's attributes behind the reconciler's back.
    pub async fn edit_out_of_band(&self, metric_id: &str, attributes: Value) -> bool {
        self.state
            .lock()
            .await
            .metrics
            .get_mut(metric_id)
            .map(|metric| metric.attributes = attributes)
            .is_some()
    }

    /// Attributes of a stored metric.
    pub async fn attributes(&self, metric_id: &str) -> Option<Value> {
        self.state
            .lock()
            .await
            .metrics
            .get(metric_id)
            .map(|metric| metric.attributes.clone())
    }

    /// Number of stored metrics.
    pub async fn len(&self) -> usize {
        self.state.lock().await.metrics.len()
    }

    /// Whether no metrics are stored.
    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.metrics.is_empty()
    }

    /// Calls received so far, as `"<operation> <id>"`.
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }
}

fn merge_update(attributes: &mut Value, body: &LogsMetricUpdateRequest) -> Result<(), RemoteFailure> {
    let Value::Object(map) = attributes else {
        return Err(RemoteFailure::other("stored attributes are not an object"));
    };
    let update = &body.data.attributes;
    if let Some(filter) = &update.filter {
        map.insert("filter".to_string(), to_value(filter)?);
    }
    if let Some(group_by) = &update.group_by {
        map.insert("group_by".to_string(), to_value(group_by)?);
    }
    if let Some(percentiles) = update.compute.as_ref().and_then(|c| c.include_percentiles) {
        if let Some(Value::Object(compute)) = map.get_mut("compute") {
            compute.insert("include_percentiles".to_string(), Value::Bool(percentiles));
        }
    }
    Ok(())
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RemoteFailure> {
    serde_json::to_value(value).map_err(|e| RemoteFailure::other(e.to_string()))
}

#[async_trait]
impl LogsMetricsApi for InMemoryLogsMetrics {
    async fn create_logs_metric(
        &self,
        body: &LogsMetricCreateRequest,
    ) -> Result<LogsMetricResponse, RemoteFailure> {
        let mut state = self.state.lock().await;
        let id = body.data.id.clone();
        state.begin(format!("create {id}"))?;
        if state.metrics.contains_key(&id) {
            return Err(RemoteFailure::http(409, format!("logs metric '{id}' already exists"))
                .with_code("already_exists"));
        }
        let data = LogsMetricResponseData {
            id: id.clone(),
            kind: body.data.kind.clone(),
            attributes: to_value(&body.data.attributes)?,
        };
        state.metrics.insert(id, data.clone());
        Ok(LogsMetricResponse { data })
    }

    async fn get_logs_metric(&self, metric_id: &str) -> Result<LogsMetricResponse, RemoteFailure> {
        let mut state = self.state.lock().await;
        state.begin(format!("get {metric_id}"))?;
        state
            .metrics
            .get(metric_id)
            .cloned()
            .map(|data| LogsMetricResponse { data })
            .ok_or_else(|| State::missing(metric_id))
    }

    async fn update_logs_metric(
        &self,
        metric_id: &str,
        body: &LogsMetricUpdateRequest,
    ) -> Result<LogsMetricResponse, RemoteFailure> {
        let mut state = self.state.lock().await;
        state.begin(format!("update {metric_id}"))?;
        let metric = state
            .metrics
            .get_mut(metric_id)
            .ok_or_else(|| State::missing(metric_id))?;
        merge_update(&mut metric.attributes, body)?;
        Ok(LogsMetricResponse {
            data: metric.clone(),
        })
    }

    async fn delete_logs_metric(&self, metric_id: &str) -> Result<(), RemoteFailure> {
        let mut state = self.state.lock().await;
        state.begin(format!("delete {metric_id}"))?;
        state
            .metrics
            .remove(metric_id)
            .map(|_| ())
            .ok_or_else(|| State::missing(metric_id))
    }
}
