//! HTTP client for the logs-metrics management API.
//!
//! Endpoints, relative to `api.base_url`:
//!
//! - `POST   /api/v2/logs/config/metrics`
//! - `GET    /api/v2/logs/config/metrics/{id}`
//! - `PATCH  /api/v2/logs/config/metrics/{id}`
//! - `DELETE /api/v2/logs/config/metrics/{id}`
//!
//! Every non-2xx response becomes an HTTP [`RemoteFailure`] carrying the
//! status and the messages of the `{"errors": [...]}` body; connection
//! failures and timeouts become transport failures.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use syncer_core::{ApiSettings, Error, Result};
use syncer_reconciler::RemoteFailure;
use syncer_reconciler::handlers::LogsMetricsApi;
use syncer_reconciler::handlers::logs_metrics::{
    LogsMetricCreateRequest, LogsMetricResponse, LogsMetricUpdateRequest,
};
use tracing::debug;
use url::Url;

const METRICS_PATH: [&str; 5] = ["api", "v2", "logs", "config", "metrics"];

/// reqwest-backed [`LogsMetricsApi`].
#[derive(Debug, Clone)]
pub struct HttpLogsMetricsClient {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpLogsMetricsClient {
    /// Create a client sending the configured headers with every request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a bad base URL, an invalid header, or a
    /// client that cannot be built.
    pub fn new(settings: &ApiSettings, timeout: Duration) -> Result<Self> {
        let base_url = settings.url()?;
        if base_url.cannot_be_a_base() {
            return Err(Error::invalid_config(format!(
                "api.base_url '{base_url}' cannot carry a path"
            )));
        }

        let headers = settings
            .headers
            .iter()
            .map(|(name, value)| {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| Error::invalid_config(format!("header name '{name}': {e}")))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| Error::invalid_config(format!("header '{name}' value: {e}")))?;
                Ok((name, value))
            })
            .collect::<Result<HeaderMap>>()?;

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::invalid_config(format!("HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    /// URL of the metrics collection, or of one metric.
    fn metrics_url(&self, metric_id: Option<&str>) -> std::result::Result<Url, RemoteFailure> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| RemoteFailure::other("base URL cannot carry a path"))?;
            segments.pop_if_empty().extend(METRICS_PATH);
            if let Some(id) = metric_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, RemoteFailure> {
        let response = request.send().await.map_err(request_failure)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "Remote call rejected");
        Err(RemoteFailure::http(status.as_u16(), error_message(status.as_u16(), &body)))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, RemoteFailure> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| RemoteFailure::other(format!("decoding response: {e}")))
    }
}

fn request_failure(error: reqwest::Error) -> RemoteFailure {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        RemoteFailure::transport(error.to_string())
    } else {
        RemoteFailure::other(error.to_string())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    errors: Vec<String>,
}

/// Human-readable message of an error response.
fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        _ if body.trim().is_empty() => format!("HTTP {status}"),
        _ => body.trim().to_string(),
    }
}

#[async_trait]
impl LogsMetricsApi for HttpLogsMetricsClient {
    async fn create_logs_metric(
        &self,
        body: &LogsMetricCreateRequest,
    ) -> std::result::Result<LogsMetricResponse, RemoteFailure> {
        let url = self.metrics_url(None)?;
        self.send_json(self.http_client.post(url).json(body)).await
    }

    async fn get_logs_metric(
        &self,
        metric_id: &str,
    ) -> std::result::Result<LogsMetricResponse, RemoteFailure> {
        let url = self.metrics_url(Some(metric_id))?;
        self.send_json(self.http_client.get(url)).await
    }

    async fn update_logs_metric(
        &self,
        metric_id: &str,
        body: &LogsMetricUpdateRequest,
    ) -> std::result::Result<LogsMetricResponse, RemoteFailure> {
        let url = self.metrics_url(Some(metric_id))?;
        self.send_json(self.http_client.patch(url).json(body)).await
    }

    async fn delete_logs_metric(&self, metric_id: &str) -> std::result::Result<(), RemoteFailure> {
        let url = self.metrics_url(Some(metric_id))?;
        self.send(self.http_client.delete(url)).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use syncer_reconciler::{ErrorKind, classify};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: &str) -> ApiSettings {
        ApiSettings {
            base_url: base_url.to_string(),
            headers: BTreeMap::from([("DD-API-KEY".to_string(), "secret".to_string())]),
        }
    }

    fn client(server: &MockServer) -> HttpLogsMetricsClient {
        HttpLogsMetricsClient::new(&settings(&server.uri()), Duration::from_secs(5)).unwrap()
    }

    fn metric_json(query: &str) -> serde_json::Value {
        json!({
            "data": {
                "id": "checkout.errors",
                "type": "logs_metrics",
                "attributes": {
                    "compute": { "aggregation_type": "count" },
                    "filter": { "query": query }
                }
            }
        })
    }

    #[test]
    fn test_metrics_url_keeps_base_path() {
        let client =
            HttpLogsMetricsClient::new(&settings("https://api.example.com/proxy/"), Duration::from_secs(1))
                .unwrap();
        assert_eq!(
            client.metrics_url(Some("a b")).unwrap().as_str(),
            "https://api.example.com/proxy/api/v2/logs/config/metrics/a%20b"
        );
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut api = settings("https://api.example.com");
        api.headers.insert("bad header".to_string(), "x".to_string());
        assert!(matches!(
            HttpLogsMetricsClient::new(&api, Duration::from_secs(1)),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(400, r#"{"errors": ["bad query", "bad path"]}"#),
            "bad query; bad path"
        );
        assert_eq!(error_message(502, ""), "HTTP 502");
        assert_eq!(error_message(500, "oops\n"), "oops");
    }

    #[tokio::test]
    async fn test_create_posts_body_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/logs/config/metrics"))
            .and(header("DD-API-KEY", "secret"))
            .and(body_partial_json(json!({"data": {"id": "checkout.errors"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(metric_json("status:error")))
            .expect(1)
            .mount(&server)
            .await;

        let body: LogsMetricCreateRequest =
            serde_json::from_value(metric_json("status:error")).unwrap();
        let response = client(&server).create_logs_metric(&body).await.unwrap();

        assert_eq!(response.data.id, "checkout.errors");
        assert_eq!(response.data.attributes["filter"]["query"], "status:error");
    }

    #[tokio::test]
    async fn test_get_missing_metric_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/logs/config/metrics/ghost"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": ["Not found"]})))
            .mount(&server)
            .await;

        let failure = client(&server).get_logs_metric("ghost").await.unwrap_err();

        assert_eq!(failure.status, Some(404));
        assert_eq!(failure.message, "Not found");
        assert_eq!(classify(&failure), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_update_patches_metric() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/api/v2/logs/config/metrics/checkout.errors"))
            .and(body_partial_json(json!({"data": {"attributes": {"filter": {"query": "status:warn"}}}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(metric_json("status:warn")))
            .expect(1)
            .mount(&server)
            .await;

        let body: LogsMetricUpdateRequest =
            serde_json::from_value(metric_json("status:warn")).unwrap();
        let response = client(&server)
            .update_logs_metric("checkout.errors", &body)
            .await
            .unwrap();

        assert_eq!(response.data.attributes["filter"]["query"], "status:warn");
    }

    #[tokio::test]
    async fn test_delete_accepts_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v2/logs/config/metrics/checkout.errors"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client(&server).delete_logs_metric("checkout.errors").await.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limit_classified() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let failure = client(&server).delete_logs_metric("m").await.unwrap_err();
        assert_eq!(classify(&failure), ErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn test_timeout_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(metric_json("*"))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client =
            HttpLogsMetricsClient::new(&settings(&server.uri()), Duration::from_millis(100)).unwrap();
        let failure = client.get_logs_metric("m").await.unwrap_err();

        assert!(failure.transport);
        assert_eq!(classify(&failure), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let client = HttpLogsMetricsClient::new(&settings("http://127.0.0.1:9"), Duration::from_secs(1))
            .unwrap();
        let failure = client.get_logs_metric("m").await.unwrap_err();
        assert!(failure.transport);
    }
}
