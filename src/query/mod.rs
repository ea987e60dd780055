//! Instant queries against a Prometheus-compatible HTTP API

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;

use crate::error::Error;
use crate::metrics::Metrics;

const QUERY_PATH: &str = "/api/v1/query";

/// Result of an instant query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome {
    /// `vector`, `matrix`, `scalar` or `string`
    pub result_type: String,
    pub result: Value,
    pub warnings: Vec<String>,
}

/// Prometheus response envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    #[serde(default)]
    result_type: String,
    #[serde(default)]
    result: Value,
}

/// Client for the metrics backend
pub struct QueryClient {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl QueryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, metrics: Arc<Metrics>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
            metrics,
        }
    }

    /// Runs `expr` as an instant query. An empty result is not an error.
    pub async fn query(&self, expr: &str) -> Result<QueryOutcome, Error> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), QUERY_PATH);

        let started = Instant::now();
        let result = self.execute(&url, expr).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.kind().as_str(),
        };
        self.metrics.record_backend_request(
            "prometheus",
            "query",
            outcome,
            started.elapsed().as_secs_f64(),
        );

        let outcome = result?;
        for warning in &outcome.warnings {
            tracing::warn!(query = %expr, warning = %warning, "prometheus query warning");
        }
        Ok(outcome)
    }

    async fn execute(&self, url: &str, expr: &str) -> Result<QueryOutcome, Error> {
        let response = self
            .http_client
            .get(url)
            .query(&[("query", expr)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::upstream("querying prometheus", e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::upstream("reading prometheus response", e))?;

        // Prometheus answers failed queries with an error envelope and a 4xx/5xx
        // status, so the body is worth decoding either way.
        let envelope: Option<Envelope> = serde_json::from_slice(&body).ok();

        match envelope {
            Some(envelope) if envelope.status == "success" && status.is_success() => {
                let data = envelope.data.unwrap_or(QueryData {
                    result_type: String::new(),
                    result: Value::Null,
                });
                Ok(QueryOutcome {
                    result_type: data.result_type,
                    result: data.result,
                    warnings: envelope.warnings,
                })
            }
            Some(envelope) if envelope.status == "error" || !status.is_success() => {
                Err(Error::internal(format!(
                    "prometheus query failed: {}: {}",
                    envelope.error_type.as_deref().unwrap_or("server_error"),
                    envelope
                        .error
                        .as_deref()
                        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown")),
                )))
            }
            _ if !status.is_success() => Err(Error::internal(format!(
                "prometheus query failed: server_error: status {}",
                status.as_u16()
            ))),
            _ => Err(Error::internal("decoding prometheus response")),
        }
    }
}
