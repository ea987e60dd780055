//! Health check store backed by Grafana's alert rules API
//!
//! Grafana exposes rule state in the Prometheus rules format:
//!
//! ```json
//! {"data": {"groups": [{"rules": [{
//!     "name": "...", "state": "firing",
//!     "labels": {"target": "https://example.com", "probe": "blackbox"},
//!     "annotations": {},
//!     "alerts": [{"activeAt": "2024-05-01T10:00:00Z", "value": "0"}]
//! }]}]}}
//! ```
//!
//! The payload is walked tolerantly: a missing key or a value of the wrong
//! type reads as "no data" and never fails the request.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::model::{Alert, AlertSummary, HealthCheck, Status};
use super::Storer;
use crate::error::Error;
use crate::metrics::Metrics;

const RULES_PATH: &str = "/api/prometheus/grafana/api/v1/rules";

/// Unix seconds of `0001-01-01T00:00:00Z`, which Grafana reports for alerts
/// that were never active.
const ZERO_TIME_SECS: i64 = -62_135_596_800;

/// Grafana connection settings
#[derive(Debug, Clone)]
pub struct GrafanaConfig {
    /// Base URL; `None` leaves the store unconfigured
    pub url: Option<String>,
    pub user: String,
    pub password: String,
    /// Per-request timeout
    pub timeout: Duration,
}

/// [`Storer`] that reads rule state from Grafana
pub struct GrafanaStore {
    http_client: reqwest::Client,
    config: GrafanaConfig,
    metrics: Arc<Metrics>,
}

impl GrafanaStore {
    pub fn new(config: GrafanaConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
            metrics,
        }
    }

    /// Fetches the rules payload, recording outcome and latency.
    async fn fetch_rules(&self) -> Result<Value, Error> {
        let base = self
            .config
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| Error::unavailable("grafana not configured"))?;
        let url = format!("{}{}", base.trim_end_matches('/'), RULES_PATH);

        let mut request = self.http_client.get(&url).timeout(self.config.timeout);
        if !self.config.user.is_empty() && !self.config.password.is_empty() {
            request = request.basic_auth(&self.config.user, Some(&self.config.password));
        }

        let started = Instant::now();
        let result = send(request).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.kind().as_str(),
        };
        self.metrics.record_backend_request(
            "grafana",
            "rules",
            outcome,
            started.elapsed().as_secs_f64(),
        );

        if let Err(err) = &result {
            tracing::debug!(url = %url, error = %err, "grafana rules request failed");
        }

        result
    }
}

async fn send(request: reqwest::RequestBuilder) -> Result<Value, Error> {
    let response = request
        .send()
        .await
        .map_err(|e| Error::upstream("querying alert state", e))?;

    if !response.status().is_success() {
        return Err(Error::unavailable(format!(
            "grafana returned status {}",
            response.status().as_u16()
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| Error::upstream("reading alert state", e))?;

    match serde_json::from_slice::<Value>(&body) {
        Ok(value @ (Value::Object(_) | Value::Null)) => Ok(value),
        Ok(_) => Err(Error::internal(
            "decoding state response: expected a JSON object",
        )),
        Err(e) => Err(Error::internal(format!("decoding state response: {e}"))),
    }
}

#[async_trait]
impl Storer for GrafanaStore {
    async fn query_health_checks(&self) -> Result<Vec<HealthCheck>, Error> {
        let body = self.fetch_rules().await?;

        Ok(rules(&body)
            .filter_map(RuleRecord::into_health_check)
            .collect())
    }

    async fn query_health_check_by_target(&self, target: &str) -> Result<HealthCheck, Error> {
        let body = self.fetch_rules().await?;

        // Several groups may carry the same target; the first one wins.
        let found = rules(&body)
            .filter_map(RuleRecord::into_health_check)
            .find(|check| check.target == target);

        found.ok_or_else(|| Error::not_found(format!("target not found: {target}")))
    }

    async fn query_alerts(&self) -> Result<AlertSummary, Error> {
        let body = self.fetch_rules().await?;

        let mut summary = AlertSummary::default();
        for rule in rules(&body) {
            summary.push(rule.into_alert());
        }
        Ok(summary)
    }
}

/// One rule, lifted out of the untyped payload
#[derive(Debug, Default)]
struct RuleRecord {
    name: String,
    state: String,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    active_at: Option<String>,
    value: Option<String>,
}

impl RuleRecord {
    fn from_json(rule: &Map<String, Value>) -> Self {
        let first_alert = rule
            .get("alerts")
            .and_then(Value::as_array)
            .and_then(|alerts| alerts.first())
            .and_then(Value::as_object);

        Self {
            name: string_field(rule, "name"),
            state: string_field(rule, "state"),
            labels: string_map(rule, "labels"),
            annotations: string_map(rule, "annotations"),
            active_at: first_alert
                .map(|alert| string_field(alert, "activeAt"))
                .filter(|s| !s.is_empty()),
            value: first_alert
                .map(|alert| string_field(alert, "value"))
                .filter(|s| !s.is_empty()),
        }
    }

    /// Rules without a `target` label are not health checks.
    fn into_health_check(self) -> Option<HealthCheck> {
        let target = self.labels.get("target").filter(|t| !t.is_empty())?.clone();

        Some(HealthCheck {
            target,
            status: Status::from_rule_state(&self.state),
            last_checked: self
                .active_at
                .as_deref()
                .and_then(parse_active_at)
                .unwrap_or_else(Utc::now),
            probe: self.labels.get("probe").cloned().unwrap_or_default(),
            instance: self.labels.get("instance").filter(|i| !i.is_empty()).cloned(),
        })
    }

    fn into_alert(self) -> Alert {
        Alert {
            title: self.name,
            state: self.state,
            labels: self.labels,
            annotations: self.annotations,
            active_at: self.active_at,
            value: self.value,
        }
    }
}

/// Every rule under `data.groups[].rules[]`, in payload order
fn rules(body: &Value) -> impl Iterator<Item = RuleRecord> + '_ {
    body.get("data")
        .and_then(|data| data.get("groups"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|group| group.get("rules").and_then(Value::as_array))
        .flatten()
        .filter_map(Value::as_object)
        .map(RuleRecord::from_json)
}

fn string_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn string_map(object: &Map<String, Value>, key: &str) -> BTreeMap<String, String> {
    object
        .get(key)
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_active_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
        .filter(|t| !(t.timestamp() == ZERO_TIME_SECS && t.timestamp_subsec_nanos() == 0))
}
