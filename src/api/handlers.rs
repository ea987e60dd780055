use axum::extract::{Path, State};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Error;
use crate::health::{AlertSummary, HealthBus, HealthCheck, HealthSummary};
use crate::query::QueryClient;
use crate::web::JsonResponse;

/// Application state shared across handlers
pub struct AppState {
    pub health: HealthBus,
    pub query: QueryClient,
}

// ============================================================================
// Health
// ============================================================================

pub async fn query_health_checks(
    State(state): State<Arc<AppState>>,
) -> Result<JsonResponse<HealthSummary>, Error> {
    let summary = state.health.query_health_checks().await?;
    Ok(JsonResponse(summary))
}

/// `target` is a catch-all segment so URLs with slashes work; the bare
/// `/health/` route lands here with no parameter at all.
pub async fn query_health_check_by_target(
    State(state): State<Arc<AppState>>,
    target: Option<Path<String>>,
) -> Result<JsonResponse<HealthCheck>, Error> {
    let target = target.map(|Path(t)| t).unwrap_or_default();
    if target.is_empty() {
        return Err(Error::invalid_argument("target parameter required"));
    }

    let check = state.health.query_health_check_by_target(&target).await?;
    Ok(JsonResponse(check))
}

// ============================================================================
// Alerts
// ============================================================================

pub async fn query_alerts(
    State(state): State<Arc<AppState>>,
) -> Result<JsonResponse<AlertSummary>, Error> {
    let summary = state.health.query_alerts().await?;
    Ok(JsonResponse(summary))
}

// ============================================================================
// Metrics
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MetricResponse {
    pub metric: String,
    pub result: Value,
}

pub async fn query_metric(
    State(state): State<Arc<AppState>>,
    metric: Option<Path<String>>,
) -> Result<JsonResponse<MetricResponse>, Error> {
    let metric = metric.map(|Path(m)| m).unwrap_or_default();
    if metric.is_empty() {
        return Err(Error::invalid_argument("metric parameter required"));
    }

    let outcome = state.query.query(&metric).await?;
    Ok(JsonResponse(MetricResponse {
        metric,
        result: outcome.result,
    }))
}

// ============================================================================
// Probes
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub status: &'static str,
}

pub async fn liveness() -> JsonResponse<ProbeResponse> {
    JsonResponse(ProbeResponse { status: "ok" })
}

pub async fn readiness() -> JsonResponse<ProbeResponse> {
    JsonResponse(ProbeResponse { status: "ok" })
}
