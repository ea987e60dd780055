use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::Error;
use crate::metrics::{Metrics, WORKER_SAMPLE_INTERVAL};
use crate::web::RequestValues;

/// Records request counts, latency, and failures.
pub async fn metrics(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let started_at = request
        .extensions()
        .get::<RequestValues>()
        .map(|values| values.started_at)
        .unwrap_or_else(Instant::now);
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let response = next.run(request).await;

    let n = metrics.add_request();
    if n % WORKER_SAMPLE_INTERVAL == 0 {
        metrics.sample_workers();
    }

    let status = response.status();
    metrics.record_http_request(
        &method,
        &path,
        status.as_u16(),
        started_at.elapsed().as_secs_f64(),
    );

    if status.as_u16() >= 400 {
        metrics.add_error();
        let code = response
            .extensions()
            .get::<Error>()
            .map(|err| err.kind().client_facing().as_str())
            .unwrap_or("Unknown");
        metrics.record_http_error(&method, &path, code);
    }

    response
}
