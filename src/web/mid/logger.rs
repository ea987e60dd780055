use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request};
use axum::middleware::Next;
use axum::response::Response;
use tower_http::request_id::RequestId;

use crate::web::RequestValues;

/// Logs request start and completion, and seeds [`RequestValues`].
pub async fn logger(mut request: Request, next: Next) -> Response {
    let trace_id = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let values = RequestValues {
        trace_id,
        started_at: Instant::now(),
    };

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());

    tracing::info!(%method, %path, %remote, "request started");

    request.extensions_mut().insert(values.clone());
    let response = next.run(request).await;

    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        duration = ?values.started_at.elapsed(),
        "request completed"
    );

    response
}
