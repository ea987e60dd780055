use axum::extract::MatchedPath;
use axum::http::Request;
use tower_http::trace::MakeSpan;
use tracing::Span;

/// Header carrying the per-request trace id, inbound and outbound
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Opens one span per request, named after the matched route template.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteSpan;

impl<B> MakeSpan<B> for RouteSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str)
            .unwrap_or_else(|| request.uri().path());
        let trace_id = request
            .headers()
            .get(TRACE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        tracing::info_span!(
            "request",
            otel.name = %route,
            method = %request.method(),
            route = %route,
            trace_id = %trace_id,
        )
    }
}
