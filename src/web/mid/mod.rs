//! Middleware for the main route group
//!
//! Order, outermost first: trace id and span, logging, error normalization,
//! metrics, panic recovery, CORS.

mod errors;
mod logger;
mod metrics;
mod panics;
mod trace;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use errors::errors;
pub use logger::logger;
pub use metrics::metrics;
pub use panics::PanicResponder;
pub use trace::{RouteSpan, TRACE_ID_HEADER};

use super::Pipeline;

/// Wraps every route of `router` with the full middleware chain.
pub fn wrap<S>(router: Router<S>, pipeline: &Pipeline) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let trace_header = HeaderName::from_static(TRACE_ID_HEADER);

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(trace_header.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(RouteSpan)
                    .on_request(())
                    .on_response(())
                    .on_failure(()),
            )
            .layer(PropagateRequestIdLayer::new(trace_header))
            .layer(middleware::from_fn(logger))
            .layer(middleware::from_fn(errors))
            .layer(middleware::from_fn_with_state(
                pipeline.metrics.clone(),
                metrics,
            ))
            .layer(CatchPanicLayer::custom(PanicResponder::new(
                pipeline.metrics.clone(),
                pipeline.cors_origin.clone(),
            )))
            .layer(cors_layer(pipeline.cors_origin.clone())),
    )
}

/// CORS for the main group. `OPTIONS` is answered by the layer itself with
/// an empty 200.
pub fn cors_layer(origin: HeaderValue) -> CorsLayer {
    let allow_origin = if origin == "*" {
        AllowOrigin::any()
    } else {
        AllowOrigin::exact(origin)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
