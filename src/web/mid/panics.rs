use std::any::Any;
use std::backtrace::Backtrace;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, Response};
use axum::response::IntoResponse;
use tower_http::catch_panic::ResponseForPanic;

use crate::error::{Error, ErrorKind};
use crate::metrics::Metrics;

/// Turns a handler panic into an InternalOnly error and counts it.
///
/// The unwind skips the CORS layer, so the allowed origin is set here.
#[derive(Clone)]
pub struct PanicResponder {
    metrics: Arc<Metrics>,
    cors_origin: HeaderValue,
}

impl PanicResponder {
    pub fn new(metrics: Arc<Metrics>, cors_origin: HeaderValue) -> Self {
        Self {
            metrics,
            cors_origin,
        }
    }
}

impl ResponseForPanic for PanicResponder {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response<Body> {
        let message = err
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| err.downcast_ref::<&str>().copied())
            .unwrap_or("unknown panic payload");

        self.metrics.add_panic();

        // Detail stays in the log; the errors middleware strips it.
        let mut response = Error::new(
            ErrorKind::InternalOnly,
            format!("panic: {message}\n{}", Backtrace::capture()),
        )
        .into_response();

        response
            .headers_mut()
            .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.cors_origin.clone());
        response
    }
}
