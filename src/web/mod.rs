//! Minimal request pipeline on top of axum
//!
//! Handlers return `Result<impl Encoder, Error>`. Routes registered through
//! [`App::handle`] are wrapped by the middleware chain in [`mid`]; routes
//! registered through [`App::handle_bare`] are served as-is.

pub mod mid;

use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::MethodRouter;
use axum::Router;
use serde::Serialize;

use crate::error::Error;
use crate::metrics::Metrics;

/// Response serialization contract
pub trait Encoder {
    /// Serializes the value to bytes plus a content type.
    fn encode(&self) -> Result<(Vec<u8>, &'static str), Error>;

    fn http_status(&self) -> StatusCode {
        StatusCode::OK
    }
}

/// Writes an encoder as an HTTP response. `None` means no content.
pub fn respond(resp: Option<&dyn Encoder>) -> Response {
    let Some(resp) = resp else {
        return StatusCode::NO_CONTENT.into_response();
    };

    match resp.encode() {
        Ok((body, content_type)) => (
            resp.http_status(),
            [(header::CONTENT_TYPE, HeaderValue::from_static(content_type))],
            body,
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

/// JSON payload with a 200 status
#[derive(Debug, Clone)]
pub struct JsonResponse<T>(pub T);

impl<T: Serialize> Encoder for JsonResponse<T> {
    fn encode(&self) -> Result<(Vec<u8>, &'static str), Error> {
        serde_json::to_vec(&self.0)
            .map(|bytes| (bytes, "application/json"))
            .map_err(|e| Error::internal(format!("marshal json: {e}")))
    }
}

impl<T: Serialize> IntoResponse for JsonResponse<T> {
    fn into_response(self) -> Response {
        respond(Some(&self))
    }
}

/// Request-scoped values, created by the logging middleware and stored in
/// the request extensions for the layers below it.
#[derive(Debug, Clone)]
pub struct RequestValues {
    pub trace_id: String,
    pub started_at: Instant,
}

/// Settings shared by the main-group middleware
#[derive(Clone)]
pub struct Pipeline {
    pub metrics: Arc<Metrics>,
    pub cors_origin: HeaderValue,
}

/// Router with a middleware-wrapped API group and a bare group
pub struct App<S = ()> {
    pipeline: Pipeline,
    api: Router<S>,
    bare: Router<S>,
}

impl<S> App<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            api: Router::new(),
            bare: Router::new(),
        }
    }

    /// Registers a route behind the full middleware chain.
    pub fn handle(mut self, group: &str, path: &str, route: MethodRouter<S>) -> Self {
        self.api = self.api.route(&format!("{group}{path}"), route);
        self
    }

    /// Registers a route that bypasses the middleware chain.
    pub fn handle_bare(mut self, group: &str, path: &str, route: MethodRouter<S>) -> Self {
        self.bare = self.bare.route(&format!("{group}{path}"), route);
        self
    }

    pub fn into_router(self) -> Router<S> {
        mid::wrap(self.api, &self.pipeline).merge(self.bare)
    }
}
