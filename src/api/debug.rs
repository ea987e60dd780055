//! Debug listener: process counters, Prometheus exposition and CPU profiles

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::error::Error;
use crate::metrics::{CounterSnapshot, Metrics};
use crate::web::JsonResponse;

#[cfg(unix)]
use profile::cpu_profile;

#[derive(Debug, Serialize)]
pub struct DebugVars {
    pub build: &'static str,
    #[serde(flatten)]
    pub counters: CounterSnapshot,
}

pub fn debug_router(metrics: Arc<Metrics>) -> Router {
    let router = Router::new()
        .route("/debug/vars", get(vars))
        .route("/metrics", get(prometheus_text));

    #[cfg(unix)]
    let router = router.route("/debug/pprof/profile", get(cpu_profile));

    router.with_state(metrics)
}

async fn vars(State(metrics): State<Arc<Metrics>>) -> JsonResponse<DebugVars> {
    JsonResponse(DebugVars {
        build: env!("CARGO_PKG_VERSION"),
        counters: metrics.snapshot(),
    })
}

async fn prometheus_text(State(metrics): State<Arc<Metrics>>) -> Response {
    match metrics.gather_text() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => Error::internal(format!("gathering metrics: {e}")).into_response(),
    }
}

#[cfg(unix)]
mod profile {
    use std::time::Duration;

    use axum::extract::Query;
    use axum::http::header;
    use axum::response::{IntoResponse, Response};
    use pprof::protos::Message;
    use serde::Deserialize;

    use crate::error::{Error, ErrorKind};

    const DEFAULT_SECONDS: u64 = 30;
    const MAX_SECONDS: u64 = 300;
    const SAMPLE_FREQUENCY: i32 = 100;

    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ProfileFormat {
        /// pprof protobuf, uncompressed
        #[default]
        Protobuf,
        /// SVG flame graph
        Flamegraph,
    }

    #[derive(Debug, Deserialize)]
    pub struct ProfileParams {
        #[serde(default = "default_seconds")]
        pub seconds: u64,
        #[serde(default)]
        pub format: ProfileFormat,
    }

    fn default_seconds() -> u64 {
        DEFAULT_SECONDS
    }

    /// Samples the whole process for `seconds` and returns the profile.
    pub async fn cpu_profile(Query(params): Query<ProfileParams>) -> Result<Response, Error> {
        if params.seconds == 0 || params.seconds > MAX_SECONDS {
            return Err(Error::invalid_argument(format!(
                "seconds must be between 1 and {MAX_SECONDS}"
            )));
        }

        tracing::info!(seconds = params.seconds, format = ?params.format, "cpu profile started");

        let duration = Duration::from_secs(params.seconds);
        let format = params.format;
        let (body, content_type) = tokio::task::spawn_blocking(move || capture(duration, format))
            .await
            .map_err(|e| Error::internal(format!("profiling task: {e}")))??;

        Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
    }

    fn capture(
        duration: Duration,
        format: ProfileFormat,
    ) -> Result<(Vec<u8>, &'static str), Error> {
        // Fails while another profile is running.
        let guard = pprof::ProfilerGuardBuilder::default()
            .frequency(SAMPLE_FREQUENCY)
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()
            .map_err(|e| Error::new(ErrorKind::Unavailable, format!("starting profiler: {e}")))?;

        std::thread::sleep(duration);

        let report = guard
            .report()
            .build()
            .map_err(|e| Error::internal(format!("building profile: {e}")))?;

        let mut body = Vec::new();
        match format {
            ProfileFormat::Protobuf => {
                let profile = report
                    .pprof()
                    .map_err(|e| Error::internal(format!("encoding profile: {e}")))?;
                profile
                    .encode(&mut body)
                    .map_err(|e| Error::internal(format!("encoding profile: {e}")))?;
                Ok((body, "application/octet-stream"))
            }
            ProfileFormat::Flamegraph => {
                report
                    .flamegraph(&mut body)
                    .map_err(|e| Error::internal(format!("rendering flame graph: {e}")))?;
                Ok((body, "image/svg+xml"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn test_vars() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.add_request();
        metrics.add_request();
        metrics.add_panic();

        let response = debug_router(metrics)
            .oneshot(Request::builder().uri("/debug/vars").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["requests"], 2);
        assert_eq!(json["panics"], 1);
        assert_eq!(json["build"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_prometheus_text() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.record_http_request("GET", "/api/v1/health", 200, 0.01);

        let response = debug_router(metrics)
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("health_api_http_requests_total"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_profile_rejects_bad_params() {
        let router = debug_router(Arc::new(Metrics::new().unwrap()));

        for uri in [
            "/debug/pprof/profile?seconds=0",
            "/debug/pprof/profile?seconds=301",
            "/debug/pprof/profile?format=pdf",
        ] {
            let response = router
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_profile_protobuf() {
        let router = debug_router(Arc::new(Metrics::new().unwrap()));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/debug/pprof/profile?seconds=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/octet-stream"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(!body.is_empty());
    }
}
