use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;

use super::debug::debug_router;
use super::handlers::{
    liveness, query_alerts, query_health_check_by_target, query_health_checks, query_metric,
    readiness, AppState,
};
use crate::config::Config;
use crate::health::{GrafanaStore, HealthBus};
use crate::metrics::Metrics;
use crate::query::QueryClient;
use crate::web::{App, Pipeline};

const API_V1: &str = "/api/v1";

/// Build the application router
pub fn build_router(state: Arc<AppState>, pipeline: Pipeline) -> Router {
    App::new(pipeline)
        // Health checks
        .handle(API_V1, "/health", get(query_health_checks))
        .handle(API_V1, "/health/", get(query_health_check_by_target))
        .handle(API_V1, "/health/*target", get(query_health_check_by_target))
        // Alerts
        .handle(API_V1, "/alerts", get(query_alerts))
        // Metrics
        .handle(API_V1, "/metrics/", get(query_metric))
        .handle(API_V1, "/metrics/*metric", get(query_metric))
        // Probes skip the middleware chain
        .handle_bare("", "/liveness", get(liveness))
        .handle_bare("", "/readiness", get(readiness))
        .handle_bare("", "/healthz", get(readiness))
        .into_router()
        .with_state(state)
}

/// Run the API and debug servers until a shutdown signal arrives
pub async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Arc::new(Metrics::new()?);

    if config.grafana.url.is_none() {
        tracing::warn!("GRAFANA_URL not set, health and alert queries will fail");
    }

    let store = GrafanaStore::new(config.grafana.clone(), Arc::clone(&metrics));
    let state = Arc::new(AppState {
        health: HealthBus::new(Arc::new(store), Arc::clone(&metrics)),
        query: QueryClient::new(
            config.prometheus_url.clone(),
            config.backend_timeout,
            Arc::clone(&metrics),
        ),
    });
    let pipeline = Pipeline {
        metrics: Arc::clone(&metrics),
        cors_origin: config.cors_origin.clone(),
    };

    let app = build_router(state, pipeline);
    let debug = debug_router(Arc::clone(&metrics));

    let api_listener = TcpListener::bind(config.api_host).await?;
    let debug_listener = TcpListener::bind(config.debug_host).await?;
    tracing::info!(addr = %config.api_host, "api server listening");
    tracing::info!(addr = %config.debug_host, "debug server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut debug_task = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            axum::serve(debug_listener, debug)
                .with_graceful_shutdown(stopped(shutdown_rx))
                .await
        }
    });
    let mut api_task = tokio::spawn(async move {
        axum::serve(
            api_listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(stopped(shutdown_rx))
        .await
    });

    tokio::select! {
        result = &mut api_task => {
            debug_task.abort();
            result??;
            tracing::warn!("api server exited without a shutdown signal");
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    tracing::info!(
        timeout_secs = config.shutdown_timeout.as_secs(),
        "shutdown started, draining requests"
    );
    let _ = shutdown_tx.send(true);

    let drained = tokio::time::timeout(config.shutdown_timeout, async {
        let api = (&mut api_task).await;
        let debug = (&mut debug_task).await;
        (api, debug)
    })
    .await;

    match drained {
        Ok((api, debug)) => {
            api??;
            debug??;
        }
        Err(_) => {
            tracing::warn!("drain timed out, aborting remaining connections");
            api_task.abort();
            debug_task.abort();
        }
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::grafana::GrafanaConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, HeaderValue, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::util::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_app(grafana_url: Option<String>, prometheus_url: String) -> Router {
        let metrics = Arc::new(Metrics::new().unwrap());
        let grafana = GrafanaConfig {
            url: grafana_url,
            user: "admin".to_string(),
            password: "admin".to_string(),
            timeout: Duration::from_secs(2),
        };
        let state = Arc::new(AppState {
            health: HealthBus::new(
                Arc::new(GrafanaStore::new(grafana, Arc::clone(&metrics))),
                Arc::clone(&metrics),
            ),
            query: QueryClient::new(prometheus_url, Duration::from_secs(2), Arc::clone(&metrics)),
        });
        let pipeline = Pipeline {
            metrics,
            cors_origin: HeaderValue::from_static("*"),
        };
        build_router(state, pipeline)
    }

    async fn grafana() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/prometheus/grafana/api/v1/rules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"groups": [{"rules": [
                    {
                        "name": "example",
                        "state": "normal",
                        "labels": {"target": "https://example.com", "probe": "blackbox"}
                    },
                    {
                        "name": "down",
                        "state": "firing",
                        "labels": {"target": "https://down.example", "probe": "blackbox"},
                        "alerts": [{"activeAt": "2024-05-01T10:00:00Z", "value": "0"}]
                    }
                ]}]}
            })))
            .mount(&server)
            .await;
        server
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_summary() {
        let grafana = grafana().await;
        let app = create_test_app(Some(grafana.uri()), "http://127.0.0.1:9".to_string());

        let (status, body) = get_json(app, "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["healthy"], 1);
        assert_eq!(body["down"], 1);
        assert_eq!(body["unknown"], 0);
        assert_eq!(body["checks"][1]["status"], "down");
        assert_eq!(body["checks"][1]["last_checked"], "2024-05-01T10:00:00Z");
    }

    #[tokio::test]
    async fn test_health_by_target() {
        let grafana = grafana().await;
        let app = create_test_app(Some(grafana.uri()), "http://127.0.0.1:9".to_string());

        let (status, body) =
            get_json(app.clone(), "/api/v1/health/https%3A%2F%2Fdown.example").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["target"], "https://down.example");
        assert_eq!(body["status"], "down");

        let (status, body) = get_json(app, "/api/v1/health/https://example.com").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_health_by_target_not_found() {
        let grafana = grafana().await;
        let app = create_test_app(Some(grafana.uri()), "http://127.0.0.1:9".to_string());

        let (status, body) =
            get_json(app, "/api/v1/health/https%3A%2F%2Fmissing.example").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 5);
        assert_eq!(body["message"], "target not found: https://missing.example");
    }

    #[tokio::test]
    async fn test_empty_target() {
        let grafana = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&grafana)
            .await;
        let app = create_test_app(Some(grafana.uri()), "http://127.0.0.1:9".to_string());

        let (status, body) = get_json(app, "/api/v1/health/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 3);
    }

    #[tokio::test]
    async fn test_alerts() {
        let grafana = grafana().await;
        let app = create_test_app(Some(grafana.uri()), "http://127.0.0.1:9".to_string());

        let (status, body) = get_json(app, "/api/v1/alerts").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["firing"], 1);
        assert_eq!(body["normal"], 1);
        assert_eq!(body["alerts"][1]["title"], "down");
        assert_eq!(body["alerts"][1]["activeAt"], "2024-05-01T10:00:00Z");
    }

    #[tokio::test]
    async fn test_metric_query() {
        let prometheus = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"resultType": "vector", "result": []}
            })))
            .expect(1)
            .mount(&prometheus)
            .await;
        let app = create_test_app(None, prometheus.uri());

        let (status, body) = get_json(app, "/api/v1/metrics/probe_success").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"metric": "probe_success", "result": []}));
    }

    #[tokio::test]
    async fn test_empty_metric() {
        let prometheus = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&prometheus)
            .await;
        let app = create_test_app(None, prometheus.uri());

        let (status, body) = get_json(app, "/api/v1/metrics/").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "metric parameter required");
    }

    #[tokio::test]
    async fn test_unconfigured_grafana() {
        let app = create_test_app(None, "http://127.0.0.1:9".to_string());

        for uri in [
            "/api/v1/health",
            "/api/v1/alerts",
            "/api/v1/health/https%3A%2F%2Fexample.com",
        ] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
            assert_eq!(body["code"], 15, "{uri}");
        }

        for probe in ["/liveness", "/readiness", "/healthz"] {
            let (status, body) = get_json(app.clone(), probe).await;
            assert_eq!(status, StatusCode::OK, "{probe}");
            assert_eq!(body, json!({"status": "ok"}));
        }
    }

    #[tokio::test]
    async fn test_preflight() {
        let app = create_test_app(None, "http://127.0.0.1:9".to_string());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_probes_skip_pipeline() {
        let app = create_test_app(None, "http://127.0.0.1:9".to_string());

        let response = app
            .oneshot(Request::builder().uri("/liveness").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().get("x-trace-id").is_none());
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
