//! health-api server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - API_HOST: API bind address (default: 0.0.0.0:8080)
//! - DEBUG_HOST: debug bind address (default: 0.0.0.0:4000)
//! - CORS_ORIGIN: allowed origin (default: *)
//! - GRAFANA_URL: Grafana base URL (required for health and alert queries)
//! - GRAFANA_USER / GRAFANA_PASSWORD: basic auth (default: admin / admin)
//! - PROMETHEUS_URL: Prometheus base URL (default: http://localhost:9090)
//! - BACKEND_TIMEOUT_SECS: per backend call timeout (default: 10)
//! - SHUTDOWN_TIMEOUT_SECS: drain timeout (default: 20)
//! - OTEL_REPORTER_URI: OTLP gRPC endpoint (default: unset, no export)
//! - OTEL_PROBABILITY: trace sampling ratio (default: 0.05)
//! - LOG_FORMAT: json or text (default: json)
//! - RUST_LOG: log filter (default: health_api=info,tower_http=info)

use health_api::api::run_server;
use health_api::config::Config;
use health_api::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;

    telemetry::init_telemetry(config.log_format, &config.otel)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        api_host = %config.api_host,
        debug_host = %config.debug_host,
        grafana = config.grafana.url.as_deref().unwrap_or("-"),
        prometheus = %config.prometheus_url,
        backend_timeout_secs = config.backend_timeout.as_secs(),
        "starting health-api"
    );

    let result = run_server(config).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "server error");
    }

    telemetry::shutdown();
    result
}
