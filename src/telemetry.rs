//! Logging and trace export setup

use opentelemetry::global;
use opentelemetry::trace::{TraceError, TracerProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, OtelConfig};

pub const SERVICE_NAME: &str = "health-api";

const DEFAULT_FILTER: &str = "health_api=info,tower_http=info";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("building span exporter: {0}")]
    Exporter(#[from] TraceError),

    #[error("installing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Installs the global subscriber: `RUST_LOG` filter, JSON or text lines,
/// plus OTLP span export when a reporter URI is configured.
pub fn init_telemetry(format: LogFormat, otel: &OtelConfig) -> Result<(), TelemetryError> {
    let tracer = match &otel.reporter_uri {
        Some(endpoint) => {
            let exporter = SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?;
            let provider = sdktrace::TracerProvider::builder()
                .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                .with_sampler(sdktrace::Sampler::ParentBased(Box::new(
                    sdktrace::Sampler::TraceIdRatioBased(otel.probability),
                )))
                .with_resource(Resource::new(vec![
                    KeyValue::new("service.name", SERVICE_NAME),
                    KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                ]))
                .build();
            let tracer = provider.tracer(SERVICE_NAME);
            global::set_tracer_provider(provider);
            Some(tracer)
        }
        None => None,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = match format {
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
        LogFormat::Text => fmt::layer().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t)))
        .try_init()?;

    if let Some(endpoint) = &otel.reporter_uri {
        tracing::info!(
            endpoint = %endpoint,
            probability = otel.probability,
            "trace export enabled"
        );
    }

    Ok(())
}

/// Flushes pending spans. Safe to call when export was never enabled.
pub fn shutdown() {
    global::shutdown_tracer_provider();
}
