//! Process-wide counters and Prometheus collectors
//!
//! One [`Metrics`] value is built at startup and shared as `Arc<Metrics>` by
//! the request pipeline, the business layer, and the backend clients. The
//! plain counters back `/debug/vars`; the collectors back `/metrics`.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use prometheus::{
    Encoder as _, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use serde::Serialize;

const NAMESPACE: &str = "health_api";

/// Default histogram buckets (seconds)
const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Every Nth request samples the live task count.
pub const WORKER_SAMPLE_INTERVAL: u64 = 1000;

pub struct Metrics {
    requests: AtomicU64,
    errors: AtomicU64,
    panics: AtomicU64,
    workers: AtomicI64,

    http_requests_total: IntCounterVec,
    http_request_duration: HistogramVec,
    http_errors_total: IntCounterVec,
    panics_total: IntCounter,
    health_queries_total: IntCounterVec,
    backend_requests_total: IntCounterVec,
    backend_request_duration: HistogramVec,

    registry: Registry,
}

/// Snapshot of the plain counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CounterSnapshot {
    pub requests: u64,
    pub errors: u64,
    pub panics: u64,
    pub goroutines: i64,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests").namespace(NAMESPACE),
            &["method", "path", "status"],
        )?;
        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(DEFAULT_BUCKETS.to_vec()),
            &["method", "path"],
        )?;
        let http_errors_total = IntCounterVec::new(
            Opts::new("http_errors_total", "Total number of HTTP errors").namespace(NAMESPACE),
            &["method", "path", "code"],
        )?;
        let panics_total = IntCounter::with_opts(
            Opts::new("panics_total", "Total number of panics recovered").namespace(NAMESPACE),
        )?;
        let health_queries_total = IntCounterVec::new(
            Opts::new(
                "health_check_queries_total",
                "Total number of health check queries",
            )
            .namespace(NAMESPACE),
            &["operation", "outcome"],
        )?;
        let backend_requests_total = IntCounterVec::new(
            Opts::new(
                "backend_requests_total",
                "Total number of requests to upstream backends",
            )
            .namespace(NAMESPACE),
            &["backend", "endpoint", "outcome"],
        )?;
        let backend_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "backend_request_duration_seconds",
                "Upstream backend request duration in seconds",
            )
            .namespace(NAMESPACE)
            .buckets(DEFAULT_BUCKETS.to_vec()),
            &["backend", "endpoint"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(http_errors_total.clone()))?;
        registry.register(Box::new(panics_total.clone()))?;
        registry.register(Box::new(health_queries_total.clone()))?;
        registry.register(Box::new(backend_requests_total.clone()))?;
        registry.register(Box::new(backend_request_duration.clone()))?;

        Ok(Self {
            requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            panics: AtomicU64::new(0),
            workers: AtomicI64::new(0),
            http_requests_total,
            http_request_duration,
            http_errors_total,
            panics_total,
            health_queries_total,
            backend_requests_total,
            backend_request_duration,
            registry,
        })
    }

    /// Increments the request counter and returns the new total.
    pub fn add_request(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add_error(&self) -> u64 {
        self.errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn add_panic(&self) -> u64 {
        self.panics_total.inc();
        self.panics.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Samples the number of live tasks on the current tokio runtime.
    pub fn sample_workers(&self) -> i64 {
        let alive = tokio::runtime::Handle::try_current()
            .map(|handle| handle.metrics().num_alive_tasks() as i64)
            .unwrap_or(0);
        self.workers.store(alive, Ordering::Relaxed);
        alive
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        self.http_requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.http_request_duration
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_http_error(&self, method: &str, path: &str, code: &str) {
        self.http_errors_total
            .with_label_values(&[method, path, code])
            .inc();
    }

    pub fn record_health_query(&self, operation: &str, outcome: &str) {
        self.health_queries_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn record_backend_request(
        &self,
        backend: &str,
        endpoint: &str,
        outcome: &str,
        duration_secs: f64,
    ) {
        self.backend_requests_total
            .with_label_values(&[backend, endpoint, outcome])
            .inc();
        self.backend_request_duration
            .with_label_values(&[backend, endpoint])
            .observe(duration_secs);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            goroutines: self.workers.load(Ordering::Relaxed),
        }
    }

    /// Prometheus text exposition of every registered collector
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
