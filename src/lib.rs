//! health-api: HTTP facade over probe health and alert state
//!
//! Reads alert rule state from Grafana and reports it as per-target health,
//! and proxies instant queries to Prometheus.
//!
//! # Endpoints
//!
//! - `GET /api/v1/health`: every target with status counts
//! - `GET /api/v1/health/{target}`: one target; the target may contain slashes
//! - `GET /api/v1/alerts`: every alert rule with state counts
//! - `GET /api/v1/metrics/{metric}`: instant query result
//! - `GET /liveness`, `/readiness`, `/healthz`: probes
//!
//! A second listener serves `/debug/vars` and Prometheus `/metrics`.
//!
//! # Example
//!
//! ```no_run
//! use health_api::api::run_server;
//! use health_api::config::Config;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! run_server(config).await
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod query;
pub mod telemetry;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, ErrorKind};
pub use health::{HealthBus, Storer};
