//! Service configuration, read from the environment
//!
//! | Variable | Default |
//! |---|---|
//! | `API_HOST` | `0.0.0.0:8080` |
//! | `DEBUG_HOST` | `0.0.0.0:4000` |
//! | `CORS_ORIGIN` | `*` |
//! | `GRAFANA_URL` | unset |
//! | `GRAFANA_USER` / `GRAFANA_PASSWORD` | `admin` / `admin` |
//! | `PROMETHEUS_URL` | `http://localhost:9090` |
//! | `BACKEND_TIMEOUT_SECS` | `10` |
//! | `SHUTDOWN_TIMEOUT_SECS` | `20` |
//! | `OTEL_REPORTER_URI` | unset |
//! | `OTEL_PROBABILITY` | `0.05` |
//! | `LOG_FORMAT` | `json` |

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::HeaderValue;

use crate::health::grafana::GrafanaConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {name}: {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, value: &str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Log line encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

/// Tracing export settings
#[derive(Debug, Clone)]
pub struct OtelConfig {
    /// OTLP gRPC endpoint; `None` disables export
    pub reporter_uri: Option<String>,
    /// Fraction of root traces sampled, in `[0, 1]`
    pub probability: f64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: SocketAddr,
    pub debug_host: SocketAddr,
    pub cors_origin: HeaderValue,
    pub grafana: GrafanaConfig,
    pub prometheus_url: String,
    pub backend_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub otel: OtelConfig,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    /// Empty values are treated as unset, except for the Grafana credentials.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let api_host = parse_addr("API_HOST", &or("API_HOST", "0.0.0.0:8080"))?;
        let debug_host = parse_addr("DEBUG_HOST", &or("DEBUG_HOST", "0.0.0.0:4000"))?;

        let origin = or("CORS_ORIGIN", "*");
        let cors_origin = HeaderValue::from_str(&origin)
            .map_err(|e| ConfigError::invalid("CORS_ORIGIN", &origin, e))?;

        let backend_timeout = parse_secs(
            "BACKEND_TIMEOUT_SECS",
            &or("BACKEND_TIMEOUT_SECS", "10"),
        )?;
        let shutdown_timeout = parse_secs(
            "SHUTDOWN_TIMEOUT_SECS",
            &or("SHUTDOWN_TIMEOUT_SECS", "20"),
        )?;

        let raw = or("OTEL_PROBABILITY", "0.05");
        let probability: f64 = raw
            .parse()
            .map_err(|e| ConfigError::invalid("OTEL_PROBABILITY", &raw, e))?;
        if !(0.0..=1.0).contains(&probability) {
            return Err(ConfigError::invalid(
                "OTEL_PROBABILITY",
                &raw,
                "must be between 0 and 1",
            ));
        }

        let raw = or("LOG_FORMAT", "json");
        let log_format = match raw.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "text" => LogFormat::Text,
            _ => {
                return Err(ConfigError::invalid(
                    "LOG_FORMAT",
                    &raw,
                    "expected json or text",
                ))
            }
        };

        Ok(Config {
            api_host,
            debug_host,
            cors_origin,
            grafana: GrafanaConfig {
                url: get("GRAFANA_URL"),
                // An explicitly empty credential disables basic auth.
                user: lookup("GRAFANA_USER").unwrap_or_else(|| "admin".to_string()),
                password: lookup("GRAFANA_PASSWORD").unwrap_or_else(|| "admin".to_string()),
                timeout: backend_timeout,
            },
            prometheus_url: or("PROMETHEUS_URL", "http://localhost:9090"),
            backend_timeout,
            shutdown_timeout,
            otel: OtelConfig {
                reporter_uri: get("OTEL_REPORTER_URI"),
                probability,
            },
            log_format,
        })
    }
}

fn parse_addr(name: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::invalid(name, value, e))
}

fn parse_secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(name, value, "must be positive")),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(ConfigError::invalid(name, value, e)),
    }
}
