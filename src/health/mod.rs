//! Health check business logic
//!
//! [`HealthBus`] sits between the HTTP handlers and a [`Storer`]. It adds
//! one thing on top of the store: the status counts in [`HealthSummary`].

pub mod grafana;
pub mod model;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::metrics::Metrics;

pub use grafana::GrafanaStore;
pub use model::{Alert, AlertSummary, HealthCheck, HealthSummary, Status};

/// Data access for health checks and alerts
#[async_trait]
pub trait Storer: Send + Sync {
    async fn query_health_checks(&self) -> Result<Vec<HealthCheck>, Error>;

    async fn query_health_check_by_target(&self, target: &str) -> Result<HealthCheck, Error>;

    async fn query_alerts(&self) -> Result<AlertSummary, Error>;
}

pub struct HealthBus {
    storer: Arc<dyn Storer>,
    metrics: Arc<Metrics>,
}

impl HealthBus {
    pub fn new(storer: Arc<dyn Storer>, metrics: Arc<Metrics>) -> Self {
        Self { storer, metrics }
    }

    /// All health checks plus status counts
    pub async fn query_health_checks(&self) -> Result<HealthSummary, Error> {
        let checks = self.storer.query_health_checks().await;
        self.record("health_checks", &checks);

        Ok(HealthSummary::from_checks(checks?))
    }

    pub async fn query_health_check_by_target(&self, target: &str) -> Result<HealthCheck, Error> {
        let check = self.storer.query_health_check_by_target(target).await;
        self.record("health_check_by_target", &check);
        check
    }

    pub async fn query_alerts(&self) -> Result<AlertSummary, Error> {
        let alerts = self.storer.query_alerts().await;
        self.record("alerts", &alerts);
        alerts
    }

    fn record<T>(&self, operation: &str, result: &Result<T, Error>) {
        let outcome = match result {
            Ok(_) => "success",
            Err(err) => err.kind().as_str(),
        };
        self.metrics.record_health_query(operation, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Utc;

    struct FakeStore {
        checks: Vec<HealthCheck>,
    }

    #[async_trait]
    impl Storer for FakeStore {
        async fn query_health_checks(&self) -> Result<Vec<HealthCheck>, Error> {
            Ok(self.checks.clone())
        }

        async fn query_health_check_by_target(&self, target: &str) -> Result<HealthCheck, Error> {
            self.checks
                .iter()
                .find(|check| check.target == target)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("target not found: {target}")))
        }

        async fn query_alerts(&self) -> Result<AlertSummary, Error> {
            Ok(AlertSummary::default())
        }
    }

    struct DownStore;

    #[async_trait]
    impl Storer for DownStore {
        async fn query_health_checks(&self) -> Result<Vec<HealthCheck>, Error> {
            Err(Error::unavailable("grafana not configured"))
        }

        async fn query_health_check_by_target(&self, _target: &str) -> Result<HealthCheck, Error> {
            Err(Error::unavailable("grafana not configured"))
        }

        async fn query_alerts(&self) -> Result<AlertSummary, Error> {
            Err(Error::unavailable("grafana not configured"))
        }
    }

    fn check(target: &str, status: Status) -> HealthCheck {
        HealthCheck {
            target: target.to_string(),
            status,
            last_checked: Utc::now(),
            probe: String::new(),
            instance: None,
        }
    }

    fn bus(storer: impl Storer + 'static) -> HealthBus {
        HealthBus::new(Arc::new(storer), Arc::new(Metrics::new().unwrap()))
    }

    #[tokio::test]
    async fn test_summary_invariants() {
        let bus = bus(FakeStore {
            checks: vec![
                check("a", Status::Healthy),
                check("b", Status::Down),
                check("c", Status::Unknown),
                check("d", Status::Healthy),
            ],
        });

        let summary = bus.query_health_checks().await.unwrap();
        assert_eq!(summary.total, summary.checks.len());
        assert_eq!(summary.healthy + summary.down + summary.unknown, summary.total);
        assert_eq!(summary.healthy, 2);
    }

    #[tokio::test]
    async fn test_not_found_passes_through() {
        let bus = bus(FakeStore { checks: vec![] });

        let err = bus.query_health_check_by_target("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_store_failure_passes_through() {
        let bus = bus(DownStore);

        let err = bus.query_health_checks().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        let err = bus.query_alerts().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }
}
