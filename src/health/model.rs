//! Health check and alert domain types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Down,
    Unknown,
}

impl Status {
    /// Maps an alert rule state to a target status.
    ///
    /// `firing` means the probe rule is tripped; `pending` means it may be
    /// about to. Everything else, `normal` included, counts as healthy.
    pub fn from_rule_state(state: &str) -> Self {
        match state {
            "firing" => Status::Down,
            "pending" => Status::Unknown,
            _ => Status::Healthy,
        }
    }
}

/// A single health check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub target: String,
    pub status: Status,
    pub last_checked: DateTime<Utc>,
    pub probe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

/// Summary of all health checks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub down: usize,
    pub unknown: usize,
    pub checks: Vec<HealthCheck>,
}

impl HealthSummary {
    /// Builds a summary, counting each status.
    pub fn from_checks(checks: Vec<HealthCheck>) -> Self {
        let mut summary = HealthSummary {
            total: checks.len(),
            ..Default::default()
        };

        for check in &checks {
            match check.status {
                Status::Healthy => summary.healthy += 1,
                Status::Down => summary.down += 1,
                Status::Unknown => summary.unknown += 1,
            }
        }

        summary.checks = checks;
        summary
    }
}

/// One alert rule as reported by the alerting backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub title: String,
    /// Raw backend state, e.g. `firing`, `pending`, `normal`
    pub state: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    #[serde(
        rename = "activeAt",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub active_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Summary of all alerts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
    pub total: usize,
    pub firing: usize,
    pub pending: usize,
    pub normal: usize,
    pub alerts: Vec<Alert>,
}

impl AlertSummary {
    /// Appends an alert and bumps the counter matching its state.
    pub fn push(&mut self, alert: Alert) {
        match alert.state.as_str() {
            "firing" => self.firing += 1,
            "pending" => self.pending += 1,
            "normal" => self.normal += 1,
            _ => {}
        }
        self.total += 1;
        self.alerts.push(alert);
    }
}
