// src/types/profile.rs
//! Per-user risk profile and behavioral baseline

use super::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Score given to a user with no usable history
pub const NEUTRAL_RISK_SCORE: f64 = 50.0;

/// Durable per-user, per-tenant risk state.
///
/// Only the asynchronous post-decision path writes it; the decision path reads
/// whatever copy the cache or store hands back, which may be one evaluation old.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRiskProfile {
    pub user_id: String,
    pub tenant_id: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub last_updated: DateTime<Utc>,
    pub baseline: BehavioralBaseline,
}

impl UserRiskProfile {
    /// Neutral profile substituted when nothing can be loaded
    pub fn neutral(user_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            risk_score: NEUTRAL_RISK_SCORE,
            risk_level: RiskLevel::Medium,
            last_updated: Utc::now(),
            baseline: BehavioralBaseline::default(),
        }
    }

    /// True when the baseline has seen no activity yet
    pub fn is_new(&self) -> bool {
        self.baseline.event_count == 0
    }
}

/// Observed habits of a user, used by behavior analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehavioralBaseline {
    pub known_devices: Vec<String>,
    pub known_countries: Vec<String>,
    pub known_ips: Vec<String>,
    pub average_amount: f64,
    /// Number of observations with an amount
    pub amount_samples: u64,
    /// Number of observations merged into the baseline
    pub event_count: u64,
    /// Activity per hour of day (UTC), 24 buckets once populated
    pub hourly_activity: Vec<u32>,
}

impl BehavioralBaseline {
    pub fn knows_device(&self, device_id: &str) -> bool {
        self.known_devices.iter().any(|d| d == device_id)
    }

    pub fn knows_country(&self, country: &str) -> bool {
        self.known_countries.iter().any(|c| c.eq_ignore_ascii_case(country))
    }

    /// Share of past activity that happened in `hour`, `None` without history
    pub fn hour_share(&self, hour: u32) -> Option<f64> {
        let total: u64 = self.hourly_activity.iter().map(|&n| n as u64).sum();
        if total == 0 {
            return None;
        }
        let in_hour = self.hourly_activity.get(hour as usize).copied().unwrap_or(0);
        Some(in_hour as f64 / total as f64)
    }
}
