// src/config.rs
//! Engine configuration
//!
//! Every field has a default, so a partial JSON document (or none at all) is a
//! valid configuration. Call [`EngineConfig::validate`] after loading.

use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for both engines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub risk: RiskEngineConfig,
    pub fraud: FraudEngineConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::Configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        self.risk.validate()?;
        self.fraud.validate()
    }
}

/// How per-profile results are combined when several profiles apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Priority-weighted mean of profile scores; level from the top-priority profile
    #[default]
    WeightedAverage,
    /// Highest level any profile reaches under its own thresholds
    MostRestrictive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskEngineConfig {
    /// Write successful assessments to the verdict cache
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub aggregation: AggregationPolicy,
    /// Confidence reported when there is no evidence either way
    pub neutral_confidence: f64,
    /// Number of fired factors at which confidence stops being pulled to neutral
    pub full_evidence_factors: usize,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_secs: 300,
            aggregation: AggregationPolicy::WeightedAverage,
            neutral_confidence: 50.0,
            full_evidence_factors: 3,
        }
    }
}

impl RiskEngineConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    fn validate(&self) -> Result<()> {
        check_percentage("risk.neutral_confidence", self.neutral_confidence)?;
        if self.full_evidence_factors == 0 {
            return Err(EngineError::Configuration(
                "risk.full_evidence_factors must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudEngineConfig {
    /// Scores at or above this are rejected
    pub high_risk_threshold: f64,
    /// Scores at or above this go to review
    pub medium_risk_threshold: f64,
    pub enable_behavior_analysis: bool,
    pub enable_ml_scoring: bool,
    /// Sliding window of the velocity check, in minutes
    pub velocity_check_period_min: u64,
    /// Events allowed inside the window before velocity fires
    pub velocity_max_events: usize,
    /// Events closer together than this are flagged as rapid succession
    pub velocity_min_interval_secs: u64,
    /// Score when no factor or anomaly was produced
    pub all_clear_score: f64,
    /// Confidence when no factor or anomaly was produced
    pub all_clear_confidence: f64,
    /// Confidence points removed for each collector that failed
    pub collector_failure_penalty: f64,
    /// Score used for anomalies that carry none
    pub anomaly_default_score: f64,
    pub profile_cache_ttl_secs: u64,
    /// Weight of the newest observation when merging into the user profile
    pub profile_update_weight: f64,
    /// Upper bound for detached profile updates and event publication
    pub background_timeout_ms: u64,
}

impl Default for FraudEngineConfig {
    fn default() -> Self {
        Self {
            high_risk_threshold: 80.0,
            medium_risk_threshold: 50.0,
            enable_behavior_analysis: true,
            enable_ml_scoring: true,
            velocity_check_period_min: 60,
            velocity_max_events: 10,
            velocity_min_interval_secs: 2,
            all_clear_score: 10.0,
            all_clear_confidence: 30.0,
            collector_failure_penalty: 10.0,
            anomaly_default_score: 70.0,
            profile_cache_ttl_secs: 900,
            profile_update_weight: 0.3,
            background_timeout_ms: 5_000,
        }
    }
}

impl FraudEngineConfig {
    pub fn velocity_window(&self) -> Duration {
        Duration::from_secs(self.velocity_check_period_min.saturating_mul(60))
    }

    pub fn profile_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.profile_cache_ttl_secs)
    }

    pub fn background_timeout(&self) -> Duration {
        Duration::from_millis(self.background_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        check_percentage("fraud.high_risk_threshold", self.high_risk_threshold)?;
        check_percentage("fraud.medium_risk_threshold", self.medium_risk_threshold)?;
        check_percentage("fraud.all_clear_score", self.all_clear_score)?;
        check_percentage("fraud.all_clear_confidence", self.all_clear_confidence)?;
        check_percentage("fraud.collector_failure_penalty", self.collector_failure_penalty)?;
        check_percentage("fraud.anomaly_default_score", self.anomaly_default_score)?;

        if self.medium_risk_threshold >= self.high_risk_threshold {
            return Err(EngineError::Configuration(format!(
                "fraud.medium_risk_threshold ({}) must be below fraud.high_risk_threshold ({})",
                self.medium_risk_threshold, self.high_risk_threshold
            )));
        }
        if self.velocity_check_period_min == 0 || self.velocity_max_events == 0 {
            return Err(EngineError::Configuration(
                "fraud velocity window and event limit must be positive".to_string(),
            ));
        }
        if !(self.profile_update_weight > 0.0 && self.profile_update_weight <= 1.0) {
            return Err(EngineError::Configuration(format!(
                "fraud.profile_update_weight must be in (0, 1], got {}",
                self.profile_update_weight
            )));
        }
        if self.background_timeout_ms == 0 {
            return Err(EngineError::Configuration(
                "fraud.background_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_percentage(name: &str, value: f64) -> Result<()> {
    if (0.0..=100.0).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::Configuration(format!(
            "{} must be within [0, 100], got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "fraud": { "high_risk_threshold": 90.0 }, "risk": { "aggregation": "most_restrictive" } }"#,
        )
        .unwrap();
        assert_eq!(config.fraud.high_risk_threshold, 90.0);
        assert_eq!(config.fraud.medium_risk_threshold, 50.0);
        assert_eq!(config.risk.aggregation, AggregationPolicy::MostRestrictive);
        assert!(config.risk.cache_enabled);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let err = EngineConfig::from_json_str(
            r#"{ "fraud": { "high_risk_threshold": 40.0, "medium_risk_threshold": 60.0 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_malformed_json_is_configuration_error() {
        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_huge_velocity_period_does_not_overflow() {
        let config = FraudEngineConfig {
            velocity_check_period_min: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.velocity_window(), Duration::from_secs(u64::MAX));
    }
}
