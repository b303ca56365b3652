// src/types/mod.rs
//! Data model shared by the risk and fraud engines
//!
//! Everything here is a plain value: factors and anomalies are immutable once
//! produced, requests and responses are built once per call and never mutated
//! by the engines.

pub mod fraud;
pub mod profile;
pub mod risk;
pub mod value;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use fraud::{FraudDetectionRequest, FraudDetectionResponse};
pub use profile::{BehavioralBaseline, UserRiskProfile};
pub use risk::{RiskAssessmentRequest, RiskAssessmentResponse, RiskEvaluationProfile, RiskRule};
pub use value::Value;

/// Wildcard accepted in tenant scopes and operation type lists
pub const WILDCARD: &str = "*";

/// Categorical risk level, ordered from least to most risky
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Negligible,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// All levels in ascending order
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::Negligible,
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// Fixed score bands used where no profile thresholds apply
    /// (user risk profiles).
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 80.0 => RiskLevel::Critical,
            s if s >= 60.0 => RiskLevel::High,
            s if s >= 40.0 => RiskLevel::Medium,
            s if s >= 20.0 => RiskLevel::Low,
            _ => RiskLevel::Negligible,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskLevel::Negligible => "NEGLIGIBLE",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

/// Severity of a single factor or anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used by fraud consolidation
    pub fn weight(self) -> f64 {
        match self {
            Severity::Low => 1.0,
            Severity::Medium => 2.0,
            Severity::High => 3.0,
            Severity::Critical => 5.0,
        }
    }

    /// Score assigned to a matched rule that carries no explicit score
    pub fn base_score(self) -> f64 {
        match self {
            Severity::Low => 25.0,
            Severity::Medium => 50.0,
            Severity::High => 75.0,
            Severity::Critical => 95.0,
        }
    }

    pub fn is_high_or_critical(self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

/// Detector that produced an anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalySource {
    Behavior,
    Ml,
    Velocity,
}

impl fmt::Display for AnomalySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AnomalySource::Behavior => "behavior",
            AnomalySource::Ml => "ml",
            AnomalySource::Velocity => "velocity",
        };
        f.write_str(name)
    }
}

/// One rule's contribution to a risk score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub code: String,
    pub description: String,
    pub category: String,
    pub severity: Severity,
    /// In `[0, 1]`
    pub weight: f64,
    /// In `[0, 100]`
    pub score: f64,
    /// In `[0, 100]`
    pub confidence: f64,
}

/// One non-rule detector's contribution (behavior, ML, velocity)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub code: String,
    pub source: AnomalySource,
    pub severity: Severity,
    /// In `[0, 100]`
    pub confidence: f64,
    /// Explicit score in `[0, 100]`; consolidation substitutes a default when absent
    pub score: Option<f64>,
    pub details: String,
}

impl Anomaly {
    pub fn new(
        code: impl Into<String>,
        source: AnomalySource,
        severity: Severity,
        confidence: f64,
        details: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            source,
            severity,
            confidence: confidence.clamp(0.0, 100.0),
            score: None,
            details: details.into(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score.clamp(0.0, 100.0));
        self
    }
}

/// Network and location metadata for a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub city: Option<String>,
    pub asn: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_vpn: bool,
    pub is_proxy: bool,
    pub is_tor: bool,
}

impl GeoInfo {
    pub fn country(country: impl Into<String>) -> Self {
        Self {
            country: Some(country.into()),
            ..Default::default()
        }
    }

    /// True when traffic is routed through any anonymizing network
    pub fn is_anonymized(&self) -> bool {
        self.is_vpn || self.is_proxy || self.is_tor
    }
}

/// Client device metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: Option<String>,
    pub fingerprint: Option<String>,
    pub user_agent: Option<String>,
    pub is_emulator: bool,
    pub is_jailbroken: bool,
}

impl DeviceInfo {
    pub fn with_id(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Default::default()
        }
    }
}
