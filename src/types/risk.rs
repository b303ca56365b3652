// src/types/risk.rs
//! Rules, evaluation profiles and the risk assessment call contract

use super::{DeviceInfo, GeoInfo, RiskFactor, RiskLevel, Severity, Value, WILDCARD};
use crate::actions::RecommendedAction;
use crate::rules::Condition;
use crate::{EngineError, Result};
use ahash::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scored rule owned by the rule store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRule {
    pub id: String,
    pub description: String,
    pub category: String,
    pub severity: Severity,
    /// Default weight in `[0, 1]`; profiles may override it
    pub weight: f64,
    /// Confidence attached to a match, in `[0, 100]`
    pub confidence: f64,
    /// Explicit factor score; falls back to the severity's base score
    pub score: Option<f64>,
    pub condition: Condition,
    pub action: RecommendedAction,
    pub enabled: bool,
    /// Tenant the rule belongs to, or `*`
    pub tenant_scope: String,
}

impl RiskRule {
    pub fn new(id: impl Into<String>, category: impl Into<String>, condition: Condition) -> Self {
        let id = id.into();
        Self {
            description: id.clone(),
            id,
            category: category.into(),
            severity: Severity::Medium,
            weight: 1.0,
            confidence: 100.0,
            score: None,
            condition,
            action: RecommendedAction::Monitor,
            enabled: true,
            tenant_scope: WILDCARD.to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 100.0);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score.clamp(0.0, 100.0));
        self
    }

    pub fn with_action(mut self, action: RecommendedAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_scope = tenant_id.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Score contributed when this rule matches
    pub fn factor_score(&self) -> f64 {
        self.score.unwrap_or_else(|| self.severity.base_score())
    }

    pub fn applies_to_tenant(&self, tenant_id: &str) -> bool {
        self.tenant_scope == WILDCARD || self.tenant_scope == tenant_id
    }
}

/// A bundle of rules, weights and thresholds for a tenant/operation combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvaluationProfile {
    pub id: String,
    pub tenant_id: String,
    pub rule_ids: Vec<String>,
    pub operation_types: Vec<String>,
    /// Profile-level weight when several profiles apply
    pub priority: u32,
    /// Per-rule weight overrides
    pub rule_weights: BTreeMap<String, f64>,
    /// Lower bound of each level; must increase with the level
    pub threshold_scores: BTreeMap<RiskLevel, f64>,
}

impl RiskEvaluationProfile {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            rule_ids: Vec::new(),
            operation_types: vec![WILDCARD.to_string()],
            priority: 1,
            rule_weights: BTreeMap::new(),
            threshold_scores: default_thresholds(),
        }
    }

    pub fn with_rules<I, S>(mut self, rule_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rule_ids = rule_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_operations<I, S>(mut self, operation_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.operation_types = operation_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_rule_weight(mut self, rule_id: impl Into<String>, weight: f64) -> Self {
        self.rule_weights.insert(rule_id.into(), weight.clamp(0.0, 1.0));
        self
    }

    pub fn with_threshold(mut self, level: RiskLevel, score: f64) -> Self {
        self.threshold_scores.insert(level, score);
        self
    }

    pub fn applies_to(&self, tenant_id: &str, operation_type: &str) -> bool {
        let tenant_matches = self.tenant_id == WILDCARD || self.tenant_id == tenant_id;
        let operation_matches = self
            .operation_types
            .iter()
            .any(|op| op == WILDCARD || op == operation_type);
        tenant_matches && operation_matches
    }

    /// Weight for a rule within this profile
    pub fn weight_for(&self, rule: &RiskRule) -> f64 {
        self.rule_weights.get(&rule.id).copied().unwrap_or(rule.weight)
    }

    /// Threshold scores must be strictly increasing from NEGLIGIBLE to CRITICAL
    pub fn validate_thresholds(&self) -> Result<()> {
        let mut previous: Option<(RiskLevel, f64)> = None;
        for level in RiskLevel::ALL {
            let Some(&score) = self.threshold_scores.get(&level) else {
                continue;
            };
            if !(0.0..=100.0).contains(&score) {
                return Err(EngineError::Configuration(format!(
                    "profile {}: threshold for {} out of range: {}",
                    self.id, level, score
                )));
            }
            if let Some((prev_level, prev_score)) = previous {
                if score <= prev_score {
                    return Err(EngineError::Configuration(format!(
                        "profile {}: threshold for {} ({}) must exceed {} ({})",
                        self.id, level, score, prev_level, prev_score
                    )));
                }
            }
            previous = Some((level, score));
        }
        Ok(())
    }
}

/// Lower bounds used by profiles that do not set their own
pub fn default_thresholds() -> BTreeMap<RiskLevel, f64> {
    BTreeMap::from([
        (RiskLevel::Negligible, 0.0),
        (RiskLevel::Low, 20.0),
        (RiskLevel::Medium, 40.0),
        (RiskLevel::High, 60.0),
        (RiskLevel::Critical, 80.0),
    ])
}

/// Input to `RiskEngine::evaluate_risk`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessmentRequest {
    pub request_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub operation_type: String,
    pub ip_address: Option<String>,
    pub device: Option<DeviceInfo>,
    pub geo: Option<GeoInfo>,
    pub amount: Option<f64>,
    pub attributes: HashMap<String, Value>,
    /// Explicit profiles to evaluate; empty means "select by tenant and operation"
    pub profile_ids: Vec<String>,
    pub use_cache: bool,
    pub requested_at: DateTime<Utc>,
}

impl RiskAssessmentRequest {
    pub fn new(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        operation_type: impl Into<String>,
    ) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            operation_type: operation_type.into(),
            ip_address: None,
            device: None,
            geo: None,
            amount: None,
            attributes: HashMap::default(),
            profile_ids: Vec::new(),
            use_cache: false,
            requested_at: Utc::now(),
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_geo(mut self, geo: GeoInfo) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn with_amount(mut self, amount: f64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_profiles<I, S>(mut self, profile_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.profile_ids = profile_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

/// Output of `RiskEngine::evaluate_risk`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessmentResponse {
    pub request_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub operation_type: String,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub confidence_score: f64,
    pub risk_factors: Vec<RiskFactor>,
    pub recommended_actions: Vec<RecommendedAction>,
    pub allow_operation: bool,
    pub require_additional_auth: bool,
    pub evaluated_profiles: Vec<String>,
    pub cache_used: bool,
    pub assessed_at: DateTime<Utc>,
}
