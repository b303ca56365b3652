// src/actions/mod.rs
//! Actions recommended to the caller
//!
//! The engines never execute these themselves. They are derived from the
//! categorical outcome (risk level or fraud verdict) through fixed tables, so
//! the same level always maps to the same policy regardless of the raw score.

use crate::types::{RiskLevel, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action recommended to the calling flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    /// Let the operation through
    Allow,
    /// Let it through but keep watching the account
    Monitor,
    /// Ask for a stronger factor before continuing
    StepUpAuthentication,
    /// Ask for an extra authentication round (fraud flow)
    AdditionalAuthentication,
    /// Route to a fuller risk assessment
    RiskAssessment,
    /// Queue for an analyst
    ManualReview,
    /// Alert the security team
    NotifySecurity,
    /// Refuse the operation
    Block,
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecommendedAction::Allow => "ALLOW",
            RecommendedAction::Monitor => "MONITOR",
            RecommendedAction::StepUpAuthentication => "STEP_UP_AUTHENTICATION",
            RecommendedAction::AdditionalAuthentication => "ADDITIONAL_AUTHENTICATION",
            RecommendedAction::RiskAssessment => "RISK_ASSESSMENT",
            RecommendedAction::ManualReview => "MANUAL_REVIEW",
            RecommendedAction::NotifySecurity => "NOTIFY_SECURITY",
            RecommendedAction::Block => "BLOCK",
        };
        f.write_str(name)
    }
}

/// Policy attached to a risk level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPolicy {
    pub actions: Vec<RecommendedAction>,
    pub allow_operation: bool,
    pub require_additional_auth: bool,
}

impl ActionPolicy {
    /// Deterministic level -> policy table
    pub fn for_level(level: RiskLevel) -> Self {
        use RecommendedAction::*;

        let (actions, allow_operation, require_additional_auth) = match level {
            RiskLevel::Negligible => (vec![Allow], true, false),
            RiskLevel::Low => (vec![Allow, Monitor], true, false),
            RiskLevel::Medium => (vec![StepUpAuthentication, Monitor], true, true),
            RiskLevel::High => (vec![StepUpAuthentication, ManualReview], false, true),
            RiskLevel::Critical => (vec![Block, NotifySecurity], false, false),
        };

        Self {
            actions,
            allow_operation,
            require_additional_auth,
        }
    }
}

/// Final categorical decision of the fraud engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudVerdict {
    Approved,
    Review,
    Rejected,
}

impl FraudVerdict {
    /// Map a consolidated score onto a verdict
    pub fn from_score(score: f64, medium_threshold: f64, high_threshold: f64) -> Self {
        if score >= high_threshold {
            FraudVerdict::Rejected
        } else if score >= medium_threshold {
            FraudVerdict::Review
        } else {
            FraudVerdict::Approved
        }
    }

    /// Action for this verdict, given the severities that contributed to it
    pub fn recommended_action<I>(self, severities: I) -> RecommendedAction
    where
        I: IntoIterator<Item = Severity>,
    {
        match self {
            FraudVerdict::Rejected => RecommendedAction::Block,
            FraudVerdict::Approved => RecommendedAction::Allow,
            FraudVerdict::Review => {
                if severities.into_iter().any(Severity::is_high_or_critical) {
                    RecommendedAction::AdditionalAuthentication
                } else {
                    RecommendedAction::RiskAssessment
                }
            }
        }
    }
}

impl fmt::Display for FraudVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FraudVerdict::Approved => "APPROVED",
            FraudVerdict::Review => "REVIEW",
            FraudVerdict::Rejected => "REJECTED",
        };
        f.write_str(name)
    }
}
