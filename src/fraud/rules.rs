// src/fraud/rules.rs
//! Built-in fraud rules
//!
//! Deterministic checks that run for every tenant ahead of tenant-defined
//! rules of the `fraud` category. Each carries a fixed confidence.

use crate::actions::RecommendedAction;
use crate::rules::Condition;
use crate::types::{RiskRule, Severity};

/// Category of rules evaluated by the fraud engine
pub const FRAUD_CATEGORY: &str = "fraud";

pub const ANONYMIZER_DETECTED: &str = "ANONYMIZER_DETECTED";
pub const EMULATOR_DETECTED: &str = "EMULATOR_DETECTED";
pub const JAILBROKEN_DEVICE: &str = "JAILBROKEN_DEVICE";

pub fn builtin_fraud_rules() -> Vec<RiskRule> {
    vec![
        RiskRule::new(ANONYMIZER_DETECTED, FRAUD_CATEGORY, Condition::AnonymizerDetected)
            .with_description("Traffic routed through a VPN, proxy or Tor exit")
            .with_severity(Severity::High)
            .with_confidence(90.0)
            .with_action(RecommendedAction::AdditionalAuthentication),
        RiskRule::new(EMULATOR_DETECTED, FRAUD_CATEGORY, Condition::EmulatorDetected)
            .with_description("Request issued from an emulated device")
            .with_severity(Severity::High)
            .with_confidence(85.0)
            .with_action(RecommendedAction::AdditionalAuthentication),
        RiskRule::new(JAILBROKEN_DEVICE, FRAUD_CATEGORY, Condition::JailbrokenDevice)
            .with_description("Device is jailbroken or rooted")
            .with_severity(Severity::Medium)
            .with_confidence(80.0)
            .with_action(RecommendedAction::Monitor),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue() {
        let rules = builtin_fraud_rules();
        assert_eq!(rules.len(), 3);
        let anonymizer = rules.iter().find(|r| r.id == ANONYMIZER_DETECTED).unwrap();
        assert_eq!(anonymizer.severity, Severity::High);
        assert_eq!(anonymizer.confidence, 90.0);
        assert!(rules.iter().all(|r| r.category == FRAUD_CATEGORY && r.enabled));
    }
}
