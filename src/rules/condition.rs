// src/rules/condition.rs
//! Rule conditions and the predicate evaluator
//!
//! The engines treat a condition as opaque: they hand a rule and a subject to a
//! [`ConditionEvaluator`] and get back whether it matched and how confident the
//! match is. [`BuiltinConditionEvaluator`] understands a small set of named
//! checks plus attribute comparisons.

use crate::types::{BehavioralBaseline, DeviceInfo, GeoInfo, RiskRule, Value};
use crate::{EngineError, Result};
use ahash::HashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Predicate attached to a rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Always,
    /// VPN, proxy or Tor exit detected on the request's network
    AnonymizerDetected,
    EmulatorDetected,
    JailbrokenDevice,
    /// Device id not in the user's baseline (users with history only)
    NewDevice,
    /// Country not in the user's baseline (users with history only)
    UnfamiliarCountry,
    AmountAbove(f64),
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    All(Vec<Condition>),
    Any(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Condition::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Field value is one of the listed values
    In,
    /// Field value (list or string) contains the given value
    Contains,
}

/// Request data a condition is evaluated against
#[derive(Debug, Clone, Copy)]
pub struct RuleSubject<'a> {
    pub tenant_id: &'a str,
    pub operation_type: &'a str,
    pub amount: Option<f64>,
    pub geo: Option<&'a GeoInfo>,
    pub device: Option<&'a DeviceInfo>,
    pub attributes: &'a HashMap<String, Value>,
    pub baseline: Option<&'a BehavioralBaseline>,
}

impl<'a> RuleSubject<'a> {
    /// Resolve a dotted field name to a value; unknown fields resolve to `Null`.
    ///
    /// Recognised prefixes are `geo.` and `device.`; anything else is looked up
    /// in the free-form attributes (optionally prefixed with `attr.`).
    pub fn field(&self, name: &str) -> Value {
        match name {
            "tenant_id" => return Value::from(self.tenant_id),
            "operation_type" => return Value::from(self.operation_type),
            "amount" => return Value::from(self.amount),
            _ => {}
        }

        if let Some(key) = name.strip_prefix("geo.") {
            let Some(geo) = self.geo else {
                return Value::Null;
            };
            return match key {
                "country" => Value::from(geo.country.clone()),
                "city" => Value::from(geo.city.clone()),
                "asn" => Value::from(geo.asn.clone()),
                "is_vpn" => Value::Bool(geo.is_vpn),
                "is_proxy" => Value::Bool(geo.is_proxy),
                "is_tor" => Value::Bool(geo.is_tor),
                _ => Value::Null,
            };
        }

        if let Some(key) = name.strip_prefix("device.") {
            let Some(device) = self.device else {
                return Value::Null;
            };
            return match key {
                "device_id" => Value::from(device.device_id.clone()),
                "fingerprint" => Value::from(device.fingerprint.clone()),
                "user_agent" => Value::from(device.user_agent.clone()),
                "is_emulator" => Value::Bool(device.is_emulator),
                "is_jailbroken" => Value::Bool(device.is_jailbroken),
                _ => Value::Null,
            };
        }

        let key = name.strip_prefix("attr.").unwrap_or(name);
        self.attributes.get(key).cloned().unwrap_or(Value::Null)
    }

    fn has_history(&self) -> Option<&'a BehavioralBaseline> {
        self.baseline.filter(|b| b.event_count > 0)
    }
}

/// Outcome of evaluating one rule
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditionMatch {
    pub matched: bool,
    /// In `[0, 100]`
    pub confidence: f64,
}

impl ConditionMatch {
    pub fn miss() -> Self {
        Self {
            matched: false,
            confidence: 0.0,
        }
    }
}

/// Predicate evaluator plugged into the rule evaluator
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, rule: &RiskRule, subject: &RuleSubject<'_>) -> Result<ConditionMatch>;
}

/// Evaluator for the [`Condition`] variants; a match carries the rule's confidence
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinConditionEvaluator;

impl ConditionEvaluator for BuiltinConditionEvaluator {
    fn evaluate(&self, rule: &RiskRule, subject: &RuleSubject<'_>) -> Result<ConditionMatch> {
        if check(&rule.condition, subject)? {
            Ok(ConditionMatch {
                matched: true,
                confidence: rule.confidence,
            })
        } else {
            Ok(ConditionMatch::miss())
        }
    }
}

fn check(condition: &Condition, subject: &RuleSubject<'_>) -> Result<bool> {
    let matched = match condition {
        Condition::Always => true,
        Condition::AnonymizerDetected => subject.geo.is_some_and(GeoInfo::is_anonymized),
        Condition::EmulatorDetected => subject.device.is_some_and(|d| d.is_emulator),
        Condition::JailbrokenDevice => subject.device.is_some_and(|d| d.is_jailbroken),
        Condition::NewDevice => {
            match (subject.has_history(), subject.device.and_then(|d| d.device_id.as_deref())) {
                (Some(baseline), Some(device_id)) => !baseline.knows_device(device_id),
                _ => false,
            }
        }
        Condition::UnfamiliarCountry => {
            match (subject.has_history(), subject.geo.and_then(|g| g.country.as_deref())) {
                (Some(baseline), Some(country)) => !baseline.knows_country(country),
                _ => false,
            }
        }
        Condition::AmountAbove(limit) => subject.amount.is_some_and(|a| a > *limit),
        Condition::Compare { field, op, value } => {
            compare(&subject.field(field), *op, value, field)?
        }
        Condition::All(conditions) => {
            for c in conditions {
                if !check(c, subject)? {
                    return Ok(false);
                }
            }
            true
        }
        Condition::Any(conditions) => {
            for c in conditions {
                if check(c, subject)? {
                    return Ok(true);
                }
            }
            false
        }
        Condition::Not(inner) => !check(inner, subject)?,
    };
    Ok(matched)
}

fn compare(actual: &Value, op: CompareOp, expected: &Value, field: &str) -> Result<bool> {
    // Missing data never matches, except for an explicit inequality.
    if actual.is_null() {
        return Ok(op == CompareOp::Ne && !expected.is_null());
    }

    let ordering = || {
        actual.compare(expected).ok_or_else(|| {
            EngineError::InvalidCondition(format!(
                "cannot compare field {} ({}) with {}",
                field,
                actual.type_name(),
                expected.type_name()
            ))
        })
    };

    let matched = match op {
        CompareOp::Eq => actual.compare(expected) == Some(Ordering::Equal),
        CompareOp::Ne => actual.compare(expected) != Some(Ordering::Equal),
        CompareOp::Gt => ordering()? == Ordering::Greater,
        CompareOp::Gte => ordering()? != Ordering::Less,
        CompareOp::Lt => ordering()? == Ordering::Less,
        CompareOp::Lte => ordering()? != Ordering::Greater,
        CompareOp::In => expected.contains(actual),
        CompareOp::Contains => actual.contains(expected),
    };
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject<'a>(
        attributes: &'a HashMap<String, Value>,
        geo: Option<&'a GeoInfo>,
        device: Option<&'a DeviceInfo>,
        baseline: Option<&'a BehavioralBaseline>,
    ) -> RuleSubject<'a> {
        RuleSubject {
            tenant_id: "acme",
            operation_type: "LOGIN",
            amount: Some(2_500.0),
            geo,
            device,
            attributes,
            baseline,
        }
    }

    fn eval(condition: Condition, subject: &RuleSubject<'_>) -> Result<ConditionMatch> {
        let rule = RiskRule::new("r", "test", condition).with_confidence(80.0);
        BuiltinConditionEvaluator.evaluate(&rule, subject)
    }

    #[test]
    fn test_named_conditions() {
        let attrs = HashMap::default();
        let geo = GeoInfo {
            is_tor: true,
            ..GeoInfo::country("DE")
        };
        let device = DeviceInfo {
            is_emulator: true,
            ..DeviceInfo::with_id("d-1")
        };
        let s = subject(&attrs, Some(&geo), Some(&device), None);

        let m = eval(Condition::AnonymizerDetected, &s).unwrap();
        assert!(m.matched);
        assert_eq!(m.confidence, 80.0);
        assert!(eval(Condition::EmulatorDetected, &s).unwrap().matched);
        assert!(!eval(Condition::JailbrokenDevice, &s).unwrap().matched);
        assert!(eval(Condition::AmountAbove(1_000.0), &s).unwrap().matched);
    }

    #[test]
    fn test_new_device_needs_history() {
        let attrs = HashMap::default();
        let device = DeviceInfo::with_id("d-2");
        let empty = BehavioralBaseline::default();
        let s = subject(&attrs, None, Some(&device), Some(&empty));
        assert!(!eval(Condition::NewDevice, &s).unwrap().matched);

        let seasoned = BehavioralBaseline {
            known_devices: vec!["d-1".to_string()],
            event_count: 12,
            ..Default::default()
        };
        let s = subject(&attrs, None, Some(&device), Some(&seasoned));
        assert!(eval(Condition::NewDevice, &s).unwrap().matched);
    }

    #[test]
    fn test_compare_and_combinators() {
        let mut attrs = HashMap::default();
        attrs.insert("failed_logins".to_string(), Value::Int(6));
        attrs.insert("channel".to_string(), Value::from("api"));
        let s = subject(&attrs, None, None, None);

        let many_failures = Condition::compare("failed_logins", CompareOp::Gte, 5);
        let via_api = Condition::compare("attr.channel", CompareOp::In, vec!["api", "batch"]);
        let both = Condition::All(vec![many_failures.clone(), via_api]);
        assert!(eval(both, &s).unwrap().matched);

        let negated = Condition::Not(Box::new(many_failures));
        assert!(!eval(negated, &s).unwrap().matched);
    }

    #[test]
    fn test_missing_field_does_not_match() {
        let attrs = HashMap::default();
        let s = subject(&attrs, None, None, None);
        let c = Condition::compare("geo.country", CompareOp::Eq, "US");
        assert!(!eval(c, &s).unwrap().matched);
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let mut attrs = HashMap::default();
        attrs.insert("channel".to_string(), Value::from("api"));
        let s = subject(&attrs, None, None, None);
        let c = Condition::compare("channel", CompareOp::Gt, 3);
        assert!(eval(c, &s).is_err());
    }
}
