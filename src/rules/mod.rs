// src/rules/mod.rs
//! Rule evaluation
//!
//! Matches a request against a set of rules and turns every triggered rule
//! into a [`RiskFactor`]. A rule whose condition fails to evaluate is logged
//! and contributes nothing; it never aborts the evaluation of the others.

pub mod condition;
pub mod table;

use crate::types::{RiskFactor, RiskRule};
use std::sync::Arc;
use tracing::{debug, warn};

pub use condition::{
    BuiltinConditionEvaluator, CompareOp, Condition, ConditionEvaluator, ConditionMatch,
    RuleSubject,
};
pub use table::{RuleTable, TenantPolicy};

/// Result of running a rule set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleEvaluation {
    pub factors: Vec<RiskFactor>,
    /// Enabled rules in scope for the tenant
    pub considered: usize,
    /// Rules whose condition could not be evaluated
    pub errors: usize,
}

/// Runs rules through a pluggable [`ConditionEvaluator`]
#[derive(Clone)]
pub struct RuleEvaluator {
    conditions: Arc<dyn ConditionEvaluator>,
}

impl RuleEvaluator {
    pub fn new(conditions: Arc<dyn ConditionEvaluator>) -> Self {
        Self { conditions }
    }

    /// Evaluate `rules` in order; `weight_for` supplies each rule's weight
    pub fn evaluate<'r, I, W>(
        &self,
        rules: I,
        subject: &RuleSubject<'_>,
        weight_for: W,
    ) -> RuleEvaluation
    where
        I: IntoIterator<Item = &'r RiskRule>,
        W: Fn(&RiskRule) -> f64,
    {
        let mut evaluation = RuleEvaluation::default();

        for rule in rules {
            if !rule.enabled || !rule.applies_to_tenant(subject.tenant_id) {
                continue;
            }
            evaluation.considered += 1;

            match self.conditions.evaluate(rule, subject) {
                Ok(m) if m.matched => {
                    debug!(rule_id = %rule.id, confidence = m.confidence, "rule matched");
                    evaluation.factors.push(RiskFactor {
                        code: rule.id.clone(),
                        description: rule.description.clone(),
                        category: rule.category.clone(),
                        severity: rule.severity,
                        weight: weight_for(rule).clamp(0.0, 1.0),
                        score: rule.factor_score(),
                        confidence: m.confidence.clamp(0.0, 100.0),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    evaluation.errors += 1;
                    warn!(rule_id = %rule.id, error = %e, "rule condition failed to evaluate");
                }
            }
        }

        evaluation
    }
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(BuiltinConditionEvaluator))
    }
}
