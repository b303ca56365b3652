// src/risk/scoring.rs
//! Pure scoring math for the risk engine. Nothing here suspends or allocates
//! beyond the inputs, so repeated calls with the same inputs agree exactly.

use crate::types::{RiskFactor, RiskLevel};
use std::collections::BTreeMap;

/// Confidence-weighted mean of factor scores.
///
/// Each factor counts with `weight * confidence / 100`. The result always lies
/// between the smallest and largest factor score; with no usable weight it is 0.
pub fn profile_score(factors: &[RiskFactor]) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for factor in factors {
        let w = factor.weight.max(0.0) * factor.confidence.max(0.0) / 100.0;
        weighted += factor.score * w;
        total += w;
    }
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

/// Priority-weighted mean of `(score, priority)` pairs; 0 when every priority is 0
pub fn priority_weighted_score(scores: &[(f64, u32)]) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0.0;
    for &(score, priority) in scores {
        weighted += score * priority as f64;
        total += priority as f64;
    }
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

/// Highest level whose lower bound the score reaches; NEGLIGIBLE otherwise.
/// Levels missing from the table are skipped.
pub fn level_for_score(score: f64, thresholds: &BTreeMap<RiskLevel, f64>) -> RiskLevel {
    let mut level = RiskLevel::Negligible;
    for candidate in RiskLevel::ALL {
        if let Some(&bound) = thresholds.get(&candidate) {
            if score >= bound {
                level = candidate;
            }
        }
    }
    level
}

/// Index of the highest-priority entry, first seen on ties
pub fn leading_index<I>(priorities: I) -> Option<usize>
where
    I: IntoIterator<Item = u32>,
{
    let mut best: Option<(usize, u32)> = None;
    for (i, priority) in priorities.into_iter().enumerate() {
        match best {
            Some((_, top)) if priority <= top => {}
            _ => best = Some((i, priority)),
        }
    }
    best.map(|(i, _)| i)
}

/// Confidence in an assessment.
///
/// Starts from the mean confidence of the fired factors and is pulled toward
/// `neutral` when evidence is sparse: with fewer than `full_evidence` fired
/// factors (capped by how many rules were in scope) the pull is proportional
/// to what is missing. No factors, or no rules in scope, gives `neutral`.
pub fn assessment_confidence(
    factors: &[RiskFactor],
    considered: usize,
    neutral: f64,
    full_evidence: usize,
) -> f64 {
    if factors.is_empty() || considered == 0 {
        return neutral;
    }
    let mean = factors.iter().map(|f| f.confidence).sum::<f64>() / factors.len() as f64;
    let needed = full_evidence.min(considered).max(1);
    let coverage = factors.len().min(needed) as f64 / needed as f64;
    (neutral + (mean - neutral) * coverage).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::risk::default_thresholds;
    use crate::types::Severity;

    fn factor(score: f64, weight: f64, confidence: f64) -> RiskFactor {
        RiskFactor {
            code: format!("f{}", score),
            description: String::new(),
            category: "test".to_string(),
            severity: Severity::Medium,
            weight,
            score,
            confidence,
        }
    }

    #[test]
    fn test_profile_score_weighting() {
        let factors = vec![factor(80.0, 1.0, 100.0), factor(20.0, 0.5, 100.0)];
        // (80*1 + 20*0.5) / 1.5
        assert!((profile_score(&factors) - 60.0).abs() < 1e-9);

        let low_confidence = vec![factor(80.0, 1.0, 10.0), factor(20.0, 1.0, 90.0)];
        assert!((profile_score(&low_confidence) - 26.0).abs() < 1e-9);
    }

    #[test]
    fn test_profile_score_without_weight() {
        assert_eq!(profile_score(&[]), 0.0);
        assert_eq!(profile_score(&[factor(90.0, 0.0, 100.0)]), 0.0);
    }

    #[test]
    fn test_priority_weighted_score() {
        let score = priority_weighted_score(&[(90.0, 10), (10.0, 1)]);
        assert!((score - (900.0 + 10.0) / 11.0).abs() < 1e-9);
        assert_eq!(priority_weighted_score(&[(50.0, 0)]), 0.0);
    }

    #[test]
    fn test_level_for_score() {
        let thresholds = default_thresholds();
        assert_eq!(level_for_score(0.0, &thresholds), RiskLevel::Negligible);
        assert_eq!(level_for_score(20.0, &thresholds), RiskLevel::Low);
        assert_eq!(level_for_score(59.9, &thresholds), RiskLevel::Medium);
        assert_eq!(level_for_score(100.0, &thresholds), RiskLevel::Critical);
    }

    #[test]
    fn test_leading_index_prefers_first_on_tie() {
        assert_eq!(leading_index([1, 10, 10, 3]), Some(1));
        assert_eq!(leading_index([5]), Some(0));
        assert_eq!(leading_index(Vec::<u32>::new()), None);
    }

    #[test]
    fn test_confidence_degrades_when_sparse() {
        let one = vec![factor(70.0, 1.0, 90.0)];
        let three = vec![
            factor(70.0, 1.0, 90.0),
            factor(60.0, 1.0, 90.0),
            factor(50.0, 1.0, 90.0),
        ];
        let sparse = assessment_confidence(&one, 10, 50.0, 3);
        let full = assessment_confidence(&three, 10, 50.0, 3);
        assert!(sparse > 50.0 && sparse < full);
        assert!((full - 90.0).abs() < 1e-9);
        assert_eq!(assessment_confidence(&[], 10, 50.0, 3), 50.0);
    }

    #[test]
    fn test_confidence_full_when_all_rules_in_scope_fire() {
        let one = vec![factor(70.0, 1.0, 80.0)];
        assert!((assessment_confidence(&one, 1, 50.0, 3) - 80.0).abs() < 1e-9);
    }
}
