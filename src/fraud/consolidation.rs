// src/fraud/consolidation.rs
//! Merges rule factors and detector anomalies into one score and confidence

use crate::types::{Anomaly, RiskFactor, Severity};

/// Fallbacks used by [`consolidate`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsolidationSettings {
    /// Score when there is nothing to consolidate
    pub all_clear_score: f64,
    /// Confidence when there is nothing to consolidate
    pub all_clear_confidence: f64,
    /// Score of an anomaly that carries none
    pub anomaly_default_score: f64,
}

impl Default for ConsolidationSettings {
    fn default() -> Self {
        Self {
            all_clear_score: 10.0,
            all_clear_confidence: 30.0,
            anomaly_default_score: 70.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Consolidated {
    pub score: f64,
    pub confidence: f64,
    /// Number of factors and anomalies that were usable
    pub items: usize,
}

struct Item {
    score: f64,
    severity: Severity,
    confidence: f64,
}

/// Severity-weighted, confidence-scaled mean of all inputs.
///
/// `score = Σ(score·sev·conf/100) / Σ(sev·conf/100)` and
/// `confidence = Σ(conf·sev) / Σ(sev)`, with severity weights 1/2/3/5.
/// Items with a non-finite score or confidence are skipped.
pub fn consolidate(
    factors: &[RiskFactor],
    anomalies: &[Anomaly],
    settings: &ConsolidationSettings,
) -> Consolidated {
    let items = factors
        .iter()
        .map(|f| Item {
            score: f.score,
            severity: f.severity,
            confidence: f.confidence,
        })
        .chain(anomalies.iter().map(|a| Item {
            score: a.score.unwrap_or(settings.anomaly_default_score),
            severity: a.severity,
            confidence: a.confidence,
        }));

    let mut count = 0;
    let mut skipped = 0;
    let mut score_num = 0.0;
    let mut score_den = 0.0;
    let mut severity_score = 0.0;
    let mut conf_num = 0.0;
    let mut conf_den = 0.0;

    for item in items {
        if !item.score.is_finite() || !item.confidence.is_finite() {
            skipped += 1;
            continue;
        }
        count += 1;
        let severity = item.severity.weight();
        let score = item.score.clamp(0.0, 100.0);
        let confidence = item.confidence.clamp(0.0, 100.0);
        let w = severity * confidence / 100.0;
        score_num += score * w;
        score_den += w;
        severity_score += score * severity;
        conf_num += confidence * severity;
        conf_den += severity;
    }

    if count == 0 {
        // Only unusable inputs: no evidence either way, so no all-clear.
        let score = if skipped > 0 {
            settings.anomaly_default_score
        } else {
            settings.all_clear_score
        };
        let confidence = if skipped > 0 {
            0.0
        } else {
            settings.all_clear_confidence
        };
        return Consolidated {
            score,
            confidence,
            items: 0,
        };
    }

    // Zero-confidence inputs still count, weighted by severity alone.
    let score = if score_den > 0.0 {
        score_num / score_den
    } else {
        severity_score / conf_den
    };

    Consolidated {
        score,
        confidence: conf_num / conf_den,
        items: count,
    }
}
