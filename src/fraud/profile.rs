// src/fraud/profile.rs
//! Folding a detection outcome into the user's durable profile

use crate::actions::FraudVerdict;
use crate::types::{FraudDetectionRequest, RiskLevel, UserRiskProfile};
use chrono::{DateTime, Timelike, Utc};

/// Most entries kept in each known-devices/countries/IPs list
pub const MAX_KNOWN_ENTRIES: usize = 20;

/// What a finished detection contributes to the profile
#[derive(Debug, Clone)]
pub struct Observation {
    pub fraud_score: f64,
    pub verdict: FraudVerdict,
    pub device_id: Option<String>,
    pub country: Option<String>,
    pub ip_address: Option<String>,
    pub amount: Option<f64>,
    pub occurred_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(request: &FraudDetectionRequest, fraud_score: f64, verdict: FraudVerdict) -> Self {
        Self {
            fraud_score,
            verdict,
            device_id: request.device.as_ref().and_then(|d| d.device_id.clone()),
            country: request.network.as_ref().and_then(|n| n.country.clone()),
            ip_address: request.ip_address.clone(),
            amount: request.amount,
            occurred_at: request.occurred_at,
        }
    }
}

/// Merge `observation` into `profile`.
///
/// The risk score moves toward the observed score by `weight` (an exponential
/// moving average). The behavioral baseline only learns from approved
/// requests, so a rejected device or country never becomes "known".
pub fn merge_observation(
    mut profile: UserRiskProfile,
    observation: &Observation,
    weight: f64,
    now: DateTime<Utc>,
) -> UserRiskProfile {
    let weight = weight.clamp(0.0, 1.0);
    if !observation.fraud_score.is_finite() {
        return profile;
    }
    profile.risk_score =
        ((1.0 - weight) * profile.risk_score + weight * observation.fraud_score).clamp(0.0, 100.0);
    profile.risk_level = RiskLevel::from_score(profile.risk_score);
    profile.last_updated = now;

    if observation.verdict != FraudVerdict::Approved {
        return profile;
    }

    let baseline = &mut profile.baseline;
    if let Some(device) = &observation.device_id {
        remember(&mut baseline.known_devices, device, |a, b| a == b);
    }
    if let Some(country) = &observation.country {
        remember(&mut baseline.known_countries, country, |a, b| a.eq_ignore_ascii_case(b));
    }
    if let Some(ip) = &observation.ip_address {
        remember(&mut baseline.known_ips, ip, |a, b| a == b);
    }
    if let Some(amount) = observation.amount.filter(|a| a.is_finite() && *a >= 0.0) {
        let n = baseline.amount_samples as f64;
        baseline.average_amount = (baseline.average_amount * n + amount) / (n + 1.0);
        baseline.amount_samples += 1;
    }
    if baseline.hourly_activity.len() != 24 {
        baseline.hourly_activity.resize(24, 0);
    }
    let hour = observation.occurred_at.hour() as usize;
    baseline.hourly_activity[hour] = baseline.hourly_activity[hour].saturating_add(1);
    baseline.event_count += 1;

    profile
}

/// Move `value` to the back of `list`, evicting the oldest entry when full
fn remember<F>(list: &mut Vec<String>, value: &str, same: F)
where
    F: Fn(&str, &str) -> bool,
{
    list.retain(|v| !same(v.as_str(), value));
    list.push(value.to_string());
    if list.len() > MAX_KNOWN_ENTRIES {
        let excess = list.len() - MAX_KNOWN_ENTRIES;
        list.drain(..excess);
    }
}
