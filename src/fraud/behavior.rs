// src/fraud/behavior.rs
//! Baseline behavior analysis
//!
//! Compares a request against the user's learned habits. Users without history
//! produce no anomalies: there is nothing to deviate from.

use crate::repository::BehaviorAnalyzer;
use crate::types::{Anomaly, AnomalySource, FraudDetectionRequest, Severity, UserRiskProfile};
use crate::Result;
use async_trait::async_trait;
use chrono::Timelike;

pub const UNKNOWN_DEVICE: &str = "UNKNOWN_DEVICE";
pub const UNFAMILIAR_COUNTRY: &str = "UNFAMILIAR_COUNTRY";
pub const UNUSUAL_HOUR: &str = "UNUSUAL_HOUR";
pub const AMOUNT_SPIKE: &str = "AMOUNT_SPIKE";

/// [`BehaviorAnalyzer`] backed by [`BehavioralBaseline`](crate::types::BehavioralBaseline)
#[derive(Debug, Clone)]
pub struct BaselineBehaviorAnalyzer {
    /// Amount over `average * amount_spike_factor` is a spike
    pub amount_spike_factor: f64,
    /// Amount observations needed before spikes are judged
    pub min_amount_samples: u64,
    /// Hours holding less than this share of past activity are unusual
    pub unusual_hour_share: f64,
    /// Events needed before hours are judged
    pub min_hourly_events: u64,
}

impl Default for BaselineBehaviorAnalyzer {
    fn default() -> Self {
        Self {
            amount_spike_factor: 5.0,
            min_amount_samples: 3,
            unusual_hour_share: 0.02,
            min_hourly_events: 20,
        }
    }
}

impl BaselineBehaviorAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous core of [`BehaviorAnalyzer::analyze`]
    pub fn inspect(
        &self,
        request: &FraudDetectionRequest,
        profile: &UserRiskProfile,
    ) -> Vec<Anomaly> {
        let baseline = &profile.baseline;
        let mut anomalies = Vec::new();
        if profile.is_new() {
            return anomalies;
        }

        if let Some(device_id) = request.device.as_ref().and_then(|d| d.device_id.as_deref()) {
            if !baseline.knows_device(device_id) {
                anomalies.push(Anomaly::new(
                    UNKNOWN_DEVICE,
                    AnomalySource::Behavior,
                    Severity::Medium,
                    70.0,
                    format!("device {} not seen before", device_id),
                ));
            }
        }

        if let Some(country) = request.network.as_ref().and_then(|n| n.country.as_deref()) {
            if !baseline.knows_country(country) {
                anomalies.push(Anomaly::new(
                    UNFAMILIAR_COUNTRY,
                    AnomalySource::Behavior,
                    Severity::Medium,
                    65.0,
                    format!("first activity from {}", country),
                ));
            }
        }

        if baseline.event_count >= self.min_hourly_events {
            let hour = request.occurred_at.hour();
            if let Some(share) = baseline.hour_share(hour) {
                if share < self.unusual_hour_share {
                    anomalies.push(Anomaly::new(
                        UNUSUAL_HOUR,
                        AnomalySource::Behavior,
                        Severity::Low,
                        50.0,
                        format!("activity at {:02}:00 UTC is unusual for this user", hour),
                    ));
                }
            }
        }

        if let Some(amount) = request.amount {
            if baseline.amount_samples >= self.min_amount_samples && baseline.average_amount > 0.0 {
                let ratio = amount / baseline.average_amount;
                if ratio > self.amount_spike_factor {
                    anomalies.push(
                        Anomaly::new(
                            AMOUNT_SPIKE,
                            AnomalySource::Behavior,
                            Severity::High,
                            75.0,
                            format!("amount is {:.1}x the user's average", ratio),
                        )
                        .with_score((50.0 + 5.0 * ratio).min(100.0)),
                    );
                }
            }
        }

        anomalies
    }
}

#[async_trait]
impl BehaviorAnalyzer for BaselineBehaviorAnalyzer {
    async fn analyze(
        &self,
        request: &FraudDetectionRequest,
        profile: &UserRiskProfile,
    ) -> Result<Vec<Anomaly>> {
        Ok(self.inspect(request, profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceInfo, GeoInfo};
    use chrono::{TimeZone, Utc};

    fn seasoned_profile() -> UserRiskProfile {
        let mut profile = UserRiskProfile::neutral("u1", "acme");
        profile.baseline.known_devices = vec!["phone-1".to_string()];
        profile.baseline.known_countries = vec!["US".to_string()];
        profile.baseline.average_amount = 100.0;
        profile.baseline.amount_samples = 10;
        profile.baseline.event_count = 40;
        profile.baseline.hourly_activity = vec![0; 24];
        profile.baseline.hourly_activity[14] = 40;
        profile
    }

    fn familiar_request() -> FraudDetectionRequest {
        FraudDetectionRequest::new("u1", "acme", "PAYMENT")
            .with_amount(120.0, "USD")
            .with_device(DeviceInfo::with_id("phone-1"))
            .with_network(GeoInfo::country("US"))
            .at(Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 0).unwrap())
    }

    #[test]
    fn test_new_user_has_no_anomalies() {
        let analyzer = BaselineBehaviorAnalyzer::new();
        let profile = UserRiskProfile::neutral("u1", "acme");
        let request = familiar_request().with_amount(1_000_000.0, "USD");
        assert!(analyzer.inspect(&request, &profile).is_empty());
    }

    #[test]
    fn test_familiar_request_is_quiet() {
        let analyzer = BaselineBehaviorAnalyzer::new();
        assert!(analyzer.inspect(&familiar_request(), &seasoned_profile()).is_empty());
    }

    #[test]
    fn test_every_deviation_reported() {
        let analyzer = BaselineBehaviorAnalyzer::new();
        let request = FraudDetectionRequest::new("u1", "acme", "PAYMENT")
            .with_amount(2_000.0, "USD")
            .with_device(DeviceInfo::with_id("laptop-9"))
            .with_network(GeoInfo::country("BR"))
            .at(Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap());

        let codes: Vec<String> = analyzer
            .inspect(&request, &seasoned_profile())
            .into_iter()
            .map(|a| a.code)
            .collect();
        assert_eq!(codes, vec![UNKNOWN_DEVICE, UNFAMILIAR_COUNTRY, UNUSUAL_HOUR, AMOUNT_SPIKE]);
    }

    #[test]
    fn test_amount_spike_score_is_capped() {
        let analyzer = BaselineBehaviorAnalyzer::new();
        let request = familiar_request().with_amount(1_000_000.0, "USD");
        let anomalies = analyzer.inspect(&request, &seasoned_profile());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].score, Some(100.0));
    }
}
