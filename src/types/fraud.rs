// src/types/fraud.rs
//! Fraud detection call contract

use super::{Anomaly, DeviceInfo, GeoInfo, RiskFactor, Value};
use crate::actions::{FraudVerdict, RecommendedAction};
use ahash::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input to `FraudEngine::detect_fraud`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudDetectionRequest {
    pub request_id: String,
    pub user_id: String,
    pub tenant_id: String,
    /// LOGIN, TRANSFER, PAYMENT, ...
    pub operation_type: String,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub ip_address: Option<String>,
    /// Caller-supplied network info; looked up from `ip_address` when absent
    pub network: Option<GeoInfo>,
    pub device: Option<DeviceInfo>,
    pub attributes: HashMap<String, Value>,
    pub occurred_at: DateTime<Utc>,
}

impl FraudDetectionRequest {
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
            amount: None,
            currency: None,
            ip_address: None,
            network: None,
            device: None,
            attributes: HashMap::default(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_amount(mut self, amount: f64, currency: impl Into<String>) -> Self {
        self.amount = Some(amount);
        self.currency = Some(currency.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_network(mut self, network: GeoInfo) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

/// Output of `FraudEngine::detect_fraud`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudDetectionResponse {
    pub request_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub fraud_score: f64,
    pub fraud_verdict: FraudVerdict,
    pub fraud_confidence: f64,
    pub recommended_action: RecommendedAction,
    pub risk_factors: Vec<RiskFactor>,
    pub anomalies: Vec<Anomaly>,
    /// Collectors that failed and contributed nothing
    pub failed_collectors: Vec<String>,
    pub processing_time_ms: u64,
    pub evaluated_at: DateTime<Utc>,
}
