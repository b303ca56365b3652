// src/events.rs
//! Events published after a fraud decision

use crate::actions::{FraudVerdict, RecommendedAction};
use crate::types::FraudDetectionResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const FRAUD_DETECTED_EVENT: &str = "fraud.detection.completed";

/// Notification carrying the outcome of one `detect_fraud` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub request_id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub operation_type: String,
    pub fraud_score: f64,
    pub fraud_verdict: FraudVerdict,
    pub recommended_action: RecommendedAction,
    pub occurred_at: DateTime<Utc>,
}

impl FraudEvent {
    pub fn from_response(response: &FraudDetectionResponse, operation_type: &str) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: FRAUD_DETECTED_EVENT.to_string(),
            request_id: response.request_id.clone(),
            user_id: response.user_id.clone(),
            tenant_id: response.tenant_id.clone(),
            operation_type: operation_type.to_string(),
            fraud_score: response.fraud_score,
            fraud_verdict: response.fraud_verdict,
            recommended_action: response.recommended_action,
            occurred_at: Utc::now(),
        }
    }
}
