// src/repository/mod.rs
//! Interfaces to the engines' external collaborators
//!
//! Stores, cache, enrichment, pluggable detectors and the event bus are all
//! consumed through these traits as `Arc<dyn Trait>`, so any implementation
//! (including the in-memory ones in [`memory`]) can be substituted.

pub mod memory;

use crate::events::FraudEvent;
use crate::types::{
    Anomaly, FraudDetectionRequest, GeoInfo, RiskEvaluationProfile, RiskRule, UserRiskProfile,
};
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Source of rule definitions
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Rules for a tenant, including wildcard-scoped ones; `None` means every category
    async fn find_rules(&self, tenant_id: &str, category: Option<&str>) -> Result<Vec<RiskRule>>;

    /// Rules that apply to every tenant
    async fn find_default_rules(&self) -> Result<Vec<RiskRule>>;
}

/// Source of evaluation profiles
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Profiles for a tenant, including wildcard-tenant ones; `None` means every operation
    async fn find_profiles(
        &self,
        tenant_id: &str,
        operation_type: Option<&str>,
    ) -> Result<Vec<RiskEvaluationProfile>>;

    /// Fallback profile; `None` is a configuration error for the risk engine
    async fn find_default_profile(&self) -> Result<Option<RiskEvaluationProfile>>;
}

/// Durable per-user risk profiles
#[async_trait]
pub trait UserProfileRepository: Send + Sync {
    async fn get_user_profile(&self, user_id: &str, tenant_id: &str)
        -> Result<Option<UserRiskProfile>>;

    async fn save_user_profile(&self, profile: &UserRiskProfile) -> Result<()>;
}

/// Key-value cache with per-entry TTL
#[async_trait]
pub trait CachingService: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;
}

/// Network and location lookup for an IP address
#[async_trait]
pub trait GeoIpService: Send + Sync {
    async fn enrich_ip_data(&self, ip: &str) -> Result<GeoInfo>;
}

/// Detects deviations from a user's historical behavior
#[async_trait]
pub trait BehaviorAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        request: &FraudDetectionRequest,
        profile: &UserRiskProfile,
    ) -> Result<Vec<Anomaly>>;
}

/// Opaque model-based anomaly scorer
#[async_trait]
pub trait MlProcessor: Send + Sync {
    async fn score(
        &self,
        request: &FraudDetectionRequest,
        profile: &UserRiskProfile,
    ) -> Result<Vec<Anomaly>>;
}

/// Downstream notification of verdicts
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish_event(&self, event: FraudEvent) -> Result<()>;
}
