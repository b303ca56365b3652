// src/repository/memory.rs
//! In-memory collaborators
//!
//! Process-local implementations of every repository interface. They back the
//! demos and tests, and are usable for embedding the engines without a store.

use super::{
    BehaviorAnalyzer, EventBus, GeoIpService, MlProcessor, ProfileRepository, RuleRepository,
    UserProfileRepository,
};
use crate::events::FraudEvent;
use crate::types::{
    Anomaly, FraudDetectionRequest, GeoInfo, RiskEvaluationProfile, RiskRule, UserRiskProfile,
    WILDCARD,
};
use crate::{EngineError, Result};
use ahash::HashMap;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct InMemoryRuleRepository {
    rules: RwLock<Vec<RiskRule>>,
    defaults: RwLock<Vec<RiskRule>>,
}

impl InMemoryRuleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a tenant-scoped (or wildcard) rule
    pub fn add(&self, rule: RiskRule) {
        let mut rules = self.rules.write();
        rules.retain(|r| r.id != rule.id);
        rules.push(rule);
    }

    /// Add or replace a rule returned by `find_default_rules`
    pub fn add_default(&self, rule: RiskRule) {
        let mut defaults = self.defaults.write();
        defaults.retain(|r| r.id != rule.id);
        defaults.push(rule);
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn find_rules(&self, tenant_id: &str, category: Option<&str>) -> Result<Vec<RiskRule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|r| r.applies_to_tenant(tenant_id))
            .filter(|r| category.map_or(true, |c| r.category == c))
            .cloned()
            .collect())
    }

    async fn find_default_rules(&self) -> Result<Vec<RiskRule>> {
        Ok(self.defaults.read().clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<Vec<RiskEvaluationProfile>>,
    default_profile: RwLock<Option<RiskEvaluationProfile>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a profile
    pub fn add(&self, profile: RiskEvaluationProfile) {
        let mut profiles = self.profiles.write();
        profiles.retain(|p| p.id != profile.id);
        profiles.push(profile);
    }

    pub fn set_default(&self, profile: RiskEvaluationProfile) {
        *self.default_profile.write() = Some(profile);
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn find_profiles(
        &self,
        tenant_id: &str,
        operation_type: Option<&str>,
    ) -> Result<Vec<RiskEvaluationProfile>> {
        Ok(self
            .profiles
            .read()
            .iter()
            .filter(|p| p.tenant_id == WILDCARD || p.tenant_id == tenant_id)
            .filter(|p| operation_type.map_or(true, |op| p.applies_to(tenant_id, op)))
            .cloned()
            .collect())
    }

    async fn find_default_profile(&self) -> Result<Option<RiskEvaluationProfile>> {
        Ok(self.default_profile.read().clone())
    }
}

/// User profile store keyed by (tenant, user)
#[derive(Debug, Default)]
pub struct InMemoryUserProfileRepository {
    profiles: DashMap<(String, String), UserRiskProfile>,
    saves: AtomicUsize,
    unavailable: AtomicBool,
}

impl InMemoryUserProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: UserRiskProfile) {
        self.profiles
            .insert((profile.tenant_id.clone(), profile.user_id.clone()), profile);
    }

    /// Make every call fail, simulating an outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(EngineError::Persistence("user profile store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserProfileRepository for InMemoryUserProfileRepository {
    async fn get_user_profile(
        &self,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<Option<UserRiskProfile>> {
        self.check_available()?;
        Ok(self
            .profiles
            .get(&(tenant_id.to_string(), user_id.to_string()))
            .map(|p| p.clone()))
    }

    async fn save_user_profile(&self, profile: &UserRiskProfile) -> Result<()> {
        self.check_available()?;
        self.insert(profile.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Geo/IP lookup from a fixed table; unknown addresses are an error
#[derive(Debug, Default)]
pub struct StaticGeoIp {
    entries: HashMap<String, GeoInfo>,
}

impl StaticGeoIp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, ip: impl Into<String>, geo: GeoInfo) -> Self {
        self.entries.insert(ip.into(), geo);
        self
    }
}

#[async_trait]
impl GeoIpService for StaticGeoIp {
    async fn enrich_ip_data(&self, ip: &str) -> Result<GeoInfo> {
        self.entries
            .get(ip)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("no geo data for {}", ip)))
    }
}

/// Event bus that keeps everything published to it
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    events: Mutex<Vec<FraudEvent>>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FraudEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish_event(&self, event: FraudEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Deterministic stand-in for a behavior analyzer or ML scorer
#[derive(Debug, Clone, Default)]
pub struct FixedDetector {
    anomalies: Vec<Anomaly>,
    delay: Option<Duration>,
    fail: bool,
}

impl FixedDetector {
    /// Always reports `anomalies`
    pub fn returning(anomalies: Vec<Anomaly>) -> Self {
        Self {
            anomalies,
            ..Default::default()
        }
    }

    /// Always fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// Reports `anomalies` after sleeping for `delay`
    pub fn delayed(delay: Duration, anomalies: Vec<Anomaly>) -> Self {
        Self {
            anomalies,
            delay: Some(delay),
            fail: false,
        }
    }

    async fn run(&self, name: &str) -> Result<Vec<Anomaly>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(EngineError::Collector {
                collector: name.to_string(),
                message: "detector unavailable".to_string(),
            });
        }
        Ok(self.anomalies.clone())
    }
}

#[async_trait]
impl BehaviorAnalyzer for FixedDetector {
    async fn analyze(
        &self,
        _request: &FraudDetectionRequest,
        _profile: &UserRiskProfile,
    ) -> Result<Vec<Anomaly>> {
        self.run("behavior").await
    }
}

#[async_trait]
impl MlProcessor for FixedDetector {
    async fn score(
        &self,
        _request: &FraudDetectionRequest,
        _profile: &UserRiskProfile,
    ) -> Result<Vec<Anomaly>> {
        self.run("ml").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Condition;

    #[tokio::test]
    async fn test_rule_lookup_by_tenant_and_category() {
        let repo = InMemoryRuleRepository::new();
        repo.add(RiskRule::new("a", "fraud", Condition::Always).with_tenant("acme"));
        repo.add(RiskRule::new("b", "network", Condition::Always));
        repo.add(RiskRule::new("c", "fraud", Condition::Always).with_tenant("globex"));

        let acme = repo.find_rules("acme", None).await.unwrap();
        assert_eq!(acme.len(), 2);
        let fraud = repo.find_rules("acme", Some("fraud")).await.unwrap();
        assert_eq!(fraud.len(), 1);
        assert_eq!(fraud[0].id, "a");
    }

    #[tokio::test]
    async fn test_profile_lookup_by_operation() {
        let repo = InMemoryProfileRepository::new();
        repo.add(RiskEvaluationProfile::new("login", "acme").with_operations(["LOGIN"]));
        repo.add(RiskEvaluationProfile::new("all", WILDCARD));

        assert_eq!(repo.find_profiles("acme", Some("LOGIN")).await.unwrap().len(), 2);
        assert_eq!(repo.find_profiles("acme", Some("TRANSFER")).await.unwrap().len(), 1);
        assert_eq!(repo.find_profiles("acme", None).await.unwrap().len(), 2);
        assert!(repo.find_default_profile().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_profile_outage() {
        let repo = InMemoryUserProfileRepository::new();
        repo.save_user_profile(&UserRiskProfile::neutral("u1", "acme")).await.unwrap();
        assert!(repo.get_user_profile("u1", "acme").await.unwrap().is_some());

        repo.set_unavailable(true);
        assert!(matches!(
            repo.get_user_profile("u1", "acme").await,
            Err(EngineError::Persistence(_))
        ));
        assert_eq!(repo.save_count(), 1);
    }
}
