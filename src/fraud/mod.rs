// src/fraud/mod.rs
//! Fraud engine
//!
//! Scores operations for fraud and maps the score onto a verdict and a single
//! recommended action. Signals come from independent collectors:
//!
//! - fraud rules (built-in catalogue plus tenant rules of category `fraud`)
//! - behavior analysis against the user's baseline
//! - an optional ML scorer
//! - the in-process velocity check
//!
//! A failing collector contributes nothing and lowers the confidence of the
//! result; only validation and context errors fail a detection. Profile
//! updates and event publication happen after the response, detached from the
//! caller's context.

pub mod behavior;
pub mod consolidation;
pub mod profile;
pub mod rules;
pub mod tasks;
pub mod velocity;

pub use behavior::BaselineBehaviorAnalyzer;
pub use consolidation::{consolidate, Consolidated, ConsolidationSettings};
pub use profile::{merge_observation, Observation};
pub use rules::{builtin_fraud_rules, FRAUD_CATEGORY};
pub use tasks::BackgroundTasks;
pub use velocity::VelocityChecker;

use crate::actions::FraudVerdict;
use crate::cache::{self, profile_cache_key};
use crate::config::FraudEngineConfig;
use crate::context::Context;
use crate::events::FraudEvent;
use crate::repository::{
    BehaviorAnalyzer, CachingService, EventBus, GeoIpService, MlProcessor, UserProfileRepository,
};
use crate::risk::{validate_amount, validate_identity};
use crate::rules::{ConditionEvaluator, RuleEvaluator, RuleSubject, RuleTable};
use crate::types::{
    Anomaly, FraudDetectionRequest, FraudDetectionResponse, RiskFactor, RiskRule, UserRiskProfile,
};
use crate::{EngineError, Result};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

const RULES_COLLECTOR: &str = "rules";
const BEHAVIOR_COLLECTOR: &str = "behavior";
const ML_COLLECTOR: &str = "ml";

/// Fraud detection engine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FraudEngine {
    inner: Arc<Inner>,
}

struct Inner {
    config: FraudEngineConfig,
    settings: ConsolidationSettings,
    table: Arc<RuleTable>,
    evaluator: RuleEvaluator,
    builtin_rules: Vec<RiskRule>,
    user_profiles: Arc<dyn UserProfileRepository>,
    cache: Option<Arc<dyn CachingService>>,
    geo_ip: Option<Arc<dyn GeoIpService>>,
    behavior: Option<Arc<dyn BehaviorAnalyzer>>,
    ml: Option<Arc<dyn MlProcessor>>,
    events: Option<Arc<dyn EventBus>>,
    velocity: VelocityChecker,
    tasks: BackgroundTasks,
}

/// Builder for [`FraudEngine`]
pub struct FraudEngineBuilder {
    config: FraudEngineConfig,
    table: Arc<RuleTable>,
    user_profiles: Arc<dyn UserProfileRepository>,
    evaluator: RuleEvaluator,
    cache: Option<Arc<dyn CachingService>>,
    geo_ip: Option<Arc<dyn GeoIpService>>,
    behavior: Option<Arc<dyn BehaviorAnalyzer>>,
    ml: Option<Arc<dyn MlProcessor>>,
    events: Option<Arc<dyn EventBus>>,
}

impl FraudEngineBuilder {
    pub fn with_cache(mut self, cache: Arc<dyn CachingService>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_geo_ip(mut self, geo_ip: Arc<dyn GeoIpService>) -> Self {
        self.geo_ip = Some(geo_ip);
        self
    }

    /// Replace the default [`BaselineBehaviorAnalyzer`]
    pub fn with_behavior_analyzer(mut self, analyzer: Arc<dyn BehaviorAnalyzer>) -> Self {
        self.behavior = Some(analyzer);
        self
    }

    pub fn with_ml_processor(mut self, ml: Arc<dyn MlProcessor>) -> Self {
        self.ml = Some(ml);
        self
    }

    pub fn with_event_bus(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_condition_evaluator(mut self, conditions: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = RuleEvaluator::new(conditions);
        self
    }

    /// Validate the configuration, then [`build`](Self::build)
    pub fn try_build(self) -> Result<FraudEngine> {
        self.config.validate()?;
        Ok(self.build())
    }

    /// Build without validating the configuration; see [`try_build`](Self::try_build)
    pub fn build(self) -> FraudEngine {
        let config = self.config;
        let settings = ConsolidationSettings {
            all_clear_score: config.all_clear_score,
            all_clear_confidence: config.all_clear_confidence,
            anomaly_default_score: config.anomaly_default_score,
        };
        let velocity = VelocityChecker::new(
            config.velocity_window(),
            config.velocity_max_events,
            std::time::Duration::from_secs(config.velocity_min_interval_secs),
        );

        FraudEngine {
            inner: Arc::new(Inner {
                config,
                settings,
                table: self.table,
                evaluator: self.evaluator,
                builtin_rules: builtin_fraud_rules(),
                user_profiles: self.user_profiles,
                cache: self.cache,
                geo_ip: self.geo_ip,
                behavior: self.behavior,
                ml: self.ml,
                events: self.events,
                velocity,
                tasks: BackgroundTasks::new(),
            }),
        }
    }
}

/// Per-request results of [`FraudEngine::batch_detect_fraud`], in request order.
///
/// Exactly one of `responses[i]` and `errors[i]` is set.
#[derive(Debug, Default)]
#[must_use = "failed requests are only reported through `errors` and `aggregate_error`"]
pub struct BatchDetection {
    pub responses: Vec<Option<FraudDetectionResponse>>,
    pub errors: Vec<Option<EngineError>>,
}

impl BatchDetection {
    fn with_capacity(n: usize) -> Self {
        Self {
            responses: Vec::with_capacity(n),
            errors: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, outcome: Result<FraudDetectionResponse>) {
        match outcome {
            Ok(response) => {
                self.responses.push(Some(response));
                self.errors.push(None);
            }
            Err(e) => {
                self.responses.push(None);
                self.errors.push(Some(e));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    pub fn failed(&self) -> usize {
        self.errors.iter().filter(|e| e.is_some()).count()
    }

    /// First error in request order
    pub fn first_error(&self) -> Option<&EngineError> {
        self.errors.iter().flatten().next()
    }

    /// `EngineError::Batch` when any request failed
    pub fn aggregate_error(&self) -> Option<EngineError> {
        let failed = self.failed();
        (failed > 0).then(|| EngineError::Batch {
            failed,
            total: self.len(),
        })
    }
}

impl FraudEngine {
    pub fn builder(
        config: FraudEngineConfig,
        table: Arc<RuleTable>,
        user_profiles: Arc<dyn UserProfileRepository>,
    ) -> FraudEngineBuilder {
        FraudEngineBuilder {
            config,
            table,
            user_profiles,
            evaluator: RuleEvaluator::default(),
            cache: None,
            geo_ip: None,
            behavior: Some(Arc::new(BaselineBehaviorAnalyzer::new())),
            ml: None,
            events: None,
        }
    }

    pub fn config(&self) -> &FraudEngineConfig {
        &self.inner.config
    }

    pub fn velocity(&self) -> &VelocityChecker {
        &self.inner.velocity
    }

    /// Score one operation for fraud
    #[instrument(
        skip_all,
        fields(
            request_id = %request.request_id,
            user_id = %request.user_id,
            tenant_id = %request.tenant_id,
            operation = %request.operation_type,
        )
    )]
    pub async fn detect_fraud(
        &self,
        ctx: &Context,
        request: FraudDetectionRequest,
    ) -> Result<FraudDetectionResponse> {
        let started = Instant::now();
        validate_identity(&request.user_id, &request.tenant_id)?;
        validate_amount(request.amount)?;
        let inner = &self.inner;

        let request = self.enrich(ctx, request).await?;
        let profile = self.load_profile(ctx, &request.user_id, &request.tenant_id).await?;

        let behavior = async {
            match &inner.behavior {
                Some(analyzer) if inner.config.enable_behavior_analysis => {
                    collect(ctx, BEHAVIOR_COLLECTOR, analyzer.analyze(&request, &profile)).await
                }
                _ => Ok(Some(Vec::new())),
            }
        };
        let ml = async {
            match &inner.ml {
                Some(ml) if inner.config.enable_ml_scoring => {
                    collect(ctx, ML_COLLECTOR, ml.score(&request, &profile)).await
                }
                _ => Ok(Some(Vec::new())),
            }
        };
        let (rules, behavior, ml) =
            tokio::join!(self.rule_factors(ctx, &request, &profile), behavior, ml);

        let mut failed_collectors = Vec::new();
        let (risk_factors, rules_ok) = rules?;
        if !rules_ok {
            failed_collectors.push(RULES_COLLECTOR.to_string());
        }
        let mut anomalies = Vec::new();
        for (name, outcome) in [(BEHAVIOR_COLLECTOR, behavior?), (ML_COLLECTOR, ml?)] {
            match outcome {
                Some(found) => anomalies.extend(found),
                None => failed_collectors.push(name.to_string()),
            }
        }
        anomalies.extend(inner.velocity.check(
            &request.tenant_id,
            &request.user_id,
            request.occurred_at,
        ));

        let consolidated = consolidate(&risk_factors, &anomalies, &inner.settings);
        let penalty = inner.config.collector_failure_penalty * failed_collectors.len() as f64;
        let fraud_confidence = (consolidated.confidence - penalty).max(0.0);
        let fraud_verdict = FraudVerdict::from_score(
            consolidated.score,
            inner.config.medium_risk_threshold,
            inner.config.high_risk_threshold,
        );
        let severities = risk_factors
            .iter()
            .map(|f| f.severity)
            .chain(anomalies.iter().map(|a| a.severity));
        let recommended_action = fraud_verdict.recommended_action(severities);

        let response = FraudDetectionResponse {
            request_id: request.request_id.clone(),
            user_id: request.user_id.clone(),
            tenant_id: request.tenant_id.clone(),
            fraud_score: consolidated.score,
            fraud_verdict,
            fraud_confidence,
            recommended_action,
            risk_factors,
            anomalies,
            failed_collectors,
            processing_time_ms: started.elapsed().as_millis() as u64,
            evaluated_at: Utc::now(),
        };

        self.schedule_follow_up(&request, &response, profile);

        info!(
            fraud_score = response.fraud_score,
            verdict = %response.fraud_verdict,
            action = %response.recommended_action,
            confidence = response.fraud_confidence,
            failed_collectors = response.failed_collectors.len(),
            "fraud detection finished"
        );
        Ok(response)
    }

    /// Run [`detect_fraud`](Self::detect_fraud) for every request concurrently.
    ///
    /// One failing request does not affect the others; results keep request order.
    pub async fn batch_detect_fraud(
        &self,
        ctx: &Context,
        requests: Vec<FraudDetectionRequest>,
    ) -> BatchDetection {
        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let engine = self.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move { engine.detect_fraud(&ctx, request).await })
            })
            .collect();

        let mut batch = BatchDetection::with_capacity(handles.len());
        for handle in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(EngineError::Internal(format!("detection task failed: {}", e))),
            };
            batch.push(outcome);
        }

        info!(total = batch.len(), failed = batch.failed(), "batch detection finished");
        batch
    }

    /// Persist a profile and refresh its cache entry
    pub async fn update_user_profile(&self, ctx: &Context, profile: UserRiskProfile) -> Result<()> {
        validate_identity(&profile.user_id, &profile.tenant_id)?;
        ctx.run(self.inner.user_profiles.save_user_profile(&profile)).await??;
        self.cache_profile(ctx, &profile).await?;
        debug!(
            user_id = %profile.user_id,
            tenant_id = %profile.tenant_id,
            risk_score = profile.risk_score,
            "user profile updated"
        );
        Ok(())
    }

    /// Cached or stored profile of a user; `NotFound` when there is none
    pub async fn get_user_risk_profile(
        &self,
        ctx: &Context,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<UserRiskProfile> {
        validate_identity(user_id, tenant_id)?;
        self.fetch_profile(ctx, user_id, tenant_id).await?.ok_or_else(|| {
            EngineError::NotFound(format!("no risk profile for {}/{}", tenant_id, user_id))
        })
    }

    /// Wait for pending profile updates and event publications
    pub async fn drain_background(&self) {
        self.inner.tasks.drain().await;
    }

    async fn enrich(
        &self,
        ctx: &Context,
        mut request: FraudDetectionRequest,
    ) -> Result<FraudDetectionRequest> {
        if request.network.is_some() {
            return Ok(request);
        }
        let (Some(geo_ip), Some(ip)) = (&self.inner.geo_ip, &request.ip_address) else {
            return Ok(request);
        };
        match ctx.run(geo_ip.enrich_ip_data(ip)).await? {
            Ok(geo) => request.network = Some(geo),
            Err(e) => warn!(ip = %ip, error = %e, "geo/ip enrichment failed, continuing"),
        }
        Ok(request)
    }

    /// Rule factors and whether the tenant's rules could be consulted
    async fn rule_factors(
        &self,
        ctx: &Context,
        request: &FraudDetectionRequest,
        profile: &UserRiskProfile,
    ) -> Result<(Vec<RiskFactor>, bool)> {
        let inner = &self.inner;
        let policy = match inner.table.policy(ctx, &request.tenant_id).await {
            Ok(policy) => Some(policy),
            Err(e) if e.is_context() => return Err(e),
            Err(e) => {
                warn!(error = %e, "tenant fraud rules unavailable, using built-in rules only");
                None
            }
        };

        let tenant_rules = policy
            .as_ref()
            .map(|p| p.rules_in_category(FRAUD_CATEGORY))
            .unwrap_or_default();
        // A tenant rule replaces the built-in rule with the same id.
        let builtin = inner
            .builtin_rules
            .iter()
            .filter(|b| !tenant_rules.iter().any(|t| t.id == b.id));
        let rules = builtin.chain(tenant_rules.iter().map(|r| Arc::as_ref(r)));

        let subject = RuleSubject {
            tenant_id: &request.tenant_id,
            operation_type: &request.operation_type,
            amount: request.amount,
            geo: request.network.as_ref(),
            device: request.device.as_ref(),
            attributes: &request.attributes,
            baseline: Some(&profile.baseline),
        };
        let evaluation = inner.evaluator.evaluate(rules, &subject, |rule| rule.weight);
        Ok((evaluation.factors, policy.is_some()))
    }

    /// Profile for the decision path: neutral when missing or unreachable
    async fn load_profile(
        &self,
        ctx: &Context,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<UserRiskProfile> {
        match self.fetch_profile(ctx, user_id, tenant_id).await {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => {
                debug!("no stored profile, using neutral profile");
                Ok(UserRiskProfile::neutral(user_id, tenant_id))
            }
            Err(e) if e.is_context() => Err(e),
            Err(e) => {
                warn!(error = %e, "user profile unavailable, using neutral profile");
                Ok(UserRiskProfile::neutral(user_id, tenant_id))
            }
        }
    }

    /// Cache first, then the store; a store hit is written back to the cache
    async fn fetch_profile(
        &self,
        ctx: &Context,
        user_id: &str,
        tenant_id: &str,
    ) -> Result<Option<UserRiskProfile>> {
        let inner = &self.inner;
        if let Some(cache) = &inner.cache {
            let key = profile_cache_key(user_id, tenant_id);
            match ctx.run(cache::get_typed::<UserRiskProfile>(cache.as_ref(), &key)).await? {
                Ok(Some(profile)) => return Ok(Some(profile)),
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "profile cache read failed"),
            }
        }

        let stored = ctx.run(inner.user_profiles.get_user_profile(user_id, tenant_id)).await??;
        if let Some(profile) = &stored {
            self.cache_profile(ctx, profile).await?;
        }
        Ok(stored)
    }

    async fn cache_profile(&self, ctx: &Context, profile: &UserRiskProfile) -> Result<()> {
        let Some(cache) = &self.inner.cache else {
            return Ok(());
        };
        let key = profile_cache_key(&profile.user_id, &profile.tenant_id);
        let ttl = self.inner.config.profile_cache_ttl();
        if let Err(e) = ctx.run(cache::set_typed(cache.as_ref(), &key, profile, ttl)).await? {
            warn!(key, error = %e, "profile cache write failed");
        }
        Ok(())
    }

    fn schedule_follow_up(
        &self,
        request: &FraudDetectionRequest,
        response: &FraudDetectionResponse,
        profile: UserRiskProfile,
    ) {
        let inner = &self.inner;
        let timeout = inner.config.background_timeout();

        let observation = Observation::new(request, response.fraud_score, response.fraud_verdict);
        let engine = self.clone();
        inner.tasks.spawn("profile_update", timeout, move |ctx| async move {
            engine.record_observation(&ctx, profile, observation).await
        });

        if let Some(bus) = inner.events.clone() {
            let event = FraudEvent::from_response(response, &request.operation_type);
            inner.tasks.spawn("event_publish", timeout, move |ctx| async move {
                ctx.run(bus.publish_event(event)).await?
            });
        }
    }

    /// Merge an observation into the freshest stored copy of the profile
    async fn record_observation(
        &self,
        ctx: &Context,
        loaded: UserRiskProfile,
        observation: Observation,
    ) -> Result<()> {
        let inner = &self.inner;
        let stored = ctx
            .run(inner.user_profiles.get_user_profile(&loaded.user_id, &loaded.tenant_id))
            .await??;
        let current = stored.unwrap_or(loaded);
        let merged = merge_observation(
            current,
            &observation,
            inner.config.profile_update_weight,
            Utc::now(),
        );
        self.update_user_profile(ctx, merged).await
    }
}

/// Run one detector; `None` when it failed or returned non-finite numbers.
/// Only context errors escape.
async fn collect<F>(
    ctx: &Context,
    name: &'static str,
    detector: F,
) -> Result<Option<Vec<Anomaly>>>
where
    F: Future<Output = Result<Vec<Anomaly>>>,
{
    match ctx.run(detector).await? {
        Ok(found) if found.iter().any(|a| !is_finite_anomaly(a)) => {
            warn!(collector = name, "collector returned non-finite output, discarding it");
            Ok(None)
        }
        Ok(found) => {
            debug!(collector = name, anomalies = found.len(), "collector finished");
            Ok(Some(found))
        }
        Err(e) if e.is_context() => Err(e),
        Err(e) => {
            warn!(collector = name, error = %e, "collector failed, continuing without it");
            Ok(None)
        }
    }
}

fn is_finite_anomaly(anomaly: &Anomaly) -> bool {
    anomaly.confidence.is_finite() && anomaly.score.map_or(true, f64::is_finite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::RecommendedAction;
    use crate::cache::MemoryCache;
    use crate::repository::memory::{
        FixedDetector, InMemoryProfileRepository, InMemoryRuleRepository,
        InMemoryUserProfileRepository, RecordingEventBus,
    };
    use crate::rules::Condition;
    use crate::types::{AnomalySource, GeoInfo, RiskEvaluationProfile, Severity, WILDCARD};
    use crate::ContextError;

    fn quiet_config() -> FraudEngineConfig {
        FraudEngineConfig {
            velocity_min_interval_secs: 0,
            velocity_max_events: 1_000,
            ..Default::default()
        }
    }

    async fn table(rules: InMemoryRuleRepository) -> Arc<RuleTable> {
        let profiles = InMemoryProfileRepository::new();
        profiles.set_default(RiskEvaluationProfile::new("default", WILDCARD));
        Arc::new(
            RuleTable::load(&Context::background(), Arc::new(rules), Arc::new(profiles))
                .await
                .unwrap(),
        )
    }

    async fn builder(store: Arc<InMemoryUserProfileRepository>) -> FraudEngineBuilder {
        FraudEngine::builder(quiet_config(), table(InMemoryRuleRepository::new()).await, store)
    }

    #[tokio::test]
    async fn test_clean_request_all_clear() {
        let store = Arc::new(InMemoryUserProfileRepository::new());
        let engine = builder(store).await.build();

        let response = engine
            .detect_fraud(&Context::background(), FraudDetectionRequest::new("u1", "acme", "LOGIN"))
            .await
            .unwrap();
        assert_eq!(response.fraud_score, 10.0);
        assert_eq!(response.fraud_confidence, 30.0);
        assert_eq!(response.fraud_verdict, FraudVerdict::Approved);
        assert_eq!(response.recommended_action, RecommendedAction::Allow);
        assert!(response.failed_collectors.is_empty());
    }

    #[tokio::test]
    async fn test_anonymizer_goes_to_review() {
        let store = Arc::new(InMemoryUserProfileRepository::new());
        let engine = builder(store).await.build();
        let request = FraudDetectionRequest::new("u1", "acme", "LOGIN").with_network(GeoInfo {
            is_vpn: true,
            ..GeoInfo::country("NL")
        });

        let response = engine.detect_fraud(&Context::background(), request).await.unwrap();
        assert_eq!(response.risk_factors.len(), 1);
        assert_eq!(response.risk_factors[0].code, rules::ANONYMIZER_DETECTED);
        assert_eq!(response.fraud_verdict, FraudVerdict::Review);
        assert_eq!(response.recommended_action, RecommendedAction::AdditionalAuthentication);
    }

    #[tokio::test]
    async fn test_tenant_rule_overrides_builtin() {
        let repo = InMemoryRuleRepository::new();
        repo.add(
            RiskRule::new(rules::ANONYMIZER_DETECTED, FRAUD_CATEGORY, Condition::AnonymizerDetected)
                .with_tenant("acme")
                .with_severity(Severity::Low)
                .with_confidence(50.0),
        );
        let store = Arc::new(InMemoryUserProfileRepository::new());
        let engine = FraudEngine::builder(quiet_config(), table(repo).await, store).build();
        let request = FraudDetectionRequest::new("u1", "acme", "LOGIN").with_network(GeoInfo {
            is_tor: true,
            ..Default::default()
        });

        let response = engine.detect_fraud(&Context::background(), request).await.unwrap();
        assert_eq!(response.risk_factors.len(), 1);
        assert_eq!(response.risk_factors[0].severity, Severity::Low);
        assert_eq!(response.fraud_verdict, FraudVerdict::Approved);
    }

    #[tokio::test]
    async fn test_failed_collectors_lower_confidence() {
        let store = Arc::new(InMemoryUserProfileRepository::new());
        let anomaly = Anomaly::new("M1", AnomalySource::Ml, Severity::Medium, 80.0, "");
        let engine = builder(store.clone())
            .await
            .with_behavior_analyzer(Arc::new(FixedDetector::failing()))
            .with_ml_processor(Arc::new(FixedDetector::returning(vec![anomaly])))
            .build();

        let response = engine
            .detect_fraud(&Context::background(), FraudDetectionRequest::new("u1", "acme", "LOGIN"))
            .await
            .unwrap();
        assert_eq!(response.failed_collectors, vec![BEHAVIOR_COLLECTOR.to_string()]);
        assert_eq!(response.anomalies.len(), 1);
        assert!((response.fraud_confidence - 70.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_profile_store_outage_uses_neutral_profile() {
        let store = Arc::new(InMemoryUserProfileRepository::new());
        store.set_unavailable(true);
        let engine = builder(store).await.build();

        let response = engine
            .detect_fraud(&Context::background(), FraudDetectionRequest::new("u1", "acme", "LOGIN"))
            .await
            .unwrap();
        assert_eq!(response.fraud_verdict, FraudVerdict::Approved);
        engine.drain_background().await;
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_fast() {
        let store = Arc::new(InMemoryUserProfileRepository::new());
        let engine = builder(store).await.build();
        let ctx = Context::background();
        ctx.cancel();

        let err = engine
            .detect_fraud(&ctx, FraudDetectionRequest::new("u1", "acme", "LOGIN"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Context(ContextError::Cancelled)));
    }

    #[tokio::test]
    async fn test_background_update_and_event() {
        let store = Arc::new(InMemoryUserProfileRepository::new());
        let bus = Arc::new(RecordingEventBus::new());
        let engine = builder(store.clone())
            .await
            .with_cache(Arc::new(MemoryCache::new()))
            .with_event_bus(bus.clone())
            .build();
        let ctx = Context::background();

        let response = engine
            .detect_fraud(&ctx, FraudDetectionRequest::new("u1", "acme", "PAYMENT"))
            .await
            .unwrap();
        engine.drain_background().await;

        assert_eq!(store.save_count(), 1);
        let profile = engine.get_user_risk_profile(&ctx, "u1", "acme").await.unwrap();
        // 0.7 * 50 + 0.3 * 10
        assert!((profile.risk_score - 38.0).abs() < 1e-9);
        assert_eq!(profile.baseline.event_count, 1);

        let events = bus.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].request_id, response.request_id);
        assert_eq!(events[0].operation_type, "PAYMENT");
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_found() {
        let store = Arc::new(InMemoryUserProfileRepository::new());
        let engine = builder(store).await.build();
        let err = engine
            .get_user_risk_profile(&Context::background(), "nobody", "acme")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_batch_keeps_order_and_isolates_failures() {
        let store = Arc::new(InMemoryUserProfileRepository::new());
        let engine = builder(store).await.build();
        let requests = vec![
            FraudDetectionRequest::new("u1", "acme", "LOGIN"),
            FraudDetectionRequest::new("", "acme", "LOGIN"),
            FraudDetectionRequest::new("u3", "acme", "LOGIN"),
        ];
        let ids: Vec<String> = requests.iter().map(|r| r.request_id.clone()).collect();

        let batch = engine.batch_detect_fraud(&Context::background(), requests).await;
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.failed(), 1);
        assert!(matches!(batch.errors[1], Some(EngineError::Validation(_))));
        assert_eq!(batch.responses[0].as_ref().unwrap().request_id, ids[0]);
        assert_eq!(batch.responses[2].as_ref().unwrap().request_id, ids[2]);
        assert!(matches!(
            batch.aggregate_error(),
            Some(EngineError::Batch { failed: 1, total: 3 })
        ));
    }

    #[tokio::test]
    async fn test_non_finite_detector_output_fails_the_collector() {
        let store = Arc::new(InMemoryUserProfileRepository::new());
        let broken = Anomaly::new("M1", AnomalySource::Ml, Severity::Critical, f64::NAN, "");
        let engine = builder(store)
            .await
            .with_ml_processor(Arc::new(FixedDetector::returning(vec![broken])))
            .build();
        let request = FraudDetectionRequest::new("u1", "acme", "LOGIN").with_network(GeoInfo {
            is_tor: true,
            ..Default::default()
        });

        let response = engine.detect_fraud(&Context::background(), request).await.unwrap();
        assert_eq!(response.failed_collectors, vec![ML_COLLECTOR.to_string()]);
        assert!(response.anomalies.is_empty());
        assert!((response.fraud_score - 75.0).abs() < 1e-9);
        assert!((response.fraud_confidence - 80.0).abs() < 1e-9);
        assert_eq!(response.fraud_verdict, FraudVerdict::Review);
    }

    #[tokio::test]
    async fn test_unusable_amounts_rejected() {
        let store = Arc::new(InMemoryUserProfileRepository::new());
        let engine = builder(store.clone()).await.build();
        let ctx = Context::background();

        for amount in [f64::NAN, f64::INFINITY, -5.0] {
            let request = FraudDetectionRequest::new("u1", "acme", "PAYMENT")
                .with_amount(amount, "USD");
            let err = engine.detect_fraud(&ctx, request).await.unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
        }
        engine.drain_background().await;
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_try_build_validates_config() {
        let store = Arc::new(InMemoryUserProfileRepository::new());
        let config = FraudEngineConfig {
            medium_risk_threshold: 90.0,
            high_risk_threshold: 40.0,
            ..quiet_config()
        };
        let rules = table(InMemoryRuleRepository::new()).await;
        let result = FraudEngine::builder(config, rules, store).try_build();
        assert!(matches!(result, Err(EngineError::Configuration(_))));

        let store = Arc::new(InMemoryUserProfileRepository::new());
        assert!(builder(store).await.try_build().is_ok());
    }
}
