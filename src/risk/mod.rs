// src/risk/mod.rs
//! Risk engine
//!
//! Turns an access request into a risk level and a fixed set of recommended
//! actions. Applicable profiles are evaluated independently and combined by
//! priority; the level always comes from the thresholds of a single profile,
//! because thresholds of different profiles are not comparable.

pub mod scoring;

use crate::actions::ActionPolicy;
use crate::cache::{self, risk_cache_key};
use crate::config::{AggregationPolicy, RiskEngineConfig};
use crate::context::Context;
use crate::repository::{CachingService, GeoIpService};
use crate::rules::{ConditionEvaluator, RuleEvaluator, RuleSubject, RuleTable, TenantPolicy};
use crate::types::{
    GeoInfo, RiskAssessmentRequest, RiskAssessmentResponse, RiskEvaluationProfile, RiskFactor,
    RiskLevel,
};
use crate::{EngineError, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Score and level of one evaluated profile
#[derive(Debug, Clone)]
struct ProfileOutcome {
    profile: Arc<RiskEvaluationProfile>,
    score: f64,
    level: RiskLevel,
    factors: Vec<RiskFactor>,
    considered: usize,
}

/// Access-control risk engine
#[derive(Clone)]
pub struct RiskEngine {
    config: RiskEngineConfig,
    table: Arc<RuleTable>,
    evaluator: RuleEvaluator,
    cache: Option<Arc<dyn CachingService>>,
    geo_ip: Option<Arc<dyn GeoIpService>>,
}

impl RiskEngine {
    pub fn new(config: RiskEngineConfig, table: Arc<RuleTable>) -> Self {
        Self {
            config,
            table,
            evaluator: RuleEvaluator::default(),
            cache: None,
            geo_ip: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn CachingService>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_geo_ip(mut self, geo_ip: Arc<dyn GeoIpService>) -> Self {
        self.geo_ip = Some(geo_ip);
        self
    }

    pub fn with_condition_evaluator(mut self, conditions: Arc<dyn ConditionEvaluator>) -> Self {
        self.evaluator = RuleEvaluator::new(conditions);
        self
    }

    pub fn rule_table(&self) -> &Arc<RuleTable> {
        &self.table
    }

    /// Assess the risk of one request
    #[instrument(
        skip_all,
        fields(
            user_id = %request.user_id,
            tenant_id = %request.tenant_id,
            operation = %request.operation_type,
        )
    )]
    pub async fn evaluate_risk(
        &self,
        ctx: &Context,
        request: RiskAssessmentRequest,
    ) -> Result<RiskAssessmentResponse> {
        validate_identity(&request.user_id, &request.tenant_id)?;
        validate_amount(request.amount)?;

        let key = risk_cache_key(&request.user_id, &request.tenant_id, &request.operation_type);
        if request.use_cache {
            if let Some(mut cached) = self.cached(ctx, &key).await? {
                debug!("serving cached assessment");
                cached.cache_used = true;
                return Ok(cached);
            }
        }

        let policy = self.table.policy(ctx, &request.tenant_id).await?;
        let profiles = self.select_profiles(&policy, &request)?;
        let geo = self.enrich(ctx, &request).await?;

        let subject = RuleSubject {
            tenant_id: &request.tenant_id,
            operation_type: &request.operation_type,
            amount: request.amount,
            geo: geo.as_ref(),
            device: request.device.as_ref(),
            attributes: &request.attributes,
            baseline: None,
        };

        let outcomes: Vec<ProfileOutcome> = profiles
            .into_iter()
            .map(|profile| self.evaluate_profile(&policy, profile, &subject))
            .collect();

        let (risk_score, risk_level) = self.aggregate(&outcomes);
        let considered = outcomes.iter().map(|o| o.considered).sum();
        let risk_factors = merge_factors(&outcomes);
        let confidence_score = scoring::assessment_confidence(
            &risk_factors,
            considered,
            self.config.neutral_confidence,
            self.config.full_evidence_factors,
        );
        let action_policy = ActionPolicy::for_level(risk_level);

        let response = RiskAssessmentResponse {
            request_id: request.request_id.clone(),
            user_id: request.user_id.clone(),
            tenant_id: request.tenant_id.clone(),
            operation_type: request.operation_type.clone(),
            risk_score,
            risk_level,
            confidence_score,
            risk_factors,
            recommended_actions: action_policy.actions,
            allow_operation: action_policy.allow_operation,
            require_additional_auth: action_policy.require_additional_auth,
            evaluated_profiles: outcomes.iter().map(|o| o.profile.id.clone()).collect(),
            cache_used: false,
            assessed_at: Utc::now(),
        };

        if self.config.cache_enabled {
            self.store(ctx, &key, &response).await?;
        }

        info!(
            risk_score = response.risk_score,
            risk_level = %response.risk_level,
            factors = response.risk_factors.len(),
            "risk assessed"
        );
        Ok(response)
    }

    fn select_profiles(
        &self,
        policy: &TenantPolicy,
        request: &RiskAssessmentRequest,
    ) -> Result<Vec<Arc<RiskEvaluationProfile>>> {
        let default_profile = self.table.default_profile();

        let selected: Vec<Arc<RiskEvaluationProfile>> = if request.profile_ids.is_empty() {
            policy
                .profiles
                .iter()
                .filter(|p| p.applies_to(&request.tenant_id, &request.operation_type))
                .cloned()
                .collect()
        } else {
            request
                .profile_ids
                .iter()
                .filter_map(|id| {
                    policy
                        .profile(id)
                        .cloned()
                        .or_else(|| default_profile.clone().filter(|p| &p.id == id))
                })
                .collect()
        };

        if !selected.is_empty() {
            return Ok(selected);
        }

        debug!("no profile matched, using default profile");
        default_profile.map(|p| vec![p]).ok_or_else(|| {
            EngineError::Configuration("no default risk evaluation profile configured".to_string())
        })
    }

    fn evaluate_profile(
        &self,
        policy: &TenantPolicy,
        profile: Arc<RiskEvaluationProfile>,
        subject: &RuleSubject<'_>,
    ) -> ProfileOutcome {
        let rules = profile
            .rule_ids
            .iter()
            .filter_map(|id| policy.rule(id))
            .map(|rule| Arc::as_ref(rule));
        let evaluation = self
            .evaluator
            .evaluate(rules, subject, |rule| profile.weight_for(rule));

        let score = scoring::profile_score(&evaluation.factors);
        let level = scoring::level_for_score(score, &profile.threshold_scores);
        debug!(profile_id = %profile.id, score, %level, "profile evaluated");

        ProfileOutcome {
            profile,
            score,
            level,
            factors: evaluation.factors,
            considered: evaluation.considered,
        }
    }

    fn aggregate(&self, outcomes: &[ProfileOutcome]) -> (f64, RiskLevel) {
        match self.config.aggregation {
            AggregationPolicy::WeightedAverage => {
                let pairs: Vec<(f64, u32)> =
                    outcomes.iter().map(|o| (o.score, o.profile.priority)).collect();
                let score = scoring::priority_weighted_score(&pairs);
                let level = scoring::leading_index(outcomes.iter().map(|o| o.profile.priority))
                    .map(|i| scoring::level_for_score(score, &outcomes[i].profile.threshold_scores))
                    .unwrap_or(RiskLevel::Negligible);
                (score, level)
            }
            AggregationPolicy::MostRestrictive => {
                let score = outcomes.iter().map(|o| o.score).fold(0.0, f64::max);
                let level = outcomes
                    .iter()
                    .map(|o| o.level)
                    .max()
                    .unwrap_or(RiskLevel::Negligible);
                (score, level)
            }
        }
    }

    async fn enrich(
        &self,
        ctx: &Context,
        request: &RiskAssessmentRequest,
    ) -> Result<Option<GeoInfo>> {
        if request.geo.is_some() {
            return Ok(request.geo.clone());
        }
        let (Some(geo_ip), Some(ip)) = (&self.geo_ip, &request.ip_address) else {
            return Ok(None);
        };
        match ctx.run(geo_ip.enrich_ip_data(ip)).await? {
            Ok(geo) => Ok(Some(geo)),
            Err(e) => {
                warn!(ip = %ip, error = %e, "geo/ip enrichment failed, continuing without it");
                Ok(None)
            }
        }
    }

    async fn cached(&self, ctx: &Context, key: &str) -> Result<Option<RiskAssessmentResponse>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        match ctx.run(cache::get_typed(cache.as_ref(), key)).await? {
            Ok(hit) => Ok(hit),
            Err(e) => {
                warn!(key, error = %e, "verdict cache read failed");
                Ok(None)
            }
        }
    }

    async fn store(
        &self,
        ctx: &Context,
        key: &str,
        response: &RiskAssessmentResponse,
    ) -> Result<()> {
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        let ttl = self.config.cache_ttl();
        if let Err(e) = ctx.run(cache::set_typed(cache.as_ref(), key, response, ttl)).await? {
            warn!(key, error = %e, "verdict cache write failed");
        }
        Ok(())
    }
}

/// Reject requests that cannot be attributed to a user and tenant
pub(crate) fn validate_identity(user_id: &str, tenant_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(EngineError::Validation("user_id is required".to_string()));
    }
    if tenant_id.trim().is_empty() {
        return Err(EngineError::Validation("tenant_id is required".to_string()));
    }
    Ok(())
}

/// Reject amounts that would poison scoring and learned baselines
pub(crate) fn validate_amount(amount: Option<f64>) -> Result<()> {
    match amount {
        Some(a) if !a.is_finite() || a < 0.0 => Err(EngineError::Validation(format!(
            "amount must be a finite, non-negative number, got {}",
            a
        ))),
        _ => Ok(()),
    }
}

/// Factors of every profile, first occurrence of each rule code kept
fn merge_factors(outcomes: &[ProfileOutcome]) -> Vec<RiskFactor> {
    let mut seen = HashSet::new();
    outcomes
        .iter()
        .flat_map(|o| o.factors.iter())
        .filter(|f| seen.insert(f.code.clone()))
        .cloned()
        .collect()
}
