// src/rules/table.rs
//! In-memory copy of rules and profiles
//!
//! Readers take a cheap `Arc` clone of the current state under a read lock and
//! evaluate against it without holding the lock. Writers build the next state
//! off to the side and swap it in under the write lock, so a reader never sees
//! a half-updated table and the write lock is held only for the swap.

use crate::context::Context;
use crate::repository::{ProfileRepository, RuleRepository};
use crate::types::{RiskEvaluationProfile, RiskRule};
use crate::{EngineError, Result};
use ahash::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Rules and profiles visible to one tenant
#[derive(Debug, Clone, Default)]
pub struct TenantPolicy {
    /// Default rules overlaid with tenant rules, by id
    pub rules: HashMap<String, Arc<RiskRule>>,
    /// Tenant and wildcard profiles, in repository order
    pub profiles: Vec<Arc<RiskEvaluationProfile>>,
}

impl TenantPolicy {
    pub fn rule(&self, id: &str) -> Option<&Arc<RiskRule>> {
        self.rules.get(id)
    }

    /// Rules of one category, ordered by id so evaluation order is stable
    pub fn rules_in_category(&self, category: &str) -> Vec<&Arc<RiskRule>> {
        let mut rules: Vec<_> = self
            .rules
            .values()
            .filter(|r| r.category == category)
            .collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    pub fn profile(&self, id: &str) -> Option<&Arc<RiskEvaluationProfile>> {
        self.profiles.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, Default)]
struct TableState {
    default_rules: Vec<Arc<RiskRule>>,
    default_profile: Option<Arc<RiskEvaluationProfile>>,
    tenants: HashMap<String, Arc<TenantPolicy>>,
}

/// Serialized form of the table, for warm starts without hitting the stores
#[derive(Debug, Serialize, Deserialize)]
struct TableSnapshot {
    default_rules: Vec<RiskRule>,
    default_profile: Option<RiskEvaluationProfile>,
    tenants: Vec<(String, Vec<RiskRule>, Vec<RiskEvaluationProfile>)>,
}

/// Shared rule/profile table, loaded lazily per tenant
pub struct RuleTable {
    state: RwLock<Arc<TableState>>,
    rule_repository: Arc<dyn RuleRepository>,
    profile_repository: Arc<dyn ProfileRepository>,
}

impl RuleTable {
    /// Load the defaults and return a table with no tenants cached yet
    pub async fn load(
        ctx: &Context,
        rule_repository: Arc<dyn RuleRepository>,
        profile_repository: Arc<dyn ProfileRepository>,
    ) -> Result<Self> {
        let table = Self {
            state: RwLock::new(Arc::new(TableState::default())),
            rule_repository,
            profile_repository,
        };
        let (default_rules, default_profile) = table.fetch_defaults(ctx).await?;
        table.swap(|state| {
            state.default_rules = default_rules;
            state.default_profile = default_profile;
        });
        Ok(table)
    }

    /// Profile used when nothing else applies
    pub fn default_profile(&self) -> Option<Arc<RiskEvaluationProfile>> {
        self.current().default_profile.clone()
    }

    /// Policy for `tenant_id`, fetched from the stores on first use
    pub async fn policy(&self, ctx: &Context, tenant_id: &str) -> Result<Arc<TenantPolicy>> {
        let current = self.current();
        if let Some(policy) = current.tenants.get(tenant_id) {
            return Ok(Arc::clone(policy));
        }

        let policy = Arc::new(self.fetch_tenant(ctx, tenant_id, &current.default_rules).await?);
        self.swap(|state| {
            state.tenants.insert(tenant_id.to_string(), Arc::clone(&policy));
        });
        Ok(policy)
    }

    /// Re-fetch the defaults and every tenant loaded so far, then swap them in
    pub async fn reload(&self, ctx: &Context) -> Result<()> {
        let tenant_ids: Vec<String> = self.current().tenants.keys().cloned().collect();
        let (default_rules, default_profile) = self.fetch_defaults(ctx).await?;

        let mut tenants = HashMap::default();
        for tenant_id in &tenant_ids {
            let policy = self.fetch_tenant(ctx, tenant_id, &default_rules).await?;
            tenants.insert(tenant_id.clone(), Arc::new(policy));
        }

        self.swap(|state| {
            state.default_rules = default_rules;
            state.default_profile = default_profile;
            state.tenants = tenants;
        });
        info!(tenants = tenant_ids.len(), "rule table reloaded");
        Ok(())
    }

    /// Serialize the current table with bincode
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let current = self.current();
        let snapshot = TableSnapshot {
            default_rules: current.default_rules.iter().map(|r| (**r).clone()).collect(),
            default_profile: current.default_profile.as_deref().cloned(),
            tenants: current
                .tenants
                .iter()
                .map(|(id, policy)| {
                    (
                        id.clone(),
                        policy.rules.values().map(|r| (**r).clone()).collect(),
                        policy.profiles.iter().map(|p| (**p).clone()).collect(),
                    )
                })
                .collect(),
        };
        bincode::serialize(&snapshot).map_err(|e| EngineError::Serialization(e.to_string()))
    }

    /// Replace the table with a previously taken snapshot
    pub fn restore_snapshot(&self, data: &[u8]) -> Result<()> {
        let snapshot: TableSnapshot =
            bincode::deserialize(data).map_err(|e| EngineError::Serialization(e.to_string()))?;

        let mut tenants = HashMap::default();
        for (tenant_id, rules, profiles) in snapshot.tenants {
            let policy = TenantPolicy {
                rules: rules
                    .into_iter()
                    .map(|r| (r.id.clone(), Arc::new(r)))
                    .collect(),
                profiles: profiles.into_iter().map(Arc::new).collect(),
            };
            tenants.insert(tenant_id, Arc::new(policy));
        }

        self.swap(|state| {
            state.default_rules = snapshot.default_rules.into_iter().map(Arc::new).collect();
            state.default_profile = snapshot.default_profile.map(Arc::new);
            state.tenants = tenants;
        });
        Ok(())
    }

    /// Number of tenants currently cached
    pub fn tenant_count(&self) -> usize {
        self.current().tenants.len()
    }

    fn current(&self) -> Arc<TableState> {
        self.state.read().clone()
    }

    fn swap(&self, update: impl FnOnce(&mut TableState)) {
        let mut guard = self.state.write();
        let mut next = (**guard).clone();
        update(&mut next);
        *guard = Arc::new(next);
    }

    async fn fetch_defaults(
        &self,
        ctx: &Context,
    ) -> Result<(Vec<Arc<RiskRule>>, Option<Arc<RiskEvaluationProfile>>)> {
        let rules = ctx.run(self.rule_repository.find_default_rules()).await??;
        let profile = ctx
            .run(self.profile_repository.find_default_profile())
            .await??;

        if let Some(profile) = &profile {
            profile.validate_thresholds()?;
        }

        Ok((
            rules.into_iter().map(Arc::new).collect(),
            profile.map(Arc::new),
        ))
    }

    async fn fetch_tenant(
        &self,
        ctx: &Context,
        tenant_id: &str,
        default_rules: &[Arc<RiskRule>],
    ) -> Result<TenantPolicy> {
        let rules = ctx
            .run(self.rule_repository.find_rules(tenant_id, None))
            .await??;
        let profiles = ctx
            .run(self.profile_repository.find_profiles(tenant_id, None))
            .await??;

        let mut policy = TenantPolicy::default();
        for rule in default_rules {
            policy.rules.insert(rule.id.clone(), Arc::clone(rule));
        }
        for rule in rules {
            policy.rules.insert(rule.id.clone(), Arc::new(rule));
        }
        for profile in profiles {
            match profile.validate_thresholds() {
                Ok(()) => policy.profiles.push(Arc::new(profile)),
                Err(e) => {
                    warn!(
                        tenant_id,
                        profile_id = %profile.id,
                        error = %e,
                        "skipping invalid profile"
                    )
                }
            }
        }
        Ok(policy)
    }
}
