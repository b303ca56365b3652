// demos/async_integration.rs
//! Plugging async services into the fraud engine: a remote ML scorer, an event
//! bus, batch detection under a deadline and a hot rule reload.

use adaptive_risk_engine::fraud::FRAUD_CATEGORY;
use adaptive_risk_engine::repository::memory::{
    InMemoryProfileRepository, InMemoryRuleRepository, InMemoryUserProfileRepository,
};
use adaptive_risk_engine::repository::{EventBus, MlProcessor};
use adaptive_risk_engine::types::AnomalySource;
use adaptive_risk_engine::{
    Anomaly, Condition, Context, FraudDetectionRequest, FraudEngine, FraudEngineConfig,
    FraudEvent, MemoryCache, RiskEvaluationProfile, RiskRule, RuleTable, Severity,
    UserRiskProfile, WILDCARD,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

// Simulated remote model
struct RemoteScorer;

#[async_trait]
impl MlProcessor for RemoteScorer {
    async fn score(
        &self,
        request: &FraudDetectionRequest,
        _profile: &UserRiskProfile,
    ) -> adaptive_risk_engine::Result<Vec<Anomaly>> {
        tokio::time::sleep(Duration::from_millis(5)).await;

        let amount = request.amount.unwrap_or_default();
        if amount > 4_000.0 {
            Ok(vec![Anomaly::new(
                "MODEL_OUTLIER",
                AnomalySource::Ml,
                Severity::High,
                80.0,
                format!("amount {:.0} is an outlier for this segment", amount),
            )
            .with_score(85.0)])
        } else {
            Ok(Vec::new())
        }
    }
}

// Simulated message bus
struct StdoutEventBus;

#[async_trait]
impl EventBus for StdoutEventBus {
    async fn publish_event(&self, event: FraudEvent) -> adaptive_risk_engine::Result<()> {
        tokio::time::sleep(Duration::from_micros(50)).await;
        println!(
            "  [EVENT] {} user={} verdict={:?}",
            event.event_type, event.user_id, event.fraud_verdict
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Adaptive Risk Engine - Async Integration Example ===\n");
    let ctx = Context::background();

    let rules = Arc::new(InMemoryRuleRepository::new());
    let profiles = InMemoryProfileRepository::new();
    profiles.set_default(RiskEvaluationProfile::new("default", WILDCARD));

    let table = RuleTable::load(&ctx, rules.clone(), Arc::new(profiles))
        .await
        .expect("Failed to load rules");
    let table = Arc::new(table);

    let engine = FraudEngine::builder(
        FraudEngineConfig::default(),
        table.clone(),
        Arc::new(InMemoryUserProfileRepository::new()),
    )
    .with_cache(Arc::new(MemoryCache::new()))
    .with_ml_processor(Arc::new(RemoteScorer))
    .with_event_bus(Arc::new(StdoutEventBus))
    .build();

    println!("Simulating concurrent transaction processing...\n");

    let requests = vec![
        FraudDetectionRequest::new("user_001", "acme", "PAYMENT").with_amount(300.0, "USD"),
        FraudDetectionRequest::new("user_002", "acme", "PAYMENT").with_amount(5000.0, "USD"),
        FraudDetectionRequest::new("", "acme", "PAYMENT").with_amount(450.0, "USD"),
    ];

    let deadline = Context::with_timeout(Duration::from_secs(2));
    let batch = engine.batch_detect_fraud(&deadline, requests).await;
    for (i, response) in batch.responses.iter().enumerate() {
        match response {
            Some(r) => println!(
                "  #{} {} -> {:?} (score {:.1})",
                i, r.user_id, r.fraud_verdict, r.fraud_score
            ),
            None => println!("  #{} failed: {:?}", i, batch.errors[i]),
        }
    }
    if let Some(err) = batch.aggregate_error() {
        println!("  {}", err);
    }

    engine.drain_background().await;

    println!("\n{}", "-".repeat(50));
    println!("=== Demonstrating Hot Reload ===\n");

    rules.add(
        RiskRule::new("big_ticket", FRAUD_CATEGORY, Condition::AmountAbove(1_000.0))
            .with_tenant("acme")
            .with_severity(Severity::Critical)
            .with_confidence(95.0),
    );
    table.reload(&ctx).await.expect("reload failed");

    let request = FraudDetectionRequest::new("user_004", "acme", "PAYMENT")
        .with_amount(4_500.0, "USD");
    let response = engine.detect_fraud(&ctx, request).await.expect("detection failed");
    println!("  user_004 -> {:?} via {:?}", response.fraud_verdict, response.recommended_action);
    for factor in &response.risk_factors {
        println!("    factor {}", factor.code);
    }
    for anomaly in &response.anomalies {
        println!("    anomaly {} ({})", anomaly.code, anomaly.source);
    }

    engine.drain_background().await;
    println!("\n=== Hot reload successful ===");
}
