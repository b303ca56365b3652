// demos/basic_usage.rs
//! Basic usage of the risk and fraud engines with in-memory collaborators

use adaptive_risk_engine::repository::memory::{
    InMemoryProfileRepository, InMemoryRuleRepository, InMemoryUserProfileRepository,
    StaticGeoIp,
};
use adaptive_risk_engine::rules::CompareOp;
use adaptive_risk_engine::types::{DeviceInfo, GeoInfo};
use adaptive_risk_engine::{
    Condition, Context, FraudDetectionRequest, FraudEngine, FraudEngineConfig, MemoryCache,
    RiskAssessmentRequest, RiskEngine, RiskEngineConfig, RiskEvaluationProfile, RiskLevel,
    RiskRule, RuleTable, Severity, WILDCARD,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== Adaptive Risk Engine - Basic Usage ===\n");
    let ctx = Context::background();

    // Rules shared by every tenant
    let rules = InMemoryRuleRepository::new();
    rules.add_default(
        RiskRule::new("anonymizer", "network", Condition::AnonymizerDetected)
            .with_description("Request came through a VPN, proxy or Tor")
            .with_severity(Severity::High)
            .with_confidence(90.0),
    );
    rules.add_default(
        RiskRule::new("large_transfer", "amount", Condition::AmountAbove(10_000.0))
            .with_description("Transfer above 10k")
            .with_severity(Severity::Critical)
            .with_confidence(95.0),
    );
    rules.add_default(
        RiskRule::new(
            "api_channel",
            "channel",
            Condition::compare("channel", CompareOp::Eq, "api"),
        )
        .with_severity(Severity::Medium),
    );

    let profiles = InMemoryProfileRepository::new();
    profiles.set_default(
        RiskEvaluationProfile::new("default", WILDCARD)
            .with_rules(["anonymizer", "large_transfer", "api_channel"]),
    );

    let table = RuleTable::load(&ctx, Arc::new(rules), Arc::new(profiles))
        .await
        .expect("Failed to load rules");
    let table = Arc::new(table);
    println!("✓ Rules loaded\n");

    let vpn_exit = GeoInfo {
        is_vpn: true,
        ..GeoInfo::country("NL")
    };
    let geo_ip = Arc::new(
        StaticGeoIp::new()
            .with_entry("203.0.113.7", vpn_exit)
            .with_entry("198.51.100.1", GeoInfo::country("US")),
    );

    // Example 1: access risk for a login
    println!("Example 1: Login Risk Assessment");
    let risk = RiskEngine::new(RiskEngineConfig::default(), table.clone())
        .with_cache(Arc::new(MemoryCache::new()))
        .with_geo_ip(geo_ip.clone());

    let login = RiskAssessmentRequest::new("alice", "acme", "LOGIN").with_ip("198.51.100.1");
    let assessment = risk.evaluate_risk(&ctx, login).await.expect("assessment failed");
    println!("Risk level: {}", assessment.risk_level);
    println!("Score: {:.1} (confidence {:.1})", assessment.risk_score, assessment.confidence_score);
    println!("Actions: {:?}", assessment.recommended_actions);
    println!();

    // Example 2: a large transfer through a VPN
    println!("Example 2: Large Transfer Through a VPN");
    let transfer = RiskAssessmentRequest::new("alice", "acme", "TRANSFER")
        .with_ip("203.0.113.7")
        .with_amount(25_000.0);
    let assessment = risk.evaluate_risk(&ctx, transfer).await.expect("assessment failed");
    println!("Risk level: {}", assessment.risk_level);
    for factor in &assessment.risk_factors {
        println!("  - [{:?}] {}: {}", factor.severity, factor.code, factor.description);
    }
    println!("Allowed: {}", assessment.allow_operation);
    if assessment.risk_level >= RiskLevel::High {
        println!("Additional auth required: {}", assessment.require_additional_auth);
    }
    println!();

    // Example 3: fraud detection on a payment
    println!("Example 3: Payment Fraud Detection");
    let fraud = FraudEngine::builder(
        FraudEngineConfig::default(),
        table,
        Arc::new(InMemoryUserProfileRepository::new()),
    )
    .with_geo_ip(geo_ip)
    .build();

    let payment = FraudDetectionRequest::new("bob", "acme", "PAYMENT")
        .with_amount(120.0, "EUR")
        .with_ip("203.0.113.7")
        .with_device(DeviceInfo::with_id("phone-1"));
    let response = fraud.detect_fraud(&ctx, payment).await.expect("detection failed");
    println!("Verdict: {:?}", response.fraud_verdict);
    println!("Score: {:.1} (confidence {:.1})", response.fraud_score, response.fraud_confidence);
    println!("Action: {:?}", response.recommended_action);
    for factor in &response.risk_factors {
        println!("  - {}", factor.code);
    }

    fraud.drain_background().await;
    println!("\n✓ Done ({} ms)", response.processing_time_ms);
}
