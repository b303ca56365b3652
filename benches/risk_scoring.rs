// benches/risk_scoring.rs
//! Performance benchmarks for rule evaluation, consolidation and fraud detection
//!
//! Run with: cargo bench

use adaptive_risk_engine::fraud::{consolidate, ConsolidationSettings, FRAUD_CATEGORY};
use adaptive_risk_engine::repository::memory::{
    InMemoryProfileRepository, InMemoryRuleRepository, InMemoryUserProfileRepository,
};
use adaptive_risk_engine::rules::{CompareOp, RuleEvaluator, RuleSubject};
use adaptive_risk_engine::types::{AnomalySource, GeoInfo};
use adaptive_risk_engine::{
    Anomaly, Condition, Context, FraudDetectionRequest, FraudEngine, FraudEngineConfig,
    RiskEvaluationProfile, RiskRule, RuleTable, Severity, Value, WILDCARD,
};
use ahash::HashMap;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

fn amount_rules(count: usize) -> Vec<RiskRule> {
    (0..count)
        .map(|i| {
            RiskRule::new(
                format!("rule_{}", i),
                FRAUD_CATEGORY,
                Condition::compare("amount", CompareOp::Gt, (i * 50) as f64),
            )
            .with_severity(Severity::Medium)
        })
        .collect()
}

fn benchmark_rule_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_evaluation");
    let evaluator = RuleEvaluator::default();
    let geo = GeoInfo::country("US");
    let mut attributes = HashMap::default();
    attributes.insert("channel".to_string(), Value::from("web"));

    for count in [10, 100, 500] {
        let rules = amount_rules(count);
        let subject = RuleSubject {
            tenant_id: "acme",
            operation_type: "PAYMENT",
            amount: Some(5000.0),
            geo: Some(&geo),
            device: None,
            attributes: &attributes,
            baseline: None,
        };

        group.bench_with_input(BenchmarkId::from_parameter(count), &rules, |b, rules| {
            b.iter(|| evaluator.evaluate(rules.iter(), black_box(&subject), |rule| rule.weight))
        });
    }

    group.finish();
}

fn benchmark_consolidation(c: &mut Criterion) {
    let evaluator = RuleEvaluator::default();
    let rules = amount_rules(50);
    let attributes = HashMap::default();
    let subject = RuleSubject {
        tenant_id: "acme",
        operation_type: "PAYMENT",
        amount: Some(5000.0),
        geo: None,
        device: None,
        attributes: &attributes,
        baseline: None,
    };
    let factors = evaluator.evaluate(rules.iter(), &subject, |rule| rule.weight).factors;
    let anomalies: Vec<Anomaly> = (0..10)
        .map(|i| Anomaly::new(format!("A{}", i), AnomalySource::Ml, Severity::High, 80.0, ""))
        .collect();
    let settings = ConsolidationSettings::default();

    c.bench_function("consolidate_60_items", |b| {
        b.iter(|| consolidate(black_box(&factors), black_box(&anomalies), &settings))
    });
}

fn benchmark_detect_fraud(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let ctx = Context::background();

    let rules = InMemoryRuleRepository::new();
    for rule in amount_rules(100) {
        rules.add_default(rule);
    }
    let profiles = InMemoryProfileRepository::new();
    profiles.set_default(RiskEvaluationProfile::new("default", WILDCARD));

    let table = runtime
        .block_on(RuleTable::load(&ctx, Arc::new(rules), Arc::new(profiles)))
        .expect("load rule table");
    let config = FraudEngineConfig {
        velocity_min_interval_secs: 0,
        velocity_max_events: 1_000_000,
        ..FraudEngineConfig::default()
    };
    let engine = FraudEngine::builder(
        config,
        Arc::new(table),
        Arc::new(InMemoryUserProfileRepository::new()),
    )
    .build();

    c.bench_function("detect_fraud_100_rules", |b| {
        b.to_async(&runtime).iter(|| {
            let request = FraudDetectionRequest::new("bench-user", "acme", "PAYMENT")
                .with_amount(2500.0, "USD")
                .with_network(GeoInfo::country("US"));
            let engine = engine.clone();
            let ctx = ctx.clone();
            async move { engine.detect_fraud(&ctx, black_box(request)).await }
        })
    });
}

criterion_group!(
    benches,
    benchmark_rule_evaluation,
    benchmark_consolidation,
    benchmark_detect_fraud,
);
criterion_main!(benches);
