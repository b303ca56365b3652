// src/lib.rs
//! # Adaptive Risk Engine
//!
//! Two cooperating decision engines for multi-tenant platforms:
//!
//! - [`RiskEngine`] scores access requests (logins, transfers, ...) against
//!   configurable evaluation profiles and returns a risk level with a fixed
//!   set of recommended actions.
//! - [`FraudEngine`] scores operations for fraud from rules, behavior analysis,
//!   an optional ML scorer and a velocity check, and returns a verdict with a
//!   single recommended action.
//!
//! Both read rules and profiles through a shared [`RuleTable`] and talk to
//! stores, caches and enrichment services through the traits in
//! [`repository`]. Every call takes a [`Context`] carrying a deadline and a
//! cancellation signal.
//!
//! ## Example
//!
//! ```rust
//! use adaptive_risk_engine::repository::memory::{
//!     InMemoryProfileRepository, InMemoryRuleRepository, InMemoryUserProfileRepository,
//! };
//! use adaptive_risk_engine::{
//!     Context, FraudDetectionRequest, FraudEngine, FraudEngineConfig, FraudVerdict,
//!     RiskEvaluationProfile, RuleTable, WILDCARD,
//! };
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let ctx = Context::background();
//! let profiles = InMemoryProfileRepository::new();
//! profiles.set_default(RiskEvaluationProfile::new("default", WILDCARD));
//!
//! let table = RuleTable::load(&ctx, Arc::new(InMemoryRuleRepository::new()), Arc::new(profiles))
//!     .await
//!     .unwrap();
//! let engine = FraudEngine::builder(
//!     FraudEngineConfig::default(),
//!     Arc::new(table),
//!     Arc::new(InMemoryUserProfileRepository::new()),
//! )
//! .build();
//!
//! let request = FraudDetectionRequest::new("user-1", "acme", "LOGIN");
//! let response = engine.detect_fraud(&ctx, request).await.unwrap();
//! assert_eq!(response.fraud_verdict, FraudVerdict::Approved);
//! # });
//! ```

pub mod actions;
pub mod cache;
pub mod config;
pub mod context;
pub mod events;
pub mod fraud;
pub mod repository;
pub mod risk;
pub mod rules;
pub mod types;

use thiserror::Error;

pub use actions::{ActionPolicy, FraudVerdict, RecommendedAction};
pub use cache::MemoryCache;
pub use config::{AggregationPolicy, EngineConfig, FraudEngineConfig, RiskEngineConfig};
pub use context::Context;
pub use events::FraudEvent;
pub use fraud::{BatchDetection, FraudEngine, FraudEngineBuilder};
pub use risk::RiskEngine;
pub use rules::{Condition, RuleTable};
pub use types::{
    Anomaly, FraudDetectionRequest, FraudDetectionResponse, RiskAssessmentRequest,
    RiskAssessmentResponse, RiskEvaluationProfile, RiskFactor, RiskLevel, RiskRule, Severity,
    UserRiskProfile, Value, WILDCARD,
};

/// Why a [`Context`] stopped a call
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Errors returned by the engines and their collaborators
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Collector {collector} failed: {message}")]
    Collector { collector: String, message: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("{failed} of {total} batch requests failed")]
    Batch { failed: usize, total: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// True when the call was cancelled or ran out of time
    pub fn is_context(&self) -> bool {
        matches!(self, EngineError::Context(_))
    }

    /// True for failures of a collaborator that may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Persistence(_)
                | EngineError::Cache(_)
                | EngineError::Collector { .. }
                | EngineError::Context(ContextError::DeadlineExceeded)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_errors_convert() {
        let err: EngineError = ContextError::DeadlineExceeded.into();
        assert!(err.is_context());
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Context error: deadline exceeded");

        let cancelled: EngineError = ContextError::Cancelled.into();
        assert!(!cancelled.is_retryable());
    }

    #[test]
    fn test_validation_is_final() {
        let err = EngineError::Validation("user_id is required".to_string());
        assert!(!err.is_context());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_batch_message() {
        let err = EngineError::Batch { failed: 2, total: 10 };
        assert_eq!(err.to_string(), "2 of 10 batch requests failed");
    }
}
