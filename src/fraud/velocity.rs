// src/fraud/velocity.rs
//! Sliding-window velocity check
//!
//! Keeps recent event timestamps per (tenant, user) and flags bursts. State is
//! process-local; every request is recorded as it is checked.

use crate::types::{Anomaly, AnomalySource, Severity};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

pub const VELOCITY_EXCEEDED: &str = "VELOCITY_EXCEEDED";
pub const RAPID_SUCCESSION: &str = "RAPID_SUCCESSION";

/// Checks between two sweeps of users gone quiet
pub const DEFAULT_PURGE_INTERVAL: u64 = 1024;

#[derive(Debug)]
pub struct VelocityChecker {
    window: Duration,
    max_events: usize,
    /// Zero disables the rapid succession check
    min_interval: Duration,
    events: DashMap<(String, String), VecDeque<DateTime<Utc>>>,
    checks: AtomicU64,
    purge_interval: u64,
}

impl VelocityChecker {
    pub fn new(
        window: std::time::Duration,
        max_events: usize,
        min_interval: std::time::Duration,
    ) -> Self {
        Self {
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::days(365)),
            max_events: max_events.max(1),
            min_interval: Duration::from_std(min_interval).unwrap_or_else(|_| Duration::zero()),
            events: DashMap::new(),
            checks: AtomicU64::new(0),
            purge_interval: DEFAULT_PURGE_INTERVAL,
        }
    }

    /// Sweep stale users every `interval` checks (at least 1)
    pub fn with_purge_interval(mut self, interval: u64) -> Self {
        self.purge_interval = interval.max(1);
        self
    }

    /// Record an event at `at` and report any velocity anomalies it causes
    pub fn check(&self, tenant_id: &str, user_id: &str, at: DateTime<Utc>) -> Vec<Anomaly> {
        let key = (tenant_id.to_string(), user_id.to_string());
        let mut entry = self.events.entry(key).or_default();
        let history = entry.value_mut();

        let pos = history.partition_point(|t| *t <= at);
        let previous = pos.checked_sub(1).and_then(|i| history.get(i).copied());
        history.insert(pos, at);

        if let Some(newest) = history.back().copied() {
            let horizon = newest - self.window;
            while history.front().map_or(false, |t| *t < horizon) {
                history.pop_front();
            }
        }
        // Bound per-user memory.
        let cap = self.max_events.saturating_mul(4);
        while history.len() > cap {
            history.pop_front();
        }

        let in_window = history.iter().filter(|t| **t >= at - self.window && **t <= at).count();
        drop(entry);

        let checks = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if checks % self.purge_interval == 0 {
            let purged = self.purge_stale(Utc::now().max(at));
            if purged > 0 {
                debug!(purged, tracked = self.events.len(), "purged idle velocity entries");
            }
        }

        let mut anomalies = Vec::new();
        if in_window > self.max_events {
            let ratio = in_window as f64 / self.max_events as f64;
            let severity = if ratio > 3.0 {
                Severity::Critical
            } else if ratio > 2.0 {
                Severity::High
            } else {
                Severity::Medium
            };
            let confidence = (60.0 + 10.0 * (in_window - self.max_events) as f64).min(95.0);
            anomalies.push(
                Anomaly::new(
                    VELOCITY_EXCEEDED,
                    AnomalySource::Velocity,
                    severity,
                    confidence,
                    format!(
                        "{} events in {} minutes, limit {}",
                        in_window,
                        self.window.num_minutes(),
                        self.max_events
                    ),
                )
                .with_score((60.0 + 40.0 * (ratio - 1.0)).min(100.0)),
            );
        }

        if self.min_interval > Duration::zero() {
            if let Some(previous) = previous {
                let gap = at - previous;
                if gap < self.min_interval {
                    anomalies.push(
                        Anomaly::new(
                            RAPID_SUCCESSION,
                            AnomalySource::Velocity,
                            Severity::Low,
                            60.0,
                            format!("{} ms after the previous event", gap.num_milliseconds()),
                        )
                        .with_score(40.0),
                    );
                }
            }
        }

        anomalies
    }

    /// Drop users with no event after `now - window`; returns how many were dropped
    pub fn purge_stale(&self, now: DateTime<Utc>) -> usize {
        let horizon = now - self.window;
        let before = self.events.len();
        self.events
            .retain(|_, history| history.back().map_or(false, |t| *t >= horizon));
        before - self.events.len()
    }

    /// Number of (tenant, user) pairs tracked
    pub fn tracked(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration as StdDuration;

    fn checker(max_events: usize, min_interval_secs: u64) -> VelocityChecker {
        VelocityChecker::new(
            StdDuration::from_secs(3600),
            max_events,
            StdDuration::from_secs(min_interval_secs),
        )
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_under_limit_is_quiet() {
        let velocity = checker(3, 2);
        for i in 0..3 {
            let at = t0() + Duration::seconds(60 * i);
            assert!(velocity.check("acme", "u1", at).is_empty());
        }
    }

    #[test]
    fn test_limit_exceeded() {
        let velocity = checker(3, 0);
        for i in 0..3 {
            velocity.check("acme", "u1", t0() + Duration::seconds(60 * i));
        }
        let anomalies = velocity.check("acme", "u1", t0() + Duration::seconds(240));
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].code, VELOCITY_EXCEEDED);
        assert_eq!(anomalies[0].severity, Severity::Medium);
    }

    #[test]
    fn test_window_slides() {
        let velocity = checker(2, 0);
        velocity.check("acme", "u1", t0());
        velocity.check("acme", "u1", t0() + Duration::seconds(10));
        let later = t0() + Duration::hours(2);
        assert!(velocity.check("acme", "u1", later).is_empty());
    }

    #[test]
    fn test_rapid_succession() {
        let velocity = checker(10, 2);
        velocity.check("acme", "u1", t0());
        let anomalies = velocity.check("acme", "u1", t0() + Duration::milliseconds(500));
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].code, RAPID_SUCCESSION);
    }

    #[test]
    fn test_users_and_tenants_are_separate() {
        let velocity = checker(1, 2);
        velocity.check("acme", "u1", t0());
        assert!(velocity.check("acme", "u2", t0()).is_empty());
        assert!(velocity.check("globex", "u1", t0()).is_empty());
        assert_eq!(velocity.tracked(), 3);
    }

    #[test]
    fn test_purge_stale() {
        let velocity = checker(5, 0);
        velocity.check("acme", "old", t0());
        velocity.check("acme", "fresh", t0() + Duration::hours(3));
        assert_eq!(velocity.purge_stale(t0() + Duration::hours(3)), 1);
        assert_eq!(velocity.tracked(), 1);
    }

    #[test]
    fn test_idle_users_swept_while_checking() {
        let checker = VelocityChecker::new(StdDuration::from_secs(60), 10, StdDuration::ZERO)
            .with_purge_interval(10);
        let long_ago = Utc::now() - Duration::days(2);

        for i in 0..25 {
            checker.check("acme", &format!("user-{}", i), long_ago);
        }
        // Swept after the 10th and 20th check.
        assert_eq!(checker.tracked(), 5);
    }
}
