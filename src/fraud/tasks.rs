// src/fraud/tasks.rs
//! Detached post-decision work
//!
//! Profile updates and event publication run after the response has been
//! built. Each task gets a fresh [`Context`] with its own timeout, so the
//! caller cancelling its request does not abort them. Failures are logged.

use crate::context::Context;
use crate::Result;
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct BackgroundTasks {
    set: Mutex<JoinSet<()>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the current runtime under a context bounded by `timeout`
    pub fn spawn<F, Fut>(&self, name: &'static str, timeout: Duration, task: F)
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let ctx = Context::with_timeout(timeout);
        let fut = task(ctx.clone());

        let mut set = self.set.lock();
        while let Some(finished) = set.try_join_next() {
            if let Err(e) = finished {
                warn!(error = %e, "background task panicked");
            }
        }
        set.spawn(async move {
            match ctx.run(fut).await {
                Ok(Ok(())) => debug!(task = name, "background task done"),
                Ok(Err(e)) => warn!(task = name, error = %e, "background task failed"),
                Err(e) => warn!(task = name, error = %e, "background task abandoned"),
            }
        });
    }

    /// Tasks spawned and not yet reaped
    pub fn pending(&self) -> usize {
        self.set.lock().len()
    }

    /// Wait for every task spawned so far
    pub async fn drain(&self) {
        let mut set = std::mem::take(&mut *self.set.lock());
        while let Some(finished) = set.join_next().await {
            if let Err(e) = finished {
                warn!(error = %e, "background task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EngineError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_drain_waits_for_tasks() {
        let tasks = BackgroundTasks::new();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let done = done.clone();
            tasks.spawn("count", Duration::from_secs(1), move |_ctx| async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        tasks.drain().await;
        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(tasks.pending(), 0);
    }

    #[tokio::test]
    async fn test_failures_and_timeouts_are_contained() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("fails", Duration::from_secs(1), |_ctx| async {
            Err(EngineError::Persistence("down".to_string()))
        });
        tasks.spawn("slow", Duration::from_millis(10), |_ctx| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });
        tasks.drain().await;
        assert_eq!(tasks.pending(), 0);
    }
}
