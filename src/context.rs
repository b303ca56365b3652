// src/context.rs
//! Cancellation and deadline propagation for engine calls
//!
//! Every suspension point in the decision path (enrichment, collectors, store
//! and cache I/O) runs through [`Context::run`], so a cancelled or expired call
//! stops waiting on its collaborators and returns a [`ContextError`].

use crate::ContextError;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Clonable handle carrying a deadline and a cancellation signal
#[derive(Clone, Debug)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Arc<CancelState>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Weak<CancelState>>>,
}

impl CancelState {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }

    fn child(&self) -> Arc<CancelState> {
        let child = Arc::new(CancelState::default());
        let mut children = self.children.lock();
        if self.is_cancelled() {
            child.cancelled.store(true, Ordering::Release);
        } else {
            children.retain(|w| w.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        child
    }

    async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Context {
    /// Context with no deadline that is never cancelled unless asked to
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancel: Arc::new(CancelState::default()),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: Arc::new(CancelState::default()),
        }
    }

    /// Derived context: cancelled with its parent, expiring no later than it
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < own => parent,
            _ => own,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.child(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every child derived from it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Why the context is done, or `None` while it is still live
    pub fn err(&self) -> Option<ContextError> {
        if self.cancel.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Drive `fut` until it completes, the context is cancelled or the deadline passes
    pub async fn run<F, T>(&self, fut: F) -> Result<T, ContextError>
    where
        F: Future<Output = T>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ContextError::Cancelled),
            _ = deadline => Err(ContextError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_completes() {
        let ctx = Context::background();
        let out = ctx.run(async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn test_deadline_aborts_slow_future() {
        let ctx = Context::with_timeout(Duration::from_millis(20));
        let out = ctx
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(out, Err(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancel_wakes_pending_run() {
        let ctx = Context::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let out = ctx.run(std::future::pending::<()>()).await;
        assert_eq!(out, Err(ContextError::Cancelled));
    }

    #[tokio::test]
    async fn test_child_follows_parent_cancellation() {
        let parent = Context::background();
        let child = parent.child_with_timeout(Duration::from_secs(60));
        parent.cancel();
        assert_eq!(child.err(), Some(ContextError::Cancelled));
        let out = child.run(std::future::pending::<()>()).await;
        assert_eq!(out, Err(ContextError::Cancelled));
    }

    #[tokio::test]
    async fn test_child_deadline_capped_by_parent() {
        let parent = Context::with_timeout(Duration::from_millis(10));
        let child = parent.child_with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }
}
