//! Shared cancellation signal used by the loader loop, its strategies, and
//! the batch iterator.
//!
//! One flag plus one [`Notify`], the same shape as a plain cancellation
//! token: idempotent to trigger, cheap to check, and wakes anyone blocked
//! on a provider call, a subscription receive, or a batch wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug)]
struct State {
    initiated: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation handle. Obtain a clone before moving the owning
/// component into a spawned task, so the signal can still be triggered from
/// outside.
#[derive(Clone)]
pub struct Shutdown {
    state: Arc<State>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            state: Arc::new(State {
                initiated: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Idempotent: the first call wakes everyone waiting; later calls are no-ops.
    pub fn trigger(&self) {
        if !self.state.initiated.swap(true, Ordering::AcqRel) {
            self.state.notify.notify_waiters();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.state.initiated.load(Ordering::Acquire)
    }

    /// Resolves once `trigger` has been called. Callers must re-check
    /// [`Self::is_triggered`] after racing this against other futures in a
    /// `select!`, since a notification fired before the `notified()` future
    /// was created would otherwise be missed — `Notify` only guards against
    /// that race for the very next waiter, not ones registered later.
    pub async fn notified(&self) {
        if self.is_triggered() {
            return;
        }
        self.state.notify.notified().await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_before_wait_does_not_hang() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.notified().await;
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn trigger_wakes_a_concurrent_waiter() {
        let shutdown = Shutdown::new();
        let waiter = shutdown.clone();
        let handle = tokio::spawn(async move {
            waiter.notified().await;
        });
        tokio::task::yield_now().await;
        shutdown.trigger();
        handle.await.unwrap();
    }
}
