//! The iterator's "there might be more work" signal: a one-shot notifier
//! with level semantics, hybridized with a safety-net poll interval the way
//! the stream receiver this is modeled on falls back to a timer tick when a
//! notification could otherwise be missed between check and await.
//!
//! Nothing in the production loader/strategy wiring calls `resolve` after an
//! enqueue — the safety-net tick is therefore the *only* forward-progress
//! guarantee in practice, not just a fallback for a lost wakeup. `wait`
//! returns on every tick unconditionally (not just when the flag happens to
//! be set), so the caller re-checks the actual queue state at least once per
//! `SAFETY_POLL_INTERVAL` regardless of whether anything ever resolves this
//! signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Safety-net poll period: the upper bound on how long the iterator can go
/// without re-checking the queue when nothing resolves this signal.
const SAFETY_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub(crate) struct BatchSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl BatchSignal {
    pub(crate) fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Edge trigger if someone is already waiting; level trigger (the flag)
    /// if not — the next `wait` observes it and returns immediately.
    pub(crate) fn resolve(&self) {
        self.flag.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub(crate) async fn wait(&self) {
        if self.flag.swap(false, Ordering::AcqRel) {
            return;
        }

        let mut poll = tokio::time::interval(SAFETY_POLL_INTERVAL);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        poll.tick().await; // first tick fires immediately; consume it

        tokio::select! {
            () = self.notify.notified() => {
                self.flag.store(false, Ordering::Release);
            }
            _ = poll.tick() => {
                // Unconditional: the caller re-polls the queue on every
                // return from `wait`, tick or not, so this is a real
                // forward-progress guarantee rather than a rare-race fallback.
                self.flag.store(false, Ordering::Release);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn resolve_before_wait_returns_immediately() {
        let signal = BatchSignal::new();
        signal.resolve();
        tokio::time::timeout(Duration::from_millis(50), signal.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn resolve_wakes_a_concurrent_waiter() {
        let signal = Arc::new(BatchSignal::new());
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        tokio::task::yield_now().await;
        signal.resolve();
        tokio::time::timeout(Duration::from_millis(500), handle).await.unwrap().unwrap();
    }
}
