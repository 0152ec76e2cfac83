//! Per-session single-shot timers.

use crate::services::metrics::{record_timer_event, set_pending_timers};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct TimerEntry {
    generation: u64,
    token: CancellationToken,
}

struct Inner {
    entries: DashMap<Uuid, TimerEntry>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl Inner {
    fn publish_count(&self) {
        set_pending_timers(self.entries.len());
    }
}

/// Holds at most one pending callback per session.
///
/// Each callback is a spawned task racing its delay against a cancellation
/// token. Replacing or cancelling an entry cancels the token; a callback
/// already past its delay runs to completion regardless.
#[derive(Clone)]
pub struct TimerRegistry {
    inner: Arc<Inner>,
}

impl Default for TimerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                next_generation: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Run `callback` after `delay`, replacing any timer already held for
    /// `session_id`.
    ///
    /// Returns `false` without scheduling once [`TimerRegistry::cancel_all`]
    /// has been called. Must be called from within a Tokio runtime.
    pub fn schedule<F, Fut>(&self, session_id: Uuid, delay: Duration, callback: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.inner.shutdown.is_cancelled() {
            tracing::warn!(session_id = %session_id, "Timer registry shut down, not scheduling");
            return false;
        }

        let deadline = tokio::time::Instant::now() + delay;
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.shutdown.child_token();

        // The map insert is atomic per key, so whoever loses a concurrent
        // race gets the other's entry back and cancels it.
        let replaced = self.inner.entries.insert(
            session_id,
            TimerEntry {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = replaced {
            previous.token.cancel();
            record_timer_event("replaced");
        }

        // cancel_all may have swept the map between the check above and the insert.
        if self.inner.shutdown.is_cancelled() {
            self.inner
                .entries
                .remove_if(&session_id, |_, entry| entry.generation == generation);
            token.cancel();
            self.inner.publish_count();
            return false;
        }
        record_timer_event("scheduled");
        self.inner.publish_count();

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep_until(deadline) => {}
            }

            record_timer_event("fired");
            callback().await;

            inner
                .entries
                .remove_if(&session_id, |_, entry| entry.generation == generation);
            inner.publish_count();
        });

        true
    }

    /// Cancel and drop the timer for `session_id`. Returns whether one existed.
    pub fn cancel(&self, session_id: Uuid) -> bool {
        let removed = self.inner.entries.remove(&session_id);
        if let Some((_, entry)) = &removed {
            entry.token.cancel();
            record_timer_event("cancelled");
        }
        self.inner.publish_count();
        removed.is_some()
    }

    /// Cancel every pending timer and refuse new ones.
    pub fn cancel_all(&self) -> usize {
        self.inner.shutdown.cancel();
        let mut cancelled = 0;
        self.inner.entries.retain(|_, entry| {
            entry.token.cancel();
            cancelled += 1;
            false
        });
        self.inner.publish_count();
        cancelled
    }

    /// Number of pending timers.
    pub fn count(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn contains(&self, session_id: Uuid) -> bool {
        self.inner.entries.contains_key(&session_id)
    }
}
