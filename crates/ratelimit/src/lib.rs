//! Process-local keyed rate limiting.
//!
//! The store collapses duplicate work per key within an interval: the first
//! `take` for a key is allowed, further takes within the interval are
//! denied. Keys expire one interval after their last take. Protection is
//! best-effort against storms, not adversaries; nothing is persisted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    count: u32,
    expires_at: Instant,
}

/// Outcome of a [`RateLimiter::take`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Take {
    /// Whether the caller may proceed.
    pub allowed: bool,
    /// Takes left in the current window.
    pub remaining: u32,
}

/// Keyed sliding-window counter with TTL eviction.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: u32,
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl RateLimiter {
    /// A limiter allowing `limit` takes per key per interval. Event
    /// deduplication uses a limit of 1.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a take for `key` and report whether it is allowed. The key's
    /// expiry is pushed out to `interval` from now on every take, so a
    /// steady stream of duplicates stays collapsed.
    pub async fn take(&self, key: &str, interval: Duration) -> Take {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.expires_at <= now {
                    e.count = 0;
                }
            })
            .or_insert(Entry {
                count: 0,
                expires_at: now,
            });

        entry.count = entry.count.saturating_add(1);
        entry.expires_at = now + interval;

        let allowed = entry.count <= self.limit;
        let remaining = self.limit.saturating_sub(entry.count);
        if !allowed {
            debug!(key, count = entry.count, "rate limit exceeded");
        }
        Take { allowed, remaining }
    }

    /// Drop expired keys. Invoked from a periodic background task; `take`
    /// itself resets expired entries lazily, so sweeping only bounds memory.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "evicted expired rate limit entries");
        }
        removed
    }

    /// Number of live keys, for diagnostics.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Run a sweeper until the handle is dropped.
    pub fn start_sweeper(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                limiter.sweep().await;
            }
        })
    }
}
