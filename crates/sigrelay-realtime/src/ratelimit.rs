//! Per-connection sliding-window rate limiting.
//!
//! Each connection gets a map of whole-second bucket → message count.
//! Buckets older than the window are purged on every check, and the
//! whole map is dropped when the connection leaves.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use sigrelay_core::config::signalling::RateLimitConfig;

use crate::connection::handle::SessionId;

/// Sliding-window admission control keyed by transport session.
#[derive(Debug)]
pub struct RateLimiter {
    window_seconds: u64,
    max_messages: u32,
    windows: DashMap<SessionId, BTreeMap<u64, u32>>,
    rejected: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter admitting `max_messages` per `window_seconds`.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window_seconds: config.window_seconds,
            max_messages: config.max_messages,
            windows: DashMap::new(),
            rejected: AtomicU64::new(0),
        }
    }

    /// Admit or reject one message at the current wall-clock second.
    pub fn admit(&self, key: SessionId) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.admit_at(key, now)
    }

    /// Admit or reject one message at `second` (seconds since the epoch).
    pub fn admit_at(&self, key: SessionId, second: u64) -> bool {
        let mut buckets = self.windows.entry(key).or_default();

        let cutoff = second.saturating_sub(self.window_seconds);
        let retained = buckets.split_off(&cutoff);
        *buckets = retained;

        let in_window: u64 = buckets.values().map(|&c| u64::from(c)).sum();
        if in_window >= u64::from(self.max_messages) {
            drop(buckets);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session_id = %key, in_window, "Rate limit exceeded");
            return false;
        }

        *buckets.entry(second).or_insert(0) += 1;
        true
    }

    /// Drops all state for a connection.
    pub fn remove_session(&self, key: SessionId) {
        self.windows.remove(&key);
    }

    /// Number of rejections since start.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Number of connections with live window state.
    pub fn tracked_sessions(&self) -> usize {
        self.windows.len()
    }
}
