//! Stale connection sweeper.
//!
//! Periodically evicts connections that have sent nothing for longer than
//! the configured timeout. Eviction is silent: counterparts are not sent
//! `playerDisconnected` or `streamerDisconnected`, and any subscription
//! left pointing at an evicted peer is treated as absent on next use.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

use sigrelay_core::config::signalling::SignallingConfig;

use crate::connection::registry::SessionRegistry;
use crate::metrics::SignallingMetrics;
use crate::ratelimit::RateLimiter;

const STALE_CLOSE_REASON: &str = "Connection timed out";

/// Result of one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Connections inspected
    pub scanned: usize,
    /// Ids of evicted connections
    pub evicted: Vec<String>,
}

/// Removes idle connections from the registry on a fixed interval.
#[derive(Debug)]
pub struct StaleConnectionSweeper {
    registry: Arc<SessionRegistry>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<SignallingMetrics>,
    stale_timeout: Duration,
    interval: Duration,
}

impl StaleConnectionSweeper {
    /// Create a new sweeper
    pub fn new(
        registry: Arc<SessionRegistry>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<SignallingMetrics>,
        config: &SignallingConfig,
    ) -> Self {
        Self {
            registry,
            limiter,
            metrics,
            stale_timeout: Duration::from_millis(config.stale_timeout_ms),
            interval: Duration::from_millis(config.cleanup_interval_ms),
        }
    }

    /// Evict every connection idle for longer than the timeout at `now`.
    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let connections = self.registry.all_connections();
        let mut report = SweepReport {
            scanned: connections.len(),
            evicted: Vec::new(),
        };

        for conn in connections {
            if !conn.is_stale(now, self.stale_timeout) {
                continue;
            }
            // Already closing through another path, which owns the cleanup.
            if !conn.mark_closed() {
                continue;
            }
            let id = conn.id();
            self.registry.unregister_handle(&conn);
            self.limiter.remove_session(conn.session_id);
            conn.close(STALE_CLOSE_REASON);

            tracing::info!(
                peer_id = %id,
                role = %conn.role,
                idle_ms = now.saturating_duration_since(conn.last_activity()).as_millis() as u64,
                "Evicted stale connection"
            );
            report.evicted.push(id);
        }

        if !report.evicted.is_empty() {
            self.metrics.stale_evicted(report.evicted.len() as u64);
        }
        report
    }

    /// Run one pass at the current time.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    /// Runs until the cancel signal is received.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            stale_timeout_ms = self.stale_timeout.as_millis() as u64,
            "Stale connection sweeper started"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let report = self.sweep();
                    tracing::debug!(
                        scanned = report.scanned,
                        evicted = report.evicted.len(),
                        "Sweep complete"
                    );
                }
            }
        }

        tracing::info!("Stale connection sweeper stopped");
    }
}
