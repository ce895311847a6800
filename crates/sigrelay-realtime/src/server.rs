//! Top-level signalling engine that ties together all subsystems.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use sigrelay_core::config::signalling::SignallingConfig;

use crate::connection::manager::ConnectionManager;
use crate::connection::registry::{RegistryCounts, SessionRegistry};
use crate::metrics::{MetricsSnapshot, SignallingMetrics};
use crate::ratelimit::RateLimiter;
use crate::routing::engine::RoutingEngine;
use crate::sweeper::StaleConnectionSweeper;

/// Central signalling engine. Cheap to clone; every subsystem is shared.
#[derive(Clone)]
pub struct SignallingEngine {
    /// Connection lifecycle.
    pub connections: Arc<ConnectionManager>,
    /// Session registry.
    pub registry: Arc<SessionRegistry>,
    /// Message router.
    pub router: Arc<RoutingEngine>,
    /// Inbound rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// Stale connection sweeper.
    pub sweeper: Arc<StaleConnectionSweeper>,
    /// Metrics collector.
    pub metrics: Arc<SignallingMetrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for SignallingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignallingEngine")
            .field("connections", &self.registry.len())
            .finish()
    }
}

impl SignallingEngine {
    /// Creates a new signalling engine with all subsystems.
    pub fn new(config: SignallingConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        let metrics = Arc::new(SignallingMetrics::new());
        let registry = Arc::new(SessionRegistry::new());
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let router = Arc::new(RoutingEngine::new(registry.clone(), metrics.clone()));
        let sweeper = Arc::new(StaleConnectionSweeper::new(
            registry.clone(),
            limiter.clone(),
            metrics.clone(),
            &config,
        ));
        let connections = Arc::new(ConnectionManager::new(
            config,
            registry.clone(),
            router.clone(),
            limiter.clone(),
            metrics.clone(),
        ));

        info!("Signalling engine initialized");

        Self {
            connections,
            registry,
            router,
            limiter,
            sweeper,
            metrics,
            shutdown_tx,
        }
    }

    /// Spawns the sweeper on the current runtime. It stops on [`shutdown`](Self::shutdown).
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let sweeper = self.sweeper.clone();
        let cancel = self.shutdown_tx.subscribe();
        tokio::spawn(async move { sweeper.run(cancel).await })
    }

    /// Per-role connection counts.
    pub fn counts(&self) -> RegistryCounts {
        self.registry.counts()
    }

    /// Metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Stops background tasks and closes every connection.
    pub fn shutdown(&self) {
        info!("Shutting down signalling engine");
        let _ = self.shutdown_tx.send(true);
        self.connections.close_all("Server shutting down");
    }
}
