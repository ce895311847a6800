//! Application state shared across all handlers.

use std::sync::Arc;
use std::time::Instant;

use sigrelay_core::config::AppConfig;
use sigrelay_realtime::SignallingEngine;

/// Application state passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Signalling engine
    pub engine: SignallingEngine,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Builds state around an existing engine.
    pub fn new(config: Arc<AppConfig>, engine: SignallingEngine) -> Self {
        Self {
            config,
            engine,
            started_at: Instant::now(),
        }
    }
}
