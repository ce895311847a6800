//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! optional TOML files plus `SIGRELAY__`-prefixed environment variables.
//! Every section has defaults, so the relay starts with no files present.

pub mod app;
pub mod logging;
pub mod signalling;

use serde::{Deserialize, Serialize};

use self::app::ServerConfig;
use self::logging::LoggingConfig;
use self::signalling::SignallingConfig;

use crate::error::AppError;
use crate::result::AppResult;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Registry, routing, rate limit and sweeper settings.
    #[serde(default)]
    pub signalling: SignallingConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges `config/default.toml`, an environment-specific overlay
    /// `config/{env}.toml`, and environment variables such as
    /// `SIGRELAY__SIGNALLING__STALE_TIMEOUT_MS`.
    pub fn load(env: &str) -> AppResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("SIGRELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let cfg: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;
        cfg.validate()?;

        tracing::debug!(
            env,
            port = cfg.server.port,
            stale_timeout_ms = cfg.signalling.stale_timeout_ms,
            "Configuration loaded"
        );
        Ok(cfg)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        let s = &self.signalling;
        if s.cleanup_interval_ms == 0 {
            return Err(AppError::configuration(
                "signalling.cleanup_interval_ms must be greater than zero",
            ));
        }
        if s.outbound_buffer_size == 0 {
            return Err(AppError::configuration(
                "signalling.outbound_buffer_size must be greater than zero",
            ));
        }
        if s.rate_limit.window_seconds == 0 {
            return Err(AppError::configuration(
                "signalling.rate_limit.window_seconds must be greater than zero",
            ));
        }
        if !s.peer_connection_options.is_object() {
            return Err(AppError::configuration(
                "signalling.peer_connection_options must be a table",
            ));
        }
        Ok(())
    }
}
