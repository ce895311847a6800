//! Signalling engine configuration.

use serde::{Deserialize, Serialize};

/// Settings for the connection registry, routing engine, rate limiter
/// and stale-connection sweeper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignallingConfig {
    /// A connection with no inbound activity for longer than this is evicted.
    #[serde(default = "default_stale_timeout")]
    pub stale_timeout_ms: u64,
    /// Interval between sweeper ticks.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_ms: u64,
    /// Inbound frames larger than this are rejected as malformed.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Capacity of each connection's outbound queue.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer_size: usize,
    /// Version string announced in the `config` message sent on connect.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// Opaque `RTCPeerConnection` options handed to every peer on connect.
    #[serde(default = "default_peer_connection_options")]
    pub peer_connection_options: serde_json::Value,
    /// Per-connection inbound rate limit.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Subscriber caps per producing role.
    #[serde(default)]
    pub max_subscribers: MaxSubscribersConfig,
}

impl Default for SignallingConfig {
    fn default() -> Self {
        Self {
            stale_timeout_ms: default_stale_timeout(),
            cleanup_interval_ms: default_cleanup_interval(),
            max_message_bytes: default_max_message_bytes(),
            outbound_buffer_size: default_outbound_buffer(),
            protocol_version: default_protocol_version(),
            peer_connection_options: default_peer_connection_options(),
            rate_limit: RateLimitConfig::default(),
            max_subscribers: MaxSubscribersConfig::default(),
        }
    }
}

/// Sliding-window rate limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Width of the trailing window in whole seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Messages admitted per window.
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            max_messages: default_max_messages(),
        }
    }
}

/// Maximum subscribers per streamer-capable role. `0` means unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaxSubscribersConfig {
    #[serde(default)]
    pub streamer: usize,
    #[serde(default)]
    pub sfu: usize,
}

fn default_stale_timeout() -> u64 {
    60_000
}

fn default_cleanup_interval() -> u64 {
    30_000
}

fn default_max_message_bytes() -> usize {
    65_536
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_protocol_version() -> String {
    "1.0".to_string()
}

fn default_peer_connection_options() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_window_seconds() -> u64 {
    10
}

fn default_max_messages() -> u32 {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_section_falls_back_to_defaults() {
        let cfg: SignallingConfig =
            serde_json::from_str(r#"{"stale_timeout_ms": 5000, "rate_limit": {"max_messages": 3}}"#)
                .unwrap();

        assert_eq!(cfg.stale_timeout_ms, 5000);
        assert_eq!(cfg.cleanup_interval_ms, 30_000);
        assert_eq!(cfg.rate_limit.max_messages, 3);
        assert_eq!(cfg.rate_limit.window_seconds, 10);
        assert_eq!(cfg.max_subscribers.streamer, 0);
        assert!(cfg.peer_connection_options.is_object());
    }
}
