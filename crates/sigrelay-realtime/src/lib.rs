//! # sigrelay-realtime
//!
//! Signalling engine for the WebRTC relay. Provides:
//!
//! - Connection handles for streamer, player and SFU peers
//! - The session registry and its streamer/player namespaces
//! - Protocol message parsing and role-aware routing
//! - Per-connection sliding-window rate limiting
//! - Periodic eviction of stale connections

pub mod connection;
pub mod error;
pub mod message;
pub mod metrics;
pub mod ratelimit;
pub mod routing;
pub mod server;
pub mod sweeper;

pub use connection::handle::{ConnectionHandle, OutboundFrame, PeerRole};
pub use connection::manager::ConnectionManager;
pub use connection::registry::SessionRegistry;
pub use error::SignalError;
pub use ratelimit::RateLimiter;
pub use routing::engine::RoutingEngine;
pub use server::SignallingEngine;
pub use sweeper::StaleConnectionSweeper;
