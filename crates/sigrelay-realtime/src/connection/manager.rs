//! Connection lifecycle: open, inbound frames, close.
//!
//! This is the transport-agnostic half of the gateway. The HTTP layer owns
//! the socket and calls into it for every frame; everything protocol-related
//! happens here.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sigrelay_core::config::signalling::SignallingConfig;

use crate::error::SignalError;
use crate::message::types::{InboundMessage, OutboundMessage};
use crate::message::validator;
use crate::metrics::SignallingMetrics;
use crate::ratelimit::RateLimiter;
use crate::routing::engine::RoutingEngine;

use super::attributes::ConnectionAttributes;
use super::handle::{ConnectionHandle, OutboundFrame, PeerRole};
use super::registry::SessionRegistry;

/// Manages all live signalling connections.
#[derive(Debug)]
pub struct ConnectionManager {
    registry: Arc<SessionRegistry>,
    router: Arc<RoutingEngine>,
    limiter: Arc<RateLimiter>,
    metrics: Arc<SignallingMetrics>,
    config: SignallingConfig,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    pub fn new(
        config: SignallingConfig,
        registry: Arc<SessionRegistry>,
        router: Arc<RoutingEngine>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<SignallingMetrics>,
    ) -> Self {
        Self {
            registry,
            router,
            limiter,
            metrics,
            config,
        }
    }

    /// Registers a newly upgraded connection.
    ///
    /// Returns the connection handle and a receiver for outbound frames.
    /// The relay's `config` message is already queued on the receiver.
    pub fn open(
        &self,
        attributes: ConnectionAttributes,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(self.config.outbound_buffer_size);
        let role = attributes.role;

        let id = match (&attributes.requested_id, role.is_producer()) {
            (Some(requested), true) => requested.clone(),
            _ => Uuid::new_v4().to_string(),
        };
        let max_subscribers = match role {
            PeerRole::Streamer => self.config.max_subscribers.streamer,
            PeerRole::Sfu => self.config.max_subscribers.sfu,
            PeerRole::Player => 0,
        };

        let handle = Arc::new(ConnectionHandle::new(
            id,
            role,
            attributes,
            tx,
            max_subscribers,
        ));

        for displaced in self.registry.register(handle.clone()) {
            warn!(
                peer_id = %handle.id(),
                displaced_session = %displaced.session_id,
                "Peer id already registered, replacing previous entry"
            );
        }
        self.metrics.connection_opened();

        self.router.deliver(
            &handle,
            &OutboundMessage::Config {
                protocol_version: self.config.protocol_version.clone(),
                peer_connection_options: self.config.peer_connection_options.clone(),
            },
        );
        if role.is_producer() {
            self.router.deliver(&handle, &OutboundMessage::Identify {});
        }

        info!(
            conn_id = %handle.session_id,
            peer_id = %handle.id(),
            role = %role,
            instance_id = handle.attributes.instance_id.as_deref().unwrap_or("-"),
            project_id = handle.attributes.project_id.as_deref().unwrap_or("-"),
            "Signalling connection registered"
        );

        (handle, rx)
    }

    /// Processes one inbound text frame.
    pub fn handle_inbound(&self, conn: &Arc<ConnectionHandle>, raw: &str) {
        conn.touch();
        self.metrics.message_received();

        if conn.is_closed() {
            debug!(conn_id = %conn.session_id, "Frame from closed connection ignored");
            return;
        }

        if !self.limiter.admit(conn.session_id) {
            self.metrics.rate_limited();
            warn!(conn_id = %conn.session_id, peer_id = %conn.id(), "Rate limit exceeded");
            self.reply_error(conn, &SignalError::RateLimitExceeded);
            return;
        }

        if let Err(e) = self.process(conn, raw) {
            self.metrics.protocol_error();
            debug!(conn_id = %conn.session_id, peer_id = %conn.id(), error = %e, "Rejected message");
            self.reply_error(conn, &e);
        }
    }

    /// Processes one inbound binary frame as UTF-8 text.
    pub fn handle_binary(&self, conn: &Arc<ConnectionHandle>, data: &[u8]) {
        match std::str::from_utf8(data) {
            Ok(text) => self.handle_inbound(conn, text),
            Err(_) => {
                conn.touch();
                self.metrics.message_received();
                self.metrics.protocol_error();
                self.reply_error(conn, &SignalError::malformed("Binary frame is not valid UTF-8"));
            }
        }
    }

    fn process(&self, conn: &Arc<ConnectionHandle>, raw: &str) -> Result<(), SignalError> {
        validator::validate_frame(raw, self.config.max_message_bytes)?;
        let msg = InboundMessage::parse(raw)?;
        debug!(conn_id = %conn.session_id, kind = msg.kind(), "Inbound message");
        self.router.route(conn, msg)
    }

    fn reply_error(&self, conn: &ConnectionHandle, err: &SignalError) {
        self.router.deliver(conn, &OutboundMessage::from(err));
    }

    /// Tears down a connection whose transport has ended.
    ///
    /// Runs the disconnect cascade unless it already ran (forced
    /// disconnect or sweep eviction) and drops rate-limit state.
    pub fn close(&self, conn: &Arc<ConnectionHandle>) {
        let cascaded = self.router.disconnect(conn);
        self.limiter.remove_session(conn.session_id);
        self.metrics.connection_closed();

        info!(
            conn_id = %conn.session_id,
            peer_id = %conn.id(),
            role = %conn.role,
            cascaded,
            "Signalling connection unregistered"
        );
    }

    /// Asks every connection's writer to close the transport.
    pub fn close_all(&self, reason: &str) {
        let connections = self.registry.all_connections();
        info!(count = connections.len(), "Closing all signalling connections");
        for conn in connections {
            conn.close(reason);
        }
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }
}
