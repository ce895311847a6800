//! Routing engine: applies one inbound message to the registry and
//! forwards whatever the message implies to other peers.
//!
//! All operations are synchronous. Sends go through each target's bounded
//! outbound queue and never wait; a full or closed queue drops the frame.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connection::handle::{ConnectionHandle, PeerRole};
use crate::connection::registry::SessionRegistry;
use crate::error::SignalError;
use crate::message::types::{ControlMessage, InboundMessage, OutboundMessage, RelayKind, RelayMessage};
use crate::metrics::SignallingMetrics;

use super::policy;

const DEFAULT_DISCONNECT_REASON: &str = "Disconnected by streamer";

/// Interprets signalling messages against the session registry.
#[derive(Debug)]
pub struct RoutingEngine {
    registry: Arc<SessionRegistry>,
    metrics: Arc<SignallingMetrics>,
}

impl RoutingEngine {
    /// Creates a routing engine over a shared registry.
    pub fn new(registry: Arc<SessionRegistry>, metrics: Arc<SignallingMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// The registry this engine mutates.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Queue a relay-generated message to `target`, counting the outcome.
    pub fn deliver(&self, target: &ConnectionHandle, msg: &OutboundMessage) -> bool {
        let delivered = target.send(msg);
        self.metrics.record_send(delivered);
        delivered
    }

    fn forward(&self, target: &ConnectionHandle, relay: &RelayMessage) -> bool {
        let delivered = target.send_text(relay.to_text());
        self.metrics.record_send(delivered);
        if delivered {
            self.metrics.message_forwarded();
        }
        delivered
    }

    /// Apply one decoded message from `conn`.
    ///
    /// Errors are protocol-level: the caller replies with them and keeps
    /// the connection open.
    pub fn route(&self, conn: &Arc<ConnectionHandle>, msg: InboundMessage) -> Result<(), SignalError> {
        policy::check_permitted(conn.role, &msg)?;

        match msg {
            InboundMessage::Relay(relay) => self.route_relay(conn, relay),
            InboundMessage::Control(control) => {
                self.route_control(conn, control);
                Ok(())
            }
        }
    }

    fn route_control(&self, conn: &Arc<ConnectionHandle>, control: ControlMessage) {
        match control {
            ControlMessage::RegisterStreamer { streamer_id } => {
                let streamer_id = streamer_id
                    .filter(|id| !id.trim().is_empty())
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                self.adopt_id(conn, Some(streamer_id.as_str()));
                info!(peer_id = %conn.id(), role = %conn.role, "Streamer registered");
            }
            ControlMessage::EndpointId { id } => {
                self.adopt_id(conn, id.as_deref());
                conn.set_streaming(true);
                let committed_id = conn.id();
                info!(peer_id = %committed_id, role = %conn.role, "Endpoint identified, streaming");
                self.deliver(conn, &OutboundMessage::EndpointIdConfirm { committed_id });
            }
            ControlMessage::StartStreaming {} => {
                conn.set_streaming(true);
                info!(peer_id = %conn.id(), "Streaming started");
            }
            ControlMessage::StopStreaming {} => {
                conn.set_streaming(false);
                info!(peer_id = %conn.id(), "Streaming stopped");
            }
            ControlMessage::Subscribe { streamer_id }
            | ControlMessage::RegisterPlayer { streamer_id, .. } => {
                self.subscribe(conn, &streamer_id);
            }
            ControlMessage::Unsubscribe {} => self.unsubscribe(conn),
            ControlMessage::ListStreamers {} => {
                let ids = self.registry.streaming_ids();
                self.deliver(conn, &OutboundMessage::StreamerList { ids });
            }
            ControlMessage::Ping { time } => {
                self.deliver(conn, &OutboundMessage::Pong { time });
            }
            ControlMessage::DisconnectPlayer { player_id, reason } => {
                self.disconnect_player(conn, &player_id, reason);
            }
        }
    }

    /// Move a producer to the id it announced. Blank ids keep the current one.
    fn adopt_id(&self, conn: &Arc<ConnectionHandle>, requested: Option<&str>) {
        let Some(new_id) = requested.map(str::trim).filter(|id| !id.is_empty()) else {
            return;
        };
        let old_id = conn.id();
        if new_id == old_id {
            return;
        }

        for displaced in self.registry.rekey(conn, new_id) {
            warn!(
                peer_id = %new_id,
                displaced_session = %displaced.session_id,
                "Peer id already registered, replacing previous entry"
            );
        }

        for player in conn
            .subscribers()
            .iter()
            .filter_map(|pid| self.registry.player(pid))
        {
            if player.retarget_subscription(&old_id, new_id) {
                self.deliver(
                    &player,
                    &OutboundMessage::StreamerIdChanged {
                        new_id: new_id.to_string(),
                    },
                );
            }
        }

        if let Some(streamer) = conn
            .subscribed_to()
            .and_then(|sid| self.registry.streamer(&sid))
        {
            streamer.rename_subscriber(&old_id, new_id);
        }

        debug!(old_id = %old_id, new_id = %new_id, "Peer re-keyed");
    }

    /// Subscribe a consumer to a producer, replacing any prior subscription.
    pub fn subscribe(&self, conn: &Arc<ConnectionHandle>, streamer_id: &str) {
        let caller_id = conn.id();

        let target = match self.registry.streamer(streamer_id) {
            Some(t) if Arc::ptr_eq(&t, conn) => {
                self.subscribe_failed(conn, format!("Cannot subscribe to self ({streamer_id})."));
                return;
            }
            Some(t) => t,
            None => {
                self.subscribe_failed(conn, format!("Streamer {streamer_id} does not exist."));
                return;
            }
        };

        if !target.has_capacity_for(&caller_id) {
            self.subscribe_failed(conn, SignalError::SubscriberLimit(streamer_id.to_string()).to_string());
            return;
        }

        self.unsubscribe(conn);

        if !target.try_add_subscriber(&caller_id) {
            self.subscribe_failed(conn, SignalError::SubscriberLimit(streamer_id.to_string()).to_string());
            return;
        }
        conn.set_subscribed(Some(streamer_id.to_string()));

        // Either side may have started its disconnect cascade after the lookup.
        if conn.is_closed() {
            target.remove_subscriber(&caller_id);
            conn.clear_subscription_if(streamer_id);
            debug!(peer_id = %caller_id, streamer_id = %streamer_id, "Subscriber closed mid-subscribe, rolled back");
            return;
        }
        if target.is_closed() {
            target.remove_subscriber(&caller_id);
            conn.clear_subscription_if(streamer_id);
            self.subscribe_failed(conn, format!("Streamer {streamer_id} does not exist."));
            return;
        }

        info!(peer_id = %caller_id, streamer_id = %streamer_id, "Subscribed");
        self.deliver(
            &target,
            &OutboundMessage::PlayerConnected {
                player_id: caller_id,
                data_channel: true,
                sfu: conn.role == PeerRole::Sfu,
            },
        );
    }

    fn subscribe_failed(&self, conn: &ConnectionHandle, message: String) {
        debug!(peer_id = %conn.id(), %message, "Subscribe failed");
        self.deliver(conn, &OutboundMessage::SubscribeFailed { message });
    }

    /// Drop a consumer's subscription and tell the producer.
    pub fn unsubscribe(&self, conn: &ConnectionHandle) {
        let Some(streamer_id) = conn.set_subscribed(None) else {
            return;
        };
        let player_id = conn.id();

        // A streamer that never held this player is not told about it.
        match self.registry.streamer(&streamer_id) {
            Some(streamer) if streamer.remove_subscriber(&player_id) => {
                self.deliver(&streamer, &OutboundMessage::PlayerDisconnected { player_id: player_id.clone() });
                debug!(peer_id = %player_id, streamer_id = %streamer_id, "Unsubscribed");
            }
            _ => debug!(peer_id = %player_id, streamer_id = %streamer_id, "Dropped stale subscription"),
        }
    }

    /// The live streamer `conn` is subscribed to.
    ///
    /// A subscription whose target no longer lists the caller (evicted,
    /// displaced, or its id taken over by another connection) is cleared
    /// and reported as absent.
    fn current_streamer(&self, conn: &ConnectionHandle) -> Option<Arc<ConnectionHandle>> {
        let streamer_id = conn.subscribed_to()?;
        let caller_id = conn.id();
        match self.registry.streamer(&streamer_id) {
            Some(streamer) if streamer.has_subscriber(&caller_id) => Some(streamer),
            _ => {
                conn.clear_subscription_if(&streamer_id);
                debug!(peer_id = %caller_id, streamer_id = %streamer_id, "Dropped stale subscription");
                None
            }
        }
    }

    fn disconnect_player(&self, conn: &ConnectionHandle, player_id: &str, reason: Option<String>) {
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DISCONNECT_REASON.to_string());

        let Some(player) = self.registry.player(player_id) else {
            warn!(peer_id = %conn.id(), player_id = %player_id, "disconnectPlayer for unknown player");
            return;
        };

        info!(peer_id = %conn.id(), player_id = %player_id, %reason, "Disconnecting player");
        self.deliver(&player, &OutboundMessage::Disconnect { reason: reason.clone() });
        self.disconnect(&player);
        player.close(reason);
    }

    fn route_relay(&self, conn: &Arc<ConnectionHandle>, relay: RelayMessage) -> Result<(), SignalError> {
        if let Some(to) = relay.to() {
            let to = to.to_string();
            return self.route_addressed(conn, &to, relay);
        }

        let toward_player = match conn.role {
            PeerRole::Streamer => true,
            PeerRole::Player => false,
            PeerRole::Sfu => relay.has_player_id(),
        };

        if toward_player {
            self.relay_to_player(conn, relay);
        } else {
            self.relay_to_streamer(conn, relay);
        }
        Ok(())
    }

    /// Explicit `to` addressing: streamer namespace first, then players.
    fn route_addressed(&self, conn: &ConnectionHandle, to: &str, relay: RelayMessage) -> Result<(), SignalError> {
        let target = self
            .registry
            .streamer(to)
            .or_else(|| self.registry.player(to))
            .ok_or_else(|| SignalError::TargetNotFound(to.to_string()))?;

        debug!(peer_id = %conn.id(), to = %to, kind = relay.kind.as_str(), "Forwarding addressed message");
        self.forward(&target, &relay);
        Ok(())
    }

    fn relay_to_streamer(&self, conn: &Arc<ConnectionHandle>, relay: RelayMessage) {
        let caller_id = conn.id();

        let streamer = match self.current_streamer(conn) {
            Some(s) => s,
            None => {
                let Some(candidate) = self.registry.first_streaming(&caller_id) else {
                    warn!(
                        peer_id = %caller_id,
                        kind = relay.kind.as_str(),
                        "No streaming streamer available, dropping message"
                    );
                    return;
                };
                let candidate_id = candidate.id();
                debug!(peer_id = %caller_id, streamer_id = %candidate_id, "Auto-subscribing");
                self.subscribe(conn, &candidate_id);

                match self.current_streamer(conn) {
                    Some(s) => s,
                    None => {
                        warn!(peer_id = %caller_id, streamer_id = %candidate_id, "Auto-subscribe failed, dropping message");
                        return;
                    }
                }
            }
        };

        let mut relay = relay.with_player_id(&caller_id);
        if conn.role == PeerRole::Sfu && relay.kind == RelayKind::StreamerDataChannels {
            relay = relay.with_sfu_id(&caller_id);
        }
        self.forward(&streamer, &relay);
    }

    fn relay_to_player(&self, conn: &ConnectionHandle, relay: RelayMessage) {
        let Some(player_id) = relay.player_id().map(str::to_string) else {
            warn!(peer_id = %conn.id(), kind = relay.kind.as_str(), "Message to player without playerId, dropping");
            return;
        };

        let Some(player) = self.registry.player(&player_id) else {
            warn!(peer_id = %conn.id(), player_id = %player_id, "Player not found, dropping message");
            return;
        };

        self.forward(&player, &relay.without_player_id());
    }

    /// Runs the disconnect cascade for a connection leaving the relay.
    ///
    /// Idempotent: only the first call for a handle does anything. Returns
    /// whether this call performed the cascade.
    pub fn disconnect(&self, conn: &Arc<ConnectionHandle>) -> bool {
        if !conn.mark_closed() {
            return false;
        }
        let id = conn.id();

        if conn.role.is_consumer() {
            self.unsubscribe(conn);
        }

        if conn.role.is_producer() {
            conn.set_streaming(false);
            for player_id in conn.take_subscribers() {
                let Some(player) = self.registry.player(&player_id) else {
                    continue;
                };
                if player.clear_subscription_if(&id) {
                    self.deliver(&player, &OutboundMessage::StreamerDisconnected {});
                }
            }
        }

        self.registry.unregister_handle(conn);
        info!(peer_id = %id, role = %conn.role, "Peer disconnected");
        true
    }
}
