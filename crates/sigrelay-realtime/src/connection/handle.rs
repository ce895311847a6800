//! Individual peer connection handle.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use super::attributes::ConnectionAttributes;
use crate::message::types::OutboundMessage;

/// Transport session identifier. Never changes for the life of a socket,
/// unlike the peer id which a streamer may re-announce.
pub type SessionId = Uuid;

/// The role a peer declares at handshake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    /// Produces a media stream.
    Streamer,
    /// Consumes one streamer's media.
    Player,
    /// Consumes one streamer and re-publishes to many players.
    Sfu,
}

impl PeerRole {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streamer => "streamer",
            Self::Player => "player",
            Self::Sfu => "sfu",
        }
    }

    /// Whether the role occupies the streamer namespace.
    pub fn is_producer(&self) -> bool {
        matches!(self, Self::Streamer | Self::Sfu)
    }

    /// Whether the role occupies the player namespace.
    pub fn is_consumer(&self) -> bool {
        matches!(self, Self::Player | Self::Sfu)
    }
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "streamer" => Ok(Self::Streamer),
            "player" => Ok(Self::Player),
            "sfu" => Ok(Self::Sfu),
            other => Err(format!("Unknown connection type: {other}")),
        }
    }
}

/// A frame queued for the connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A serialized JSON message.
    Text(String),
    /// Close the transport with the given reason.
    Close { reason: String },
}

/// Producer-side state held by streamers and SFUs.
#[derive(Debug)]
pub struct StreamerState {
    streaming: AtomicBool,
    subscribers: Mutex<BTreeSet<String>>,
    max_subscribers: usize,
}

impl StreamerState {
    fn new(max_subscribers: usize) -> Self {
        Self {
            streaming: AtomicBool::new(false),
            subscribers: Mutex::new(BTreeSet::new()),
            max_subscribers,
        }
    }
}

/// Consumer-side state held by players and SFUs.
#[derive(Debug, Default)]
pub struct PlayerState {
    subscribed: Mutex<Option<String>>,
}

/// A handle to a single peer connection.
///
/// Holds the sender half of the connection's outbound queue plus the
/// role-specific signalling state. The registry stores one `Arc` of this
/// per connection, indexed from every namespace the role occupies.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Transport session, used as the rate-limit key.
    pub session_id: SessionId,
    /// Declared role.
    pub role: PeerRole,
    /// Handshake attributes.
    pub attributes: ConnectionAttributes,
    /// When the connection was established.
    pub connected_at: Instant,
    id: RwLock<String>,
    sender: mpsc::Sender<OutboundFrame>,
    last_activity: Mutex<Instant>,
    closed: AtomicBool,
    streamer: Option<StreamerState>,
    player: Option<PlayerState>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ConnectionHandle {
    /// Create a new connection handle.
    ///
    /// `max_subscribers` only applies to producer roles; `0` is unlimited.
    pub fn new(
        id: impl Into<String>,
        role: PeerRole,
        attributes: ConnectionAttributes,
        sender: mpsc::Sender<OutboundFrame>,
        max_subscribers: usize,
    ) -> Self {
        let now = Instant::now();
        Self {
            session_id: Uuid::new_v4(),
            role,
            attributes,
            connected_at: now,
            id: RwLock::new(id.into()),
            sender,
            last_activity: Mutex::new(now),
            closed: AtomicBool::new(false),
            streamer: role
                .is_producer()
                .then(|| StreamerState::new(max_subscribers)),
            player: role.is_consumer().then(PlayerState::default),
        }
    }

    /// Current peer id.
    pub fn id(&self) -> String {
        self.id
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the peer id. Only the registry should call this, while re-keying.
    pub(crate) fn set_id(&self, id: &str) {
        let mut guard = self
            .id
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = id.to_string();
    }

    /// Queue a protocol message. Never blocks; returns `false` when dropped.
    pub fn send(&self, msg: &OutboundMessage) -> bool {
        match serde_json::to_string(msg) {
            Ok(text) => self.send_text(text),
            Err(e) => {
                tracing::error!(session_id = %self.session_id, "Failed to serialize outbound message: {e}");
                false
            }
        }
    }

    /// Queue a raw JSON text frame.
    pub fn send_text(&self, text: String) -> bool {
        self.push(OutboundFrame::Text(text))
    }

    /// Ask the writer task to close the transport.
    pub fn close(&self, reason: impl Into<String>) -> bool {
        self.push(OutboundFrame::Close {
            reason: reason.into(),
        })
    }

    fn push(&self, frame: OutboundFrame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    peer_id = %self.id(),
                    "Outbound buffer full, dropping frame"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    peer_id = %self.id(),
                    "Outbound queue closed, dropping frame"
                );
                false
            }
        }
    }

    /// Record inbound activity.
    pub fn touch(&self) {
        *lock(&self.last_activity) = Instant::now();
    }

    /// Last time inbound activity was recorded.
    pub fn last_activity(&self) -> Instant {
        *lock(&self.last_activity)
    }

    /// Whether the connection has been idle for strictly longer than `timeout` at `now`.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity()) > timeout
    }

    /// Mark the connection as closed. Returns `true` only for the first caller.
    pub fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Whether the connection has left the relay.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // -- producer state --------------------------------------------------

    /// Whether the peer has announced it is ready to stream.
    pub fn is_streaming(&self) -> bool {
        self.streamer
            .as_ref()
            .is_some_and(|s| s.streaming.load(Ordering::SeqCst))
    }

    /// Set the streaming flag. No-op for non-producers.
    pub fn set_streaming(&self, streaming: bool) {
        if let Some(s) = &self.streamer {
            s.streaming.store(streaming, Ordering::SeqCst);
        }
    }

    /// Add a subscriber unless the cap is reached. Re-adding an existing
    /// subscriber always succeeds.
    pub fn try_add_subscriber(&self, player_id: &str) -> bool {
        let Some(s) = &self.streamer else {
            return false;
        };
        let mut subs = lock(&s.subscribers);
        if subs.contains(player_id) {
            return true;
        }
        if s.max_subscribers > 0 && subs.len() >= s.max_subscribers {
            return false;
        }
        subs.insert(player_id.to_string());
        true
    }

    /// Whether another subscriber other than `player_id` fits under the cap.
    pub fn has_capacity_for(&self, player_id: &str) -> bool {
        let Some(s) = &self.streamer else {
            return false;
        };
        let subs = lock(&s.subscribers);
        s.max_subscribers == 0 || subs.contains(player_id) || subs.len() < s.max_subscribers
    }

    /// Remove a subscriber. Returns whether it was present.
    pub fn remove_subscriber(&self, player_id: &str) -> bool {
        self.streamer
            .as_ref()
            .is_some_and(|s| lock(&s.subscribers).remove(player_id))
    }

    /// Whether `player_id` is in the subscriber set.
    pub fn has_subscriber(&self, player_id: &str) -> bool {
        self.streamer
            .as_ref()
            .is_some_and(|s| lock(&s.subscribers).contains(player_id))
    }

    /// Replace a subscriber id in place, used when a subscribed SFU re-keys.
    pub fn rename_subscriber(&self, old_id: &str, new_id: &str) {
        if let Some(s) = &self.streamer {
            let mut subs = lock(&s.subscribers);
            if subs.remove(old_id) {
                subs.insert(new_id.to_string());
            }
        }
    }

    /// Snapshot of subscriber ids.
    pub fn subscribers(&self) -> Vec<String> {
        self.streamer
            .as_ref()
            .map(|s| lock(&s.subscribers).iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drain all subscriber ids.
    pub fn take_subscribers(&self) -> Vec<String> {
        self.streamer
            .as_ref()
            .map(|s| std::mem::take(&mut *lock(&s.subscribers)).into_iter().collect())
            .unwrap_or_default()
    }

    // -- consumer state --------------------------------------------------

    /// The streamer this peer is currently subscribed to.
    pub fn subscribed_to(&self) -> Option<String> {
        self.player.as_ref().and_then(|p| lock(&p.subscribed).clone())
    }

    /// Set or clear the subscription, returning the previous one.
    pub fn set_subscribed(&self, streamer_id: Option<String>) -> Option<String> {
        self.player
            .as_ref()
            .and_then(|p| std::mem::replace(&mut *lock(&p.subscribed), streamer_id))
    }

    /// Clear the subscription only if it still points at `streamer_id`.
    pub fn clear_subscription_if(&self, streamer_id: &str) -> bool {
        let Some(p) = &self.player else {
            return false;
        };
        let mut sub = lock(&p.subscribed);
        if sub.as_deref() == Some(streamer_id) {
            *sub = None;
            true
        } else {
            false
        }
    }

    /// Rewrite the subscription from `old_id` to `new_id` if it still points at `old_id`.
    pub fn retarget_subscription(&self, old_id: &str, new_id: &str) -> bool {
        let Some(p) = &self.player else {
            return false;
        };
        let mut sub = lock(&p.subscribed);
        if sub.as_deref() == Some(old_id) {
            *sub = Some(new_id.to_string());
            true
        } else {
            false
        }
    }

    /// Get a snapshot of connection info.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id(),
            session_id: self.session_id,
            role: self.role,
            connected_seconds: self.connected_at.elapsed().as_secs(),
            idle_seconds: self.last_activity().elapsed().as_secs(),
            streaming: self.is_streaming(),
            subscribers: self.subscribers().len(),
            subscribed_to: self.subscribed_to(),
        }
    }
}

/// Snapshot of connection info (serializable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub session_id: SessionId,
    pub role: PeerRole,
    pub connected_seconds: u64,
    pub idle_seconds: u64,
    pub streaming: bool,
    pub subscribers: usize,
    pub subscribed_to: Option<String>,
}
