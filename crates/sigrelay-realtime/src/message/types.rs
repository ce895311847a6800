//! Inbound and outbound signalling message type definitions.
//!
//! Every frame is a JSON object with a `type` discriminant. Control
//! messages are decoded into typed variants. Negotiation messages (offer,
//! answer, ICE, data-channel auxiliaries) are kept as raw JSON objects
//! since the relay forwards them without interpreting their payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SignalError;

use super::validator;

/// Negotiation message kinds the relay forwards between peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayKind {
    Offer,
    Answer,
    IceCandidate,
    DataChannelRequest,
    PeerDataChannelsReady,
    LayerPreference,
    StreamerDataChannels,
    PeerDataChannels,
}

impl RelayKind {
    /// All relay kinds, in wire order.
    pub const ALL: [RelayKind; 8] = [
        Self::Offer,
        Self::Answer,
        Self::IceCandidate,
        Self::DataChannelRequest,
        Self::PeerDataChannelsReady,
        Self::LayerPreference,
        Self::StreamerDataChannels,
        Self::PeerDataChannels,
    ];

    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "iceCandidate",
            Self::DataChannelRequest => "dataChannelRequest",
            Self::PeerDataChannelsReady => "peerDataChannelsReady",
            Self::LayerPreference => "layerPreference",
            Self::StreamerDataChannels => "streamerDataChannels",
            Self::PeerDataChannels => "peerDataChannels",
        }
    }

    /// Look up a kind by its wire name.
    pub fn from_type(ty: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == ty)
    }
}

/// A negotiation message. `body` is the original object, `type` included.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayMessage {
    pub kind: RelayKind,
    pub body: Map<String, Value>,
}

impl RelayMessage {
    /// The `playerId` field, if present and a string.
    pub fn player_id(&self) -> Option<&str> {
        self.body.get("playerId").and_then(Value::as_str)
    }

    /// Whether the sender included a `playerId` field at all.
    pub fn has_player_id(&self) -> bool {
        self.body.contains_key("playerId")
    }

    /// The explicit `to` address, if present and a string.
    pub fn to(&self) -> Option<&str> {
        self.body.get("to").and_then(Value::as_str)
    }

    /// Stamp the originating player.
    pub fn with_player_id(mut self, player_id: &str) -> Self {
        self.body
            .insert("playerId".to_string(), Value::String(player_id.to_string()));
        self
    }

    /// Remove the `playerId` routing field before delivery to a player.
    pub fn without_player_id(mut self) -> Self {
        self.body.remove("playerId");
        self
    }

    /// Stamp the originating SFU.
    pub fn with_sfu_id(mut self, sfu_id: &str) -> Self {
        self.body
            .insert("sfuId".to_string(), Value::String(sfu_id.to_string()));
        self
    }

    /// Serialize back to a JSON text frame.
    pub fn to_text(&self) -> String {
        Value::Object(self.body.clone()).to_string()
    }
}

/// Control messages interpreted by the routing engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Producer announces or changes its id.
    RegisterStreamer {
        #[serde(default, rename = "streamerId")]
        streamer_id: Option<String>,
    },
    /// Producer announces its id and that it is ready to stream.
    EndpointId {
        #[serde(default)]
        id: Option<String>,
    },
    /// Producer is ready to stream.
    StartStreaming {},
    /// Producer stopped streaming.
    StopStreaming {},
    /// Consumer registers against a streamer. Equivalent to `subscribe`.
    RegisterPlayer {
        #[serde(rename = "streamerId")]
        streamer_id: String,
        #[serde(default, rename = "playerId")]
        player_id: Option<String>,
    },
    /// Consumer subscribes to a streamer.
    Subscribe {
        #[serde(rename = "streamerId")]
        streamer_id: String,
    },
    /// Consumer drops its subscription.
    Unsubscribe {},
    /// Any peer asks for the streaming producers.
    ListStreamers {},
    /// Keepalive.
    Ping {
        #[serde(default)]
        time: Option<i64>,
    },
    /// Producer evicts one of its players.
    DisconnectPlayer {
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ControlMessage {
    /// Wire names of all control kinds.
    pub const TYPES: [&'static str; 10] = [
        "registerStreamer",
        "endpointId",
        "startStreaming",
        "stopStreaming",
        "registerPlayer",
        "subscribe",
        "unsubscribe",
        "listStreamers",
        "ping",
        "disconnectPlayer",
    ];

    /// Wire name of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RegisterStreamer { .. } => "registerStreamer",
            Self::EndpointId { .. } => "endpointId",
            Self::StartStreaming {} => "startStreaming",
            Self::StopStreaming {} => "stopStreaming",
            Self::RegisterPlayer { .. } => "registerPlayer",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe {} => "unsubscribe",
            Self::ListStreamers {} => "listStreamers",
            Self::Ping { .. } => "ping",
            Self::DisconnectPlayer { .. } => "disconnectPlayer",
        }
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Control(ControlMessage),
    Relay(RelayMessage),
}

impl InboundMessage {
    /// Decode a text frame.
    pub fn parse(raw: &str) -> Result<Self, SignalError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|_| SignalError::malformed("Invalid JSON format"))?;

        let Value::Object(body) = value else {
            return Err(SignalError::malformed("Message must be a JSON object"));
        };

        let ty = match body.get("type") {
            Some(Value::String(ty)) => ty.clone(),
            Some(_) => return Err(SignalError::malformed("Message type must be a string")),
            None => return Err(SignalError::malformed("Missing message type")),
        };

        if let Some(kind) = RelayKind::from_type(&ty) {
            validator::validate_relay(kind, &body)?;
            return Ok(Self::Relay(RelayMessage { kind, body }));
        }

        if ControlMessage::TYPES.contains(&ty.as_str()) {
            return serde_json::from_value(Value::Object(body))
                .map(Self::Control)
                .map_err(|e| SignalError::malformed(format!("Invalid {ty} message: {e}")));
        }

        Err(SignalError::UnknownMessageType(ty))
    }

    /// Wire name of the message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Control(c) => c.kind(),
            Self::Relay(r) => r.kind.as_str(),
        }
    }
}

/// Messages generated by the relay itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    /// Sent once on connect.
    Config {
        #[serde(rename = "protocolVersion")]
        protocol_version: String,
        #[serde(rename = "peerConnectionOptions")]
        peer_connection_options: Value,
    },
    /// Sent to producers on connect, asking them to announce their id.
    Identify {},
    /// Reply to `endpointId` with the id the relay now knows the producer by.
    EndpointIdConfirm {
        #[serde(rename = "committedId")]
        committed_id: String,
    },
    /// Reply to `ping`.
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        time: Option<i64>,
    },
    /// Reply to `listStreamers`.
    StreamerList { ids: Vec<String> },
    /// A subscribe request could not be honoured.
    SubscribeFailed { message: String },
    /// To a producer: a consumer subscribed.
    PlayerConnected {
        #[serde(rename = "playerId")]
        player_id: String,
        #[serde(rename = "dataChannel")]
        data_channel: bool,
        sfu: bool,
    },
    /// To a producer: a consumer left.
    PlayerDisconnected {
        #[serde(rename = "playerId")]
        player_id: String,
    },
    /// To a consumer: its producer left.
    StreamerDisconnected {},
    /// To a consumer: its producer changed id.
    StreamerIdChanged {
        #[serde(rename = "newID")]
        new_id: String,
    },
    /// To a consumer being evicted by its producer.
    Disconnect { reason: String },
    /// A request from this peer failed.
    Error { error: String },
}

impl From<&SignalError> for OutboundMessage {
    fn from(err: &SignalError) -> Self {
        Self::Error {
            error: err.to_string(),
        }
    }
}
