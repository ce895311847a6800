//! Which roles may issue which message kinds.

use crate::connection::handle::PeerRole;
use crate::error::SignalError;
use crate::message::types::{ControlMessage, InboundMessage};

/// Checks that `role` may send `msg`.
///
/// Relay kinds, `ping` and `listStreamers` are open to every role.
/// Producer controls need a streamer namespace entry, consumer controls a
/// player namespace entry. SFUs hold both.
pub fn check_permitted(role: PeerRole, msg: &InboundMessage) -> Result<(), SignalError> {
    let allowed = match msg {
        InboundMessage::Relay(_) => true,
        InboundMessage::Control(control) => match control {
            ControlMessage::Ping { .. } | ControlMessage::ListStreamers {} => true,
            ControlMessage::RegisterStreamer { .. }
            | ControlMessage::EndpointId { .. }
            | ControlMessage::StartStreaming {}
            | ControlMessage::StopStreaming {}
            | ControlMessage::DisconnectPlayer { .. } => role.is_producer(),
            ControlMessage::Subscribe { .. }
            | ControlMessage::RegisterPlayer { .. }
            | ControlMessage::Unsubscribe {} => role.is_consumer(),
        },
    };

    if allowed {
        Ok(())
    } else {
        Err(SignalError::NotPermitted {
            kind: msg.kind().to_string(),
            role,
        })
    }
}
