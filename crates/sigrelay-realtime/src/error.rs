//! Protocol-level errors raised while handling a single inbound message.
//!
//! None of these close the connection. The gateway turns each one into an
//! `error` reply to the sender.

use thiserror::Error;

use crate::connection::handle::PeerRole;

/// Failure to process one inbound signalling message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The frame was not valid JSON, was not an object, or had the wrong shape.
    #[error("{0}")]
    MalformedMessage(String),
    /// The `type` discriminant is not part of the protocol.
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),
    /// An explicitly addressed target does not exist.
    #[error("Target not found: {0}")]
    TargetNotFound(String),
    /// The sender exceeded its inbound message budget.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    /// The sender's role may not issue this message kind.
    #[error("Message type {kind} is not permitted for role {role}")]
    NotPermitted { kind: String, role: PeerRole },
    /// The streamer already has its maximum number of subscribers.
    #[error("Streamer {0} has reached its subscriber limit")]
    SubscriberLimit(String),
}

impl SignalError {
    /// Shorthand for [`SignalError::MalformedMessage`].
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_text() {
        assert_eq!(SignalError::RateLimitExceeded.to_string(), "Rate limit exceeded");
        assert_eq!(
            SignalError::TargetNotFound("p9".into()).to_string(),
            "Target not found: p9"
        );
        assert_eq!(
            SignalError::UnknownMessageType("bogus".into()).to_string(),
            "Unknown message type: bogus"
        );
        assert_eq!(
            SignalError::NotPermitted {
                kind: "subscribe".into(),
                role: PeerRole::Streamer
            }
            .to_string(),
            "Message type subscribe is not permitted for role streamer"
        );
    }
}
