//! Message validation rules.

use serde_json::{Map, Value};

use crate::error::SignalError;

use super::types::RelayKind;

/// Rejects frames that are empty or larger than `max_bytes`.
pub fn validate_frame(raw: &str, max_bytes: usize) -> Result<(), SignalError> {
    if raw.len() > max_bytes {
        return Err(SignalError::malformed(format!(
            "Message exceeds maximum size of {max_bytes} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(SignalError::malformed("Empty message"));
    }

    Ok(())
}

/// Checks the minimal shape the receiving peer relies on.
///
/// SDP and candidate contents are not inspected.
pub fn validate_relay(kind: RelayKind, body: &Map<String, Value>) -> Result<(), SignalError> {
    match kind {
        RelayKind::Offer | RelayKind::Answer => {
            if !body.get("sdp").is_some_and(Value::is_string) {
                return Err(SignalError::malformed(format!(
                    "{} requires a string sdp field",
                    kind.as_str()
                )));
            }
        }
        RelayKind::IceCandidate => validate_candidate(body.get("candidate"))?,
        _ => {}
    }

    if body.get("to").is_some_and(|to| !to.is_string()) {
        return Err(SignalError::malformed("to must be a string"));
    }

    Ok(())
}

fn validate_candidate(candidate: Option<&Value>) -> Result<(), SignalError> {
    let Some(Value::Object(candidate)) = candidate else {
        return Err(SignalError::malformed(
            "iceCandidate requires a candidate object",
        ));
    };

    if !candidate.get("candidate").is_some_and(Value::is_string) {
        return Err(SignalError::malformed(
            "candidate.candidate must be a string",
        ));
    }

    match candidate.get("sdpMid") {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(_) => return Err(SignalError::malformed("candidate.sdpMid must be a string")),
    }

    match candidate.get("sdpMLineIndex") {
        None | Some(Value::Null) => {}
        Some(v) if v.is_u64() => {}
        Some(_) => {
            return Err(SignalError::malformed(
                "candidate.sdpMLineIndex must be a non-negative integer",
            ));
        }
    }

    Ok(())
}
