//! Signalling wire messages and their validation.

pub mod types;
pub mod validator;

pub use types::{ControlMessage, InboundMessage, OutboundMessage, RelayKind, RelayMessage};
