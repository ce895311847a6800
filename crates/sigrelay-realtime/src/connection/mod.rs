//! Connection lifecycle: handles, handshake attributes, the session
//! registry and the manager that drives them.

pub mod attributes;
pub mod handle;
pub mod manager;
pub mod registry;
