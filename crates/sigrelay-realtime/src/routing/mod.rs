//! Message routing between signalling peers.

pub mod engine;
pub mod policy;
