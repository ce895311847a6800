//! # sigrelay-api
//!
//! HTTP layer for the signalling relay built on Axum.
//!
//! Terminates peer WebSockets and hands every frame to the signalling
//! engine, and serves health endpoints with CORS and request tracing.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;
