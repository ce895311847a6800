//! # sigrelay-core
//!
//! Core crate for the signalling relay. Contains configuration schemas
//! and the unified error system.
//!
//! This crate has **no** internal dependencies on other sigrelay crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
