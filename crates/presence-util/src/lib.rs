//! Shared utilities for presenced
//!
//! This crate provides:
//! - ID types (ResourceId, Identity, SessionId)
//! - Time utilities (mock-aware wall clock, retention windows, duration helpers)
//! - Error types
//! - Default paths for config and state directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
