//! Collaborator interfaces for the presence engine
//!
//! This crate defines the seam between the engine and the outside world:
//! the voice gateway (join, leave, occupants, presence notifications,
//! keep-alive frames) and the wall clock. It contains no vendor transport
//! code itself; `MockGateway` doubles as the loopback adapter.

mod clock;
mod handle;
mod mock;
mod traits;

pub use clock::*;
pub use handle::*;
pub use mock::*;
pub use traits::*;
