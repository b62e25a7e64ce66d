//! Presence engine for presenced
//!
//! Keeps an automated account present in a shared voice resource while
//! nobody else is using it:
//! - Clock gate (is the indefinite-retention window open?)
//! - Occupancy guard and optimistic acquisition with retries
//! - Presence state machine (Idle, Connected, BusyWait, ManualOverride)
//! - Keep-alive emission while a session is held
//! - Event relay and the single-consumer control loop

mod acquire;
mod driver;
mod engine;
mod error;
mod events;
mod gate;
mod keepalive;
mod occupancy;
mod relay;
mod session;

pub use acquire::*;
pub use driver::*;
pub use engine::*;
pub use error::*;
pub use events::*;
pub use gate::*;
pub use keepalive::*;
pub use occupancy::*;
pub use relay::*;
pub use session::*;
