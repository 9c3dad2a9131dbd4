//! Authoritative arena simulation

pub mod arena;
pub mod combat;
pub mod math;
pub mod pickups;
pub mod round;
pub mod service;
pub mod snapshot;
pub mod store;

pub use arena::{Arena, Effect};
pub use service::{ArenaCommand, ArenaHandle, ArenaService, ArenaStatus};
