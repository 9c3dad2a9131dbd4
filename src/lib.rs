//! Arena server - authoritative multiplayer arena with round-based rewards
//!
//! Server side: a single arena task owns all game state and is fed by
//! WebSocket sessions and timers. Client side: the `client` module holds the
//! transport-agnostic logic a browser or native client runs each frame
//! (interpolation, send throttling, prediction, collision, reconnection).

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod settlement;
pub mod util;
pub mod ws;
