//! Client core: everything a client runs per frame, independent of the
//! rendering engine and of how the socket is opened.

pub mod collision;
pub mod connection;
pub mod interpolation;
pub mod missiles;
pub mod prediction;
pub mod session;
pub mod throttle;

pub use session::{ClientEvent, ClientSession, FrameOutput, SessionConfig};
