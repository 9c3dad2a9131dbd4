//! WebSocket transport: wire protocol, upgrade handler and connection registry

pub mod handler;
pub mod protocol;
pub mod registry;
