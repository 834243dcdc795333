//! Live API wire protocol and WebSocket transport.

pub mod client;
pub mod protocol;
