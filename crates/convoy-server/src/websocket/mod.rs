//! Realtime channels: connection state, the hub, inbound frames, and the
//! per-socket session task.

pub mod connection;
pub mod handler;
pub mod hub;
pub mod session;

pub use connection::{ChannelState, ClientConnection};
pub use hub::{PublishMode, RealtimeHub};
