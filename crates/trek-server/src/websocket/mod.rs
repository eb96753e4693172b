//! WebSocket connections, the protocol state machine, and the keep-alive task.

pub mod connection;
pub mod handler;
pub mod keepalive;
pub mod session;
