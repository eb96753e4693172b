//! # trek-server
//!
//! Axum server for guided-hike progress tracking over WebSocket.
//!
//! - **Protocol**: `{event, data}` frames decoded into typed [`ClientEvent`]s
//! - **Handler**: per-connection state machine ([`ConnectionHandler`])
//! - **Store**: concurrent subject-keyed [`SessionStore`]
//! - **Keep-alive**: periodic push to guiding sessions
//! - **Routing**: configured endpoints, `/status`, and invalid-path rejection

#![deny(unsafe_code)]

pub mod config;
pub mod context;
pub mod endpoint;
pub mod health;
pub mod protocol;
pub mod server;
pub mod shutdown;
pub mod store;
pub mod websocket;

pub use config::ServerConfig;
pub use context::{ServerContext, authenticator_for};
pub use endpoint::{Endpoint, EndpointRouter};
pub use protocol::{ClientEvent, Envelope, ProtocolError};
pub use server::{ServerError, ServerHandle, TrekServer};
pub use store::{GuidancePhase, Session, SessionSnapshot, SessionStore};
pub use websocket::handler::ConnectionHandler;
