//! Client protocol: framing, typed events, and error replies.

pub mod codec;
pub mod errors;
pub mod events;

pub use codec::{Envelope, InboundFrame, ProgressReport, Status, decode, encode};
pub use errors::{DecodeError, ProtocolError};
pub use events::{AuthPayload, ClientEvent, PositionPayload, WaypointPayload};
