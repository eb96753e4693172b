//! Protocol error taxonomy.
//!
//! The `Display` text of [`ProtocolError`] is exactly the `message` sent to
//! the client in an `error` envelope.

use thiserror::Error;
use trek_core::AuthError;

/// An inbound frame that could not be turned into a typed event.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not JSON, or missing a string `event` field.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    /// Known event with a payload of the wrong shape.
    #[error("invalid {event} payload: {source}")]
    InvalidPayload {
        /// Event whose payload failed to parse.
        event: String,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
}

/// A request the state machine refuses. Never closes the connection.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame could not be decoded.
    #[error("Invalid message format")]
    Decode(#[from] DecodeError),
    /// The event name is not in the dispatch table.
    #[error("Unknown event: {0}")]
    UnknownEvent(String),
    /// The event needs an authenticated connection.
    #[error("Authentication required")]
    AuthenticationRequired,
    /// The credential was rejected.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(#[from] AuthError),
    /// The endpoint requires `courseId` and none was given.
    #[error("courseId is required for {endpoint} endpoint")]
    CourseIdRequired {
        /// Endpoint name.
        endpoint: String,
    },
    /// Position or resume before `start`.
    #[error("Start hiking first")]
    NotStarted,
    /// No session owned by this connection.
    #[error("Session not found")]
    SessionNotFound,
}

impl ProtocolError {
    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::UnknownEvent(_) => "unknown_event",
            Self::AuthenticationRequired => "authentication_required",
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::CourseIdRequired { .. } => "course_id_required",
            Self::NotStarted => "not_started",
            Self::SessionNotFound => "session_not_found",
        }
    }
}
