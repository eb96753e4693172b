//! Typed client events.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use trek_core::{Coordinate, CourseId};

use super::codec::InboundFrame;
use super::errors::DecodeError;

/// `auth-user` payload.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    /// Bearer token or raw credential.
    #[serde(default)]
    pub authorization: Option<String>,
}

/// `start` and `current-position` payload.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionPayload {
    /// Reported position.
    pub coordinate: Coordinate,
    /// Client clock, epoch milliseconds.
    #[serde(default)]
    pub time: Option<i64>,
    /// Course the client is following.
    #[serde(default)]
    pub course_id: Option<CourseId>,
}

impl PositionPayload {
    /// The course id, if one was supplied and non-empty.
    pub fn course_id(&self) -> Option<&CourseId> {
        self.course_id.as_ref().filter(|c| c.is_present())
    }
}

/// `pause`, `restart` and `end` payload.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WaypointPayload {
    /// Position at the time of the request.
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
    /// Client clock, epoch milliseconds.
    #[serde(default)]
    pub time: Option<i64>,
}

/// Every event a client may send.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// `auth-user`
    AuthUser(AuthPayload),
    /// `start`
    Start(PositionPayload),
    /// `current-position`
    CurrentPosition(PositionPayload),
    /// `pause`
    Pause(WaypointPayload),
    /// `restart`
    Restart(WaypointPayload),
    /// `end`
    End(WaypointPayload),
    /// `ping`
    Ping,
    /// Anything else, by name.
    Unknown(String),
}

impl ClientEvent {
    /// Type the payload of a decoded frame.
    pub fn from_frame(frame: InboundFrame) -> Result<Self, DecodeError> {
        let InboundFrame { event, data } = frame;
        let data = if data.is_null() {
            Value::Object(Map::new())
        } else {
            data
        };
        Ok(match event.as_str() {
            "auth-user" => Self::AuthUser(payload(&event, data)?),
            "start" => Self::Start(payload(&event, data)?),
            "current-position" => Self::CurrentPosition(payload(&event, data)?),
            "pause" => Self::Pause(payload(&event, data)?),
            "restart" => Self::Restart(payload(&event, data)?),
            "end" => Self::End(payload(&event, data)?),
            "ping" => Self::Ping,
            _ => Self::Unknown(event),
        })
    }

    /// Whether the named event is refused before `auth-user` succeeds.
    pub fn requires_auth(name: &str) -> bool {
        matches!(name, "start" | "current-position" | "pause" | "restart" | "end")
    }

    /// Wire name of the event.
    pub fn name(&self) -> &str {
        match self {
            Self::AuthUser(_) => "auth-user",
            Self::Start(_) => "start",
            Self::CurrentPosition(_) => "current-position",
            Self::Pause(_) => "pause",
            Self::Restart(_) => "restart",
            Self::End(_) => "end",
            Self::Ping => "ping",
            Self::Unknown(name) => name,
        }
    }
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, DecodeError> {
    serde_json::from_value(data).map_err(|source| DecodeError::InvalidPayload {
        event: event.to_string(),
        source,
    })
}
