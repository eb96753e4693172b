//! Wire framing: inbound `{event, data}` frames and outbound envelopes.
//!
//! Replies are `{event, data, status: "success"}`, failures are
//! `{event: "error", message}`. Server pushes (`welcome`, `keep-alive`,
//! `pong`) carry a millisecond `timestamp`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::error;
use trek_core::ProgressUpdate;

use super::errors::{DecodeError, ProtocolError};

/// A decoded but not yet dispatched client frame.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct InboundFrame {
    /// Event name.
    pub event: String,
    /// Raw payload. `null` when absent.
    #[serde(default)]
    pub data: Value,
}

/// Parse one text frame.
pub fn decode(raw: &str) -> Result<InboundFrame, DecodeError> {
    serde_json::from_str(raw).map_err(DecodeError::Malformed)
}

/// Encode a reply frame.
pub fn encode(event: &str, data: Value, status: Status) -> String {
    Envelope {
        status: Some(status),
        data: Some(data),
        ..Envelope::bare(event)
    }
    .to_json()
}

/// Reply status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Request handled.
    Success,
    /// Request refused.
    Error,
}

/// Outbound frame. Absent fields are omitted from the JSON.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Event name.
    pub event: String,
    /// Payload. `Some(Value::Null)` serializes as `null`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Reply status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Connection the frame was pushed to (welcome only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    /// Unix time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Envelope {
    fn bare(event: &str) -> Self {
        Self {
            event: event.to_string(),
            data: None,
            status: None,
            message: None,
            connection_id: None,
            timestamp: None,
        }
    }

    /// Successful reply to `event`.
    pub fn success(event: &str, data: Value) -> Self {
        Self {
            data: Some(data),
            status: Some(Status::Success),
            ..Self::bare(event)
        }
    }

    /// Successful reply carrying a progress report.
    pub fn progress(event: &str, report: &ProgressReport) -> Self {
        Self::success(event, report.to_value())
    }

    /// Error reply.
    pub fn error(err: &ProtocolError) -> Self {
        Self {
            status: Some(Status::Error),
            message: Some(err.to_string()),
            ..Self::bare("error")
        }
    }

    /// Greeting pushed shortly after the socket opens.
    pub fn welcome(endpoint_name: &str, connection_id: &str) -> Self {
        Self {
            message: Some(format!("Connected to {endpoint_name} WebSocket")),
            connection_id: Some(connection_id.to_string()),
            timestamp: Some(now_millis()),
            ..Self::bare("welcome")
        }
    }

    /// Reply to `ping`.
    pub fn pong() -> Self {
        Self {
            timestamp: Some(now_millis()),
            ..Self::bare("pong")
        }
    }

    /// Periodic push to guiding sessions.
    pub fn keep_alive() -> Self {
        Self {
            message: Some("Connection alive".to_string()),
            timestamp: Some(now_millis()),
            ..Self::bare("keep-alive")
        }
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            error!(error = %e, event = %self.event, "failed to serialize envelope");
            String::new()
        })
    }
}

/// Progress payload of `start`, `current-position`, `pause`, `restart`
/// and `end` replies.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    /// Current waypoint index.
    pub index: u32,
    /// Whether the final waypoint has been reached.
    pub is_arrived: bool,
    /// Whether the last position was off course.
    pub is_deviation: bool,
    /// Distance travelled, rounded to one decimal.
    pub travel_distance: f64,
}

impl ProgressReport {
    /// Report for a freshly started session.
    pub fn initial() -> Self {
        Self {
            index: 0,
            is_arrived: false,
            is_deviation: false,
            travel_distance: 0.0,
        }
    }

    /// Report of stored progress for `pause`, `restart` and `end`.
    ///
    /// Arrival and deviation are only reported by `current-position`.
    pub fn snapshot(index: u32, distance_km: f64) -> Self {
        Self {
            index,
            is_arrived: false,
            is_deviation: false,
            travel_distance: round_tenth(distance_km),
        }
    }

    /// Report of an applied oracle update.
    pub fn from_update(update: &ProgressUpdate) -> Self {
        Self {
            index: update.new_index,
            is_arrived: update.is_arrived,
            is_deviation: update.is_deviation,
            travel_distance: round_tenth(update.new_distance_km),
        }
    }

    /// JSON object form.
    pub fn to_value(&self) -> Value {
        json!({
            "index": self.index,
            "isArrived": self.is_arrived,
            "isDeviation": self.is_deviation,
            "travelDistance": self.travel_distance,
        })
    }
}

/// Round to one decimal place for display.
pub fn round_tenth(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
