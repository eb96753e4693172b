//! `/status` endpoint.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::endpoint::EndpointRouter;

/// Status response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Always `"running"`.
    pub status: String,
    /// Endpoint name to WebSocket URL.
    pub endpoints: BTreeMap<String, String>,
    /// Socket counters.
    pub connections: ConnectionCounts,
    /// Session counters.
    pub sessions: SessionCounts,
    /// Seconds since the server started.
    pub uptime_secs: u64,
}

/// Open sockets.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConnectionCounts {
    /// Sockets on every endpoint.
    pub total: usize,
}

/// Authenticated sessions.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionCounts {
    /// All sessions.
    pub total: usize,
    /// Sessions currently guiding.
    pub guiding: usize,
}

/// Build a status response. `authority` is the `host:port` clients use.
pub fn status(
    start_time: Instant,
    authority: &str,
    endpoints: &EndpointRouter,
    connections: usize,
    sessions: SessionCounts,
) -> StatusResponse {
    StatusResponse {
        status: "running".into(),
        endpoints: endpoints
            .iter()
            .map(|e| (e.name.clone(), format!("ws://{authority}{}", e.path)))
            .collect(),
        connections: ConnectionCounts { total: connections },
        sessions,
        uptime_secs: start_time.elapsed().as_secs(),
    }
}
