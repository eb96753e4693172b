//! WebSocket endpoints and path resolution.

use serde::{Deserialize, Serialize};
use trek_settings::EndpointSettings;

/// One accepted WebSocket path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Name used in logs, welcome frames and error messages.
    pub name: String,
    /// Request path, leading slash included.
    pub path: String,
    /// Whether `start` and `current-position` must carry a `courseId`.
    pub requires_course_id: bool,
}

impl Endpoint {
    /// Build an endpoint.
    pub fn new(name: impl Into<String>, path: impl Into<String>, requires_course_id: bool) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            requires_course_id,
        }
    }
}

impl From<&EndpointSettings> for Endpoint {
    fn from(settings: &EndpointSettings) -> Self {
        Self::new(&settings.name, &settings.path, settings.requires_course_id)
    }
}

/// Exact-match lookup from request path to endpoint.
#[derive(Clone, Debug, Default)]
pub struct EndpointRouter {
    endpoints: Vec<Endpoint>,
}

impl EndpointRouter {
    /// Router over `endpoints`.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    /// Endpoint serving `path`. Query strings must already be stripped.
    pub fn resolve(&self, path: &str) -> Option<&Endpoint> {
        self.endpoints.iter().find(|e| e.path == path)
    }

    /// All endpoints in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether no endpoint is configured.
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
