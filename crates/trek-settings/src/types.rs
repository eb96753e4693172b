//! Settings schema.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object, mirrored by `~/.trek/settings.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrekSettings {
    /// Network listener settings.
    pub server: ServerSettings,
    /// Per-session timing.
    pub session: SessionSettings,
    /// WebSocket endpoints to expose.
    pub endpoints: Vec<EndpointSettings>,
    /// Credential verification.
    pub auth: AuthSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl Default for TrekSettings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            session: SessionSettings::default(),
            endpoints: EndpointSettings::defaults(),
            auth: AuthSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl TrekSettings {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(SettingsError::InvalidValue("no endpoints configured".into()));
        }
        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !endpoint.path.starts_with('/') {
                return Err(SettingsError::InvalidValue(format!(
                    "endpoint path must start with '/': {}",
                    endpoint.path
                )));
            }
            if endpoint.name.is_empty() {
                return Err(SettingsError::InvalidValue(format!(
                    "endpoint at {} has no name",
                    endpoint.path
                )));
            }
            if !seen.insert(endpoint.path.as_str()) {
                return Err(SettingsError::InvalidValue(format!(
                    "duplicate endpoint path: {}",
                    endpoint.path
                )));
            }
        }
        if self.session.keep_alive_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "keepAliveIntervalMs must be positive".into(),
            ));
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "sendQueueCapacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Network listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks a free port).
    pub port: u16,
    /// Outbound frames buffered per connection before sends are dropped.
    pub send_queue_capacity: usize,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            send_queue_capacity: 256,
            max_message_size: 64 * 1024,
        }
    }
}

/// Per-session timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Period of the keep-alive broadcast to guiding sessions.
    pub keep_alive_interval_ms: u64,
    /// Delay between accepting a socket and pushing the welcome frame.
    pub welcome_delay_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            keep_alive_interval_ms: 5_000,
            welcome_delay_ms: 100,
        }
    }
}

/// One WebSocket endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSettings {
    /// Name used in logs, welcome frames and error messages.
    pub name: String,
    /// Request path, including the leading slash.
    pub path: String,
    /// Whether `start` and `current-position` must carry a `courseId`.
    #[serde(default)]
    pub requires_course_id: bool,
}

impl EndpointSettings {
    fn new(name: &str, path: &str, requires_course_id: bool) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            requires_course_id,
        }
    }

    /// The two endpoints served out of the box.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("travel", "/travel", false),
            Self::new("travel-navigate", "/travel-navigate", true),
        ]
    }
}

/// Credential verification.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HS256 secret. When unset every credential is accepted (mock mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
}

/// Log output.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = TrekSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.session.keep_alive_interval_ms, 5_000);
        assert_eq!(settings.session.welcome_delay_ms, 100);
        assert_eq!(settings.endpoints.len(), 2);
        assert!(settings.auth.jwt_secret.is_none());
    }

    #[test]
    fn default_endpoints() {
        let endpoints = EndpointSettings::defaults();
        assert_eq!(endpoints[0].path, "/travel");
        assert!(!endpoints[0].requires_course_id);
        assert_eq!(endpoints[1].path, "/travel-navigate");
        assert!(endpoints[1].requires_course_id);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(TrekSettings::default()).unwrap();
        assert_eq!(json["session"]["keepAliveIntervalMs"], 5_000);
        assert_eq!(json["endpoints"][1]["requiresCourseId"], true);
        assert!(json["auth"].get("jwtSecret").is_none());
    }

    #[test]
    fn empty_endpoints_rejected() {
        let mut settings = TrekSettings::default();
        settings.endpoints.clear();
        assert!(matches!(settings.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn duplicate_path_rejected() {
        let mut settings = TrekSettings::default();
        settings.endpoints[1].path = "/travel".into();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate endpoint path"));
    }

    #[test]
    fn relative_path_rejected() {
        let mut settings = TrekSettings::default();
        settings.endpoints[0].path = "travel".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_keep_alive_rejected() {
        let mut settings = TrekSettings::default();
        settings.session.keep_alive_interval_ms = 0;
        assert!(settings.validate().is_err());
    }
}
