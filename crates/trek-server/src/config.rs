//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use trek_settings::TrekSettings;

use crate::endpoint::Endpoint;

/// Runtime configuration of the Trek server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Outbound frames buffered per connection.
    pub send_queue_capacity: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Keep-alive broadcast period in milliseconds.
    pub keep_alive_interval_ms: u64,
    /// Delay before the welcome frame in milliseconds.
    pub welcome_delay_ms: u64,
    /// Served endpoints.
    pub endpoints: Vec<Endpoint>,
}

impl ServerConfig {
    /// Bind address as `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Keep-alive broadcast period.
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    /// Delay before the welcome frame.
    pub fn welcome_delay(&self) -> Duration {
        Duration::from_millis(self.welcome_delay_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&TrekSettings::default())
    }
}

impl From<&TrekSettings> for ServerConfig {
    fn from(settings: &TrekSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            send_queue_capacity: settings.server.send_queue_capacity,
            max_message_size: settings.server.max_message_size,
            keep_alive_interval_ms: settings.session.keep_alive_interval_ms,
            welcome_delay_ms: settings.session.welcome_delay_ms,
            endpoints: settings.endpoints.iter().map(Endpoint::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_settings() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.keep_alive_interval(), Duration::from_secs(5));
        assert_eq!(cfg.welcome_delay(), Duration::from_millis(100));
        assert_eq!(cfg.endpoints.len(), 2);
    }

    #[test]
    fn built_from_custom_settings() {
        let mut settings = TrekSettings::default();
        settings.server.port = 0;
        settings.server.host = "127.0.0.1".into();
        settings.session.keep_alive_interval_ms = 250;
        settings.endpoints.truncate(1);
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:0");
        assert_eq!(cfg.keep_alive_interval(), Duration::from_millis(250));
        assert_eq!(cfg.endpoints, vec![Endpoint::new("travel", "/travel", false)]);
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_value(ServerConfig::default()).unwrap();
        assert_eq!(json["keepAliveIntervalMs"], 5000);
        assert_eq!(json["endpoints"][1]["requiresCourseId"], true);
    }
}
