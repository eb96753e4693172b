//! # trek-agent
//!
//! Trek server binary: loads settings, starts logging, serves the guidance
//! endpoints, and shuts down on Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use trek_core::{LogFormat, init_subscriber};
use trek_server::{ServerConfig, ServerContext, TrekServer};
use trek_settings::{TrekSettings, load_settings_from_path, settings_path};

/// Trek guidance server.
#[derive(Parser, Debug)]
#[command(name = "trek-agent", about = "Trek guided-hike WebSocket server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.trek/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,

    /// HS256 secret; enables JWT verification.
    #[arg(long)]
    jwt_secret: Option<String>,
}

impl Cli {
    /// Apply flags over loaded settings.
    fn apply(&self, settings: &mut TrekSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        if let Some(secret) = &self.jwt_secret {
            settings.auth.jwt_secret = Some(secret.clone());
        }
    }
}

fn load(cli: &Cli) -> Result<TrekSettings> {
    let path = cli.config.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings after CLI overrides")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );

    let ctx = Arc::new(ServerContext::from_settings(&settings.auth));
    let server = TrekServer::new(ServerConfig::from(&settings), ctx);
    let handle = server.listen().await.context("Failed to start server")?;

    tracing::info!("Trek listening on http://{}", handle.addr());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let report = handle.shutdown(None).await;
    if !report.is_clean() {
        tracing::warn!(aborted = ?report.aborted, "Some tasks were aborted");
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["trek-agent"]);
        let mut settings = TrekSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.logging.level, "info");
        assert!(!settings.logging.json);
        assert!(settings.auth.jwt_secret.is_none());
    }

    #[test]
    fn cli_flags_override_settings() {
        let cli = Cli::parse_from([
            "trek-agent",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--log-level",
            "debug",
            "--json-logs",
            "--jwt-secret",
            "s3cret",
        ]);
        let mut settings = TrekSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
        assert_eq!(settings.auth.jwt_secret.as_deref(), Some("s3cret"));
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["trek-agent", "--config", "/tmp/trek.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/trek.json")));
    }

    #[test]
    fn load_reads_config_file_then_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server": {{"port": 7000, "host": "127.0.0.1"}}}}"#).unwrap();
        let path = file.path().to_string_lossy().to_string();

        let cli = Cli::parse_from(["trek-agent", "--config", path.as_str()]);
        let settings = load(&cli).unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");

        let cli = Cli::parse_from(["trek-agent", "--config", path.as_str(), "--port", "7001"]);
        let settings = load(&cli).unwrap();
        assert_eq!(settings.server.port, 7001);
    }

    #[test]
    fn load_rejects_bad_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{broken").unwrap();
        let path = file.path().to_string_lossy().to_string();
        let cli = Cli::parse_from(["trek-agent", "--config", path.as_str()]);
        let err = load(&cli).unwrap_err();
        assert!(err.to_string().contains("Failed to load settings"));
    }
}
