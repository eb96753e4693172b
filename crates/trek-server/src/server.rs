//! HTTP/WebSocket server: routing, upgrade, and background tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::endpoint::EndpointRouter;
use crate::health::{self, SessionCounts, StatusResponse};
use crate::shutdown::{ServerTask, ShutdownCoordinator, ShutdownReport};
use crate::websocket::keepalive::KeepAliveBroadcaster;
use crate::websocket::session::{SessionOptions, reject_invalid_path, run_ws_session};

/// Listener failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The bound socket has no readable local address.
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// State shared by every route.
#[derive(Clone)]
pub struct AppState {
    ctx: Arc<ServerContext>,
    endpoints: Arc<EndpointRouter>,
    options: SessionOptions,
    max_message_size: usize,
    authority: String,
    start_time: Instant,
}

/// The Trek server.
pub struct TrekServer {
    config: ServerConfig,
    ctx: Arc<ServerContext>,
    endpoints: Arc<EndpointRouter>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl TrekServer {
    /// Server over `ctx` configured by `config`.
    pub fn new(config: ServerConfig, ctx: Arc<ServerContext>) -> Self {
        let endpoints = Arc::new(EndpointRouter::new(config.endpoints.clone()));
        Self {
            config,
            ctx,
            endpoints,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Axum router with every endpoint, `/status`, `/`, and the
    /// invalid-path fallback.
    pub fn router(&self) -> Router {
        let state = AppState {
            ctx: Arc::clone(&self.ctx),
            endpoints: Arc::clone(&self.endpoints),
            options: SessionOptions {
                send_queue_capacity: self.config.send_queue_capacity,
                welcome_delay: self.config.welcome_delay(),
            },
            max_message_size: self.config.max_message_size,
            authority: self.config.bind_addr(),
            start_time: self.start_time,
        };

        let mut router = Router::new()
            .route("/", get(banner))
            .route("/status", get(status_handler));
        for endpoint in self.endpoints.iter() {
            router = router.route(&endpoint.path, get(ws_entry));
        }
        router.fallback(ws_entry).with_state(state)
    }

    /// Bind, then serve in the background and start the keep-alive task.
    pub async fn listen(&self) -> Result<ServerHandle, ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

        let keep_alive = KeepAliveBroadcaster::new(
            Arc::clone(&self.ctx.store),
            self.config.keep_alive_interval(),
        )
        .spawn(self.shutdown.token());

        let router = self.router();
        let token = self.shutdown.token();
        let server = tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %e, "server stopped with error");
            }
        });

        for endpoint in self.endpoints.iter() {
            info!(
                endpoint = %endpoint.name,
                url = %format!("ws://{local_addr}{}", endpoint.path),
                requires_course_id = endpoint.requires_course_id,
                "endpoint ready"
            );
        }
        info!(%local_addr, "trek server listening");

        Ok(ServerHandle {
            addr: local_addr,
            shutdown: Arc::clone(&self.shutdown),
            tasks: vec![
                ServerTask::new("listener", server),
                ServerTask::new("keep-alive", keep_alive),
            ],
        })
    }

    /// Shared context.
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// A running server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
    tasks: Vec<ServerTask>,
}

impl ServerHandle {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, stop the keep-alive task, and wait up to `timeout`.
    pub async fn shutdown(self, timeout: Option<Duration>) -> ShutdownReport {
        let report = self.shutdown.graceful_shutdown(self.tasks, timeout).await;
        info!(
            stopped = ?report.stopped,
            aborted = ?report.aborted,
            "trek server stopped"
        );
        report
    }
}

async fn banner() -> &'static str {
    "Trek guidance WebSocket server"
}

async fn status_handler(State(state): State<AppState>, headers: HeaderMap) -> Json<StatusResponse> {
    let authority = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(state.authority.as_str());
    Json(health::status(
        state.start_time,
        authority,
        &state.endpoints,
        state.ctx.active_connections(),
        SessionCounts {
            total: state.ctx.store.len(),
            guiding: state.ctx.store.guiding_count(),
        },
    ))
}

/// Every endpoint path and the fallback land here.
async fn ws_entry(
    State(state): State<AppState>,
    uri: Uri,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let endpoint = state.endpoints.resolve(uri.path()).cloned();
    match (endpoint, upgrade) {
        (Some(endpoint), Ok(ws)) => {
            let ctx = Arc::clone(&state.ctx);
            let options = state.options;
            ws.max_message_size(state.max_message_size)
                .on_upgrade(move |socket| run_ws_session(socket, endpoint, ctx, options))
        }
        (Some(_), Err(_)) => (
            StatusCode::UPGRADE_REQUIRED,
            Json(json!({
                "message": "Upgrade Required - This endpoint supports WebSocket only",
                "upgrade": "websocket",
            })),
        )
            .into_response(),
        (None, Ok(ws)) => {
            warn!(path = uri.path(), "websocket upgrade on unknown path");
            ws.on_upgrade(reject_invalid_path)
        }
        (None, Err(_)) => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use trek_settings::AuthSettings;

    fn make_server() -> TrekServer {
        let ctx = Arc::new(ServerContext::from_settings(&AuthSettings::default()));
        TrekServer::new(ServerConfig::default(), ctx)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .uri(uri)
            .header(header::HOST, "example.test:8080")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    #[test]
    fn accessors() {
        let server = make_server();
        assert_eq!(server.config().port, 8080);
        assert!(!server.shutdown().is_shutting_down());
        assert!(server.context().store.is_empty());
    }

    #[tokio::test]
    async fn status_reports_endpoints_and_counters() {
        let (status, body) = get_json(make_server().router(), "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert_eq!(body["endpoints"]["travel"], "ws://example.test:8080/travel");
        assert_eq!(
            body["endpoints"]["travel-navigate"],
            "ws://example.test:8080/travel-navigate"
        );
        assert_eq!(body["connections"]["total"], 0);
        assert_eq!(body["sessions"]["total"], 0);
        assert_eq!(body["sessions"]["guiding"], 0);
    }

    #[tokio::test]
    async fn root_serves_banner() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();
        let resp = make_server().router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        assert!(std::str::from_utf8(&body).unwrap().contains("Trek"));
    }

    #[tokio::test]
    async fn plain_get_on_endpoint_requires_upgrade() {
        for path in ["/travel", "/travel-navigate"] {
            let (status, body) = get_json(make_server().router(), path).await;
            assert_eq!(status, StatusCode::UPGRADE_REQUIRED);
            assert_eq!(body["upgrade"], "websocket");
            assert_eq!(
                body["message"],
                "Upgrade Required - This endpoint supports WebSocket only"
            );
        }
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (status, _) = get_json(make_server().router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_and_shutdown() {
        let mut config = ServerConfig::default();
        config.host = "127.0.0.1".into();
        config.port = 0;
        let ctx = Arc::new(ServerContext::from_settings(&AuthSettings::default()));
        let server = TrekServer::new(config, ctx);
        let handle = server.listen().await.unwrap();
        assert_ne!(handle.addr().port(), 0);
        let report = handle.shutdown(Some(Duration::from_secs(2))).await;
        assert!(report.is_clean());
        assert_eq!(report.stopped, vec!["listener", "keep-alive"]);
        assert!(server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = ServerConfig::default();
        config.host = "127.0.0.1".into();
        config.port = taken.local_addr().unwrap().port();
        let ctx = Arc::new(ServerContext::from_settings(&AuthSettings::default()));
        let err = TrekServer::new(config, ctx).listen().await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
