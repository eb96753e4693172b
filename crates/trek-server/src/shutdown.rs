//! Graceful shutdown of the listener and keep-alive tasks.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long background tasks get to finish before they are aborted.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// A background task owned by the server, named for shutdown logs.
#[derive(Debug)]
pub struct ServerTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl ServerTask {
    /// Wrap a spawned task.
    pub fn new(name: &'static str, handle: JoinHandle<()>) -> Self {
        Self { name, handle }
    }

    /// Task name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Outcome of [`ShutdownCoordinator::graceful_shutdown`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that returned on their own after cancellation.
    pub stopped: Vec<&'static str>,
    /// Tasks still running at the deadline.
    pub aborted: Vec<&'static str>,
}

impl ShutdownReport {
    /// Whether every task stopped before the deadline.
    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty()
    }
}

/// Signals the listener and the keep-alive task to stop.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator with a fresh token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle observed by a background task.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the token. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel, then give `tasks` a shared deadline of `timeout`. A task
    /// still running at the deadline is aborted.
    pub async fn graceful_shutdown(&self, tasks: Vec<ServerTask>, timeout: Option<Duration>) -> ShutdownReport {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        info!(tasks = tasks.len(), timeout_ms = timeout.as_millis(), "shutting down");

        let deadline = Instant::now() + timeout;
        let mut report = ShutdownReport::default();
        for ServerTask { name, mut handle } in tasks {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {
                    debug!(task = name, "task stopped");
                    report.stopped.push(name);
                }
                Ok(Err(e)) => {
                    warn!(task = name, error = %e, "task ended abnormally");
                    report.stopped.push(name);
                }
                Err(_) => {
                    warn!(task = name, ?timeout, "task did not stop in time, aborting");
                    handle.abort();
                    report.aborted.push(name);
                }
            }
        }
        report
    }
}
