//! Periodic keep-alive push to guiding sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::Envelope;
use crate::store::SessionStore;

/// Sends `keep-alive` frames to every guiding session on a fixed period.
#[derive(Debug, Clone)]
pub struct KeepAliveBroadcaster {
    store: Arc<SessionStore>,
    interval: Duration,
}

impl KeepAliveBroadcaster {
    /// Broadcaster over `store`.
    pub fn new(store: Arc<SessionStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Broadcast period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Send one round. Returns the number of frames queued.
    ///
    /// A failed send is logged and the round continues.
    pub fn tick(&self) -> usize {
        let frame = Arc::new(Envelope::keep_alive().to_json());
        let mut delivered = 0;
        for (subject, connection) in self.store.guiding_targets() {
            match connection.send(Arc::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    subject_id = %subject,
                    connection_id = %connection.id(),
                    error = %e,
                    "keep-alive send failed"
                ),
            }
        }
        debug!(delivered, "keep-alive round");
        delivered
    }

    /// Run until `cancel` fires. The first round happens one period after
    /// spawning.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let _ = ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = self.tick();
                    }
                    () = cancel.cancelled() => {
                        info!("keep-alive broadcaster stopped");
                        return;
                    }
                }
            }
        })
    }
}
