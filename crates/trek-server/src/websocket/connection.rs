//! Outbound half of a client socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use trek_core::ConnectionId;

use crate::protocol::Envelope;

/// Why a frame could not be queued.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The socket has closed or is closing.
    #[error("connection closed")]
    Closed,
    /// The writer has fallen behind and the queue is full.
    #[error("send queue full")]
    QueueFull,
}

/// Push handle for one connected client.
///
/// Frames go onto a bounded channel drained by the socket writer task, so
/// sending never blocks and never holds a lock across I/O.
#[derive(Debug)]
pub struct ClientConnection {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    open: AtomicBool,
    connected_at: Instant,
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Wrap the sending side of a writer channel.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            open: AtomicBool::new(true),
            connected_at: Instant::now(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Whether frames can still be delivered.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    /// Stop accepting frames. Idempotent.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    /// Queue a pre-encoded text frame.
    pub fn send(&self, frame: Arc<String>) -> Result<(), TransportError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => {
                self.close();
                Err(TransportError::Closed)
            }
        }
    }

    /// Encode and queue an envelope.
    pub fn send_envelope(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.send(Arc::new(envelope.to_json()))
    }

    /// Frames dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Time since the socket was accepted.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
