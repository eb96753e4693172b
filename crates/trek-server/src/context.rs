//! Shared dependencies handed to every connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use trek_core::{Authenticator, JwtAuthenticator, MockAuthenticator, ProgressOracle, RandomOracle};
use trek_settings::AuthSettings;

use crate::store::SessionStore;

/// Store, authenticator and oracle shared by handlers and background tasks.
pub struct ServerContext {
    /// Session registry.
    pub store: Arc<SessionStore>,
    /// Credential verifier.
    pub authenticator: Arc<dyn Authenticator>,
    /// Progress computation.
    pub oracle: Arc<dyn ProgressOracle>,
    connections: AtomicUsize,
}

impl ServerContext {
    /// Context with an empty store.
    pub fn new(authenticator: Arc<dyn Authenticator>, oracle: Arc<dyn ProgressOracle>) -> Self {
        Self {
            store: Arc::new(SessionStore::new()),
            authenticator,
            oracle,
            connections: AtomicUsize::new(0),
        }
    }

    /// Context wired from settings with the random oracle.
    pub fn from_settings(auth: &AuthSettings) -> Self {
        Self::new(authenticator_for(auth), Arc::new(RandomOracle::new()))
    }

    /// Count a connection until the guard drops.
    pub fn track_connection(&self) -> ConnectionGuard<'_> {
        let _ = self.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            counter: &self.connections,
        }
    }

    /// Open sockets on any endpoint.
    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}

/// Decrements the connection count on drop.
#[derive(Debug)]
pub struct ConnectionGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        let _ = self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

/// JWT verification when a secret is configured, mock otherwise.
pub fn authenticator_for(auth: &AuthSettings) -> Arc<dyn Authenticator> {
    match auth.jwt_secret.as_deref() {
        Some(secret) if !secret.is_empty() => {
            tracing::info!("JWT authentication enabled");
            Arc::new(JwtAuthenticator::new(secret))
        }
        _ => {
            tracing::warn!("no JWT secret configured, accepting every credential");
            Arc::new(MockAuthenticator)
        }
    }
}
