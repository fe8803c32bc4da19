//! Session credentials for one connection attempt.
//!
//! DESIGN
//! ======
//! A `Session` is immutable once built: port, secret and the derived
//! Authorization value travel together. The `SessionStore` swaps whole
//! `Arc<Session>` values, so readers always observe a consistent triple
//! and never a half-updated combination.

use std::fmt::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no free local port: {0}")]
    PortUnavailable(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub port: u16,
    pub secret: String,
    /// Full `Authorization` header value, e.g. `Basic cmlvdDp...`.
    pub auth_token: String,
}

impl Session {
    #[must_use]
    pub fn new(principal: &str, port: u16, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        let auth_token = auth_header(principal, &secret);
        Self { port, secret, auth_token }
    }
}

/// `Basic base64(principal:secret)`.
#[must_use]
pub fn auth_header(principal: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{principal}:{secret}")))
}

fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a random 16-byte hex secret for a new attempt.
#[must_use]
pub fn generate_secret() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Find a free loopback port by binding port 0 and releasing it, then
/// waiting `release_delay` so the OS fully frees the socket before the
/// helper binds it.
///
/// # Errors
///
/// Returns an error if no ephemeral port can be bound.
pub async fn find_free_port(release_delay: Duration) -> Result<u16, SessionError> {
    let port = {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))).await?;
        listener.local_addr()?.port()
    };
    debug!(port, "session: probed free port");
    tokio::time::sleep(release_delay).await;
    Ok(port)
}

// =============================================================================
// SESSION STORE
// =============================================================================

/// The single active session slot. Written only by the connector.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<Arc<Session>>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<Session>> {
        match self.inner.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, session: Arc<Session>) {
        match self.inner.write() {
            Ok(mut slot) => *slot = Some(session),
            Err(poisoned) => *poisoned.into_inner() = Some(session),
        }
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
