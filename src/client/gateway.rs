//! Connection gateway: authenticated HTTPS requests to the Client.
//!
//! DESIGN
//! ======
//! Every request targets `127.0.0.1:{port}` of the active session and
//! carries its Authorization header. `build_request` returns `None` when no
//! session is active so callers can map that to their own failure. The
//! health check addresses a *pending* session explicitly (port + token)
//! because it runs before the session is promoted.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures surface as `GatewayError::Transport`. Non-success
//! statuses are only errors for the typed helpers (`get_json`); raw
//! requests hand the response back so the proxy can relay it verbatim.

use std::sync::Arc;

use axum::http::Method;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::session::SessionStore;
use crate::config::UpstreamConfig;

/// Low-risk endpoint the helper answers as soon as it is up.
pub const HEALTH_PATH: &str = "/riotclient/app-name";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no active client session")]
    NotConnected,

    #[error("client request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("client returned status {status}")]
    Status { status: u16, body: String },

    #[error("client response was not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("HTTP client build failed: {0}")]
    Build(String),
}

// =============================================================================
// METHODS
// =============================================================================

/// HTTP methods the Client's API accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl ClientMethod {
    /// Map an inbound method; `None` for anything the Client does not take.
    #[must_use]
    pub fn from_http(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Self::Get),
            Method::POST => Some(Self::Post),
            Method::PUT => Some(Self::Put),
            Method::DELETE => Some(Self::Delete),
            Method::PATCH => Some(Self::Patch),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_http(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
            Self::Put => Method::PUT,
            Self::Delete => Method::DELETE,
            Self::Patch => Method::PATCH,
        }
    }

    /// DELETE carries a body too: the Client's API requires it.
    #[must_use]
    pub fn has_body(self) -> bool {
        !matches!(self, Self::Get)
    }
}

// =============================================================================
// GATEWAY
// =============================================================================

pub struct ConnectionGateway {
    http: reqwest::Client,
    sessions: SessionStore,
    config: UpstreamConfig,
}

impl ConnectionGateway {
    /// Build the gateway. With `config.secure` the client trusts only the
    /// loopback verifier in `tls`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(
        tls: Option<Arc<rustls::ClientConfig>>,
        sessions: SessionStore,
        config: UpstreamConfig,
    ) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout);
        if let Some(tls) = tls {
            builder = builder.use_preconfigured_tls((*tls).clone());
        }
        let http = builder.build().map_err(|e| GatewayError::Build(e.to_string()))?;
        Ok(Self { http, sessions, config })
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn url(&self, port: u16, path: &str) -> String {
        format!("{}://127.0.0.1:{port}{path}", self.config.http_scheme())
    }

    fn request_to(
        &self,
        port: u16,
        auth_token: &str,
        method: ClientMethod,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method.as_http(), self.url(port, path))
            .header(reqwest::header::AUTHORIZATION, auth_token)
            .header(reqwest::header::ACCEPT, "application/json");
        if method.has_body() {
            if let Some(body) = body {
                req = req.header(reqwest::header::CONTENT_TYPE, "application/json").body(body);
            }
        }
        req
    }

    /// Build a request against the active session. `None` without one.
    #[must_use]
    pub fn build_request(
        &self,
        method: ClientMethod,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Option<reqwest::RequestBuilder> {
        let session = self.sessions.snapshot()?;
        Some(self.request_to(session.port, &session.auth_token, method, path, body))
    }

    /// Send a request against the active session.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` without a session, or `Transport` on failure.
    pub async fn send(
        &self,
        method: ClientMethod,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, GatewayError> {
        let req = self.build_request(method, path, body).ok_or(GatewayError::NotConnected)?;
        Ok(req.send().await?)
    }

    /// Send a JSON body and require a 2xx answer.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn send_json(&self, method: ClientMethod, path: &str, body: &Value) -> Result<u16, GatewayError> {
        let response = self.send(method, path, Some(serde_json::to_vec(body)?)).await?;
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(GatewayError::Status { status: status.as_u16(), body })
        }
    }

    /// GET `path` and parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or a
    /// body that is not JSON.
    pub async fn get_json(&self, path: &str) -> Result<Value, GatewayError> {
        let response = self.send(ClientMethod::Get, path, None).await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Status { status: status.as_u16(), body: text });
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Poll the health endpoint of a pending session. The first attempt goes
    /// out immediately; later ones wait `health_backoff` so a cold-starting
    /// helper has time to bind its port.
    pub async fn health_check(&self, port: u16, auth_token: &str) -> bool {
        let attempts = self.config.health_attempts.max(1);
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(self.config.health_backoff).await;
            }
            match self.request_to(port, auth_token, ClientMethod::Get, HEALTH_PATH, None).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(port, attempt, "gateway: health check passed");
                    return true;
                }
                Ok(response) => {
                    debug!(port, attempt, status = response.status().as_u16(), "gateway: health check rejected");
                }
                Err(e) => {
                    debug!(port, attempt, error = %e, "gateway: health check unreachable");
                }
            }
        }
        warn!(port, attempts, "gateway: health check failed");
        false
    }
}

#[cfg(test)]
#[path = "gateway_test.rs"]
mod tests;
