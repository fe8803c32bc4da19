//! Runtime configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Every knob has a default. Unparsable values fall back to the default
//! rather than failing startup, so a stray `.env` entry never prevents the
//! control process from coming up.

use std::time::Duration;

pub const DEFAULT_SERVER_PORT: u16 = 35200;
pub const DEV_SERVER_PORTS: [u16; 2] = [3000, 3001];
pub const DEFAULT_UI_KEEPALIVE_SECS: u64 = 290;
pub const DEFAULT_PRINCIPAL: &str = "riot";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_HEALTH_ATTEMPTS: u32 = 4;
pub const DEFAULT_HEALTH_BACKOFF_MS: u64 = 1000;
pub const DEFAULT_EVENT_CHANNEL: &str = "OnJsonApiEvent";
pub const DEFAULT_EVENT_KEEPALIVE_SECS: u64 = 290;
pub const DEFAULT_SUBSCRIBE_ATTEMPTS: u32 = 6;
pub const DEFAULT_SUBSCRIBE_RETRY_MS: u64 = 100;
pub const DEFAULT_PORT_RELEASE_MS: u64 = 500;
pub const DEFAULT_MAX_HANDSHAKE_FAILURES: u32 = 5;

/// Settings for the inbound Local Server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub dev: bool,
    pub auto_connect: bool,
    pub ui_keepalive: Duration,
}

/// Settings for everything that talks to the Client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub principal: String,
    pub connect_timeout: Duration,
    /// Upper bound on a whole request, response body included.
    pub request_timeout: Duration,
    pub health_attempts: u32,
    pub health_backoff: Duration,
    pub event_channel: String,
    pub event_keepalive: Duration,
    pub subscribe_attempts: u32,
    pub subscribe_retry: Duration,
    pub port_release: Duration,
    pub max_handshake_failures: u32,
    /// `https`/`wss` against the real Client. Plain schemes only exist so
    /// tests can stand up an unencrypted fake.
    pub secure: bool,
}

impl UpstreamConfig {
    #[must_use]
    pub fn http_scheme(&self) -> &'static str {
        if self.secure { "https" } else { "http" }
    }

    #[must_use]
    pub fn ws_scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            principal: DEFAULT_PRINCIPAL.into(),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            health_attempts: DEFAULT_HEALTH_ATTEMPTS,
            health_backoff: Duration::from_millis(DEFAULT_HEALTH_BACKOFF_MS),
            event_channel: DEFAULT_EVENT_CHANNEL.into(),
            event_keepalive: Duration::from_secs(DEFAULT_EVENT_KEEPALIVE_SECS),
            subscribe_attempts: DEFAULT_SUBSCRIBE_ATTEMPTS,
            subscribe_retry: Duration::from_millis(DEFAULT_SUBSCRIBE_RETRY_MS),
            port_release: Duration::from_millis(DEFAULT_PORT_RELEASE_MS),
            max_handshake_failures: DEFAULT_MAX_HANDSHAKE_FAILURES,
            secure: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
}

impl Config {
    /// Build typed config from environment variables.
    ///
    /// Server:
    /// - `RCLS_PORT`: default 35200
    /// - `RCLS_DEV`: default false (allows dev-server origins)
    /// - `RCLS_AUTO_CONNECT`: default true
    /// - `RCLS_UI_KEEPALIVE_SECS`: default 290
    ///
    /// Client:
    /// - `CLIENT_PRINCIPAL`: default `riot`
    /// - `CLIENT_CONNECT_TIMEOUT_MS`: default 1000
    /// - `CLIENT_REQUEST_TIMEOUT_MS`: default 5000
    /// - `CLIENT_HEALTH_ATTEMPTS`: default 4
    /// - `CLIENT_HEALTH_BACKOFF_MS`: default 1000
    /// - `CLIENT_EVENT_CHANNEL`: default `OnJsonApiEvent`
    /// - `CLIENT_EVENT_KEEPALIVE_SECS`: default 290
    /// - `CLIENT_SUBSCRIBE_ATTEMPTS`: default 6
    /// - `CLIENT_SUBSCRIBE_RETRY_MS`: default 100
    /// - `CLIENT_PORT_RELEASE_MS`: default 500
    /// - `CLIENT_MAX_HANDSHAKE_FAILURES`: default 5
    #[must_use]
    pub fn from_env() -> Self {
        let server = ServerConfig {
            port: env_parse("RCLS_PORT", DEFAULT_SERVER_PORT),
            dev: env_flag("RCLS_DEV", false),
            auto_connect: env_flag("RCLS_AUTO_CONNECT", true),
            ui_keepalive: Duration::from_secs(env_parse("RCLS_UI_KEEPALIVE_SECS", DEFAULT_UI_KEEPALIVE_SECS).max(1)),
        };

        let upstream = UpstreamConfig {
            principal: std::env::var("CLIENT_PRINCIPAL").unwrap_or_else(|_| DEFAULT_PRINCIPAL.into()),
            connect_timeout: Duration::from_millis(env_parse("CLIENT_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT_MS)),
            request_timeout: Duration::from_millis(
                env_parse("CLIENT_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS).max(1),
            ),
            health_attempts: env_parse("CLIENT_HEALTH_ATTEMPTS", DEFAULT_HEALTH_ATTEMPTS).max(1),
            health_backoff: Duration::from_millis(env_parse("CLIENT_HEALTH_BACKOFF_MS", DEFAULT_HEALTH_BACKOFF_MS)),
            event_channel: std::env::var("CLIENT_EVENT_CHANNEL").unwrap_or_else(|_| DEFAULT_EVENT_CHANNEL.into()),
            event_keepalive: Duration::from_secs(
                env_parse("CLIENT_EVENT_KEEPALIVE_SECS", DEFAULT_EVENT_KEEPALIVE_SECS).max(1),
            ),
            subscribe_attempts: env_parse("CLIENT_SUBSCRIBE_ATTEMPTS", DEFAULT_SUBSCRIBE_ATTEMPTS).max(1),
            subscribe_retry: Duration::from_millis(env_parse("CLIENT_SUBSCRIBE_RETRY_MS", DEFAULT_SUBSCRIBE_RETRY_MS)),
            port_release: Duration::from_millis(env_parse("CLIENT_PORT_RELEASE_MS", DEFAULT_PORT_RELEASE_MS)),
            max_handshake_failures: env_parse("CLIENT_MAX_HANDSHAKE_FAILURES", DEFAULT_MAX_HANDSHAKE_FAILURES).max(1),
            secure: true,
        };

        Self { server, upstream }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
