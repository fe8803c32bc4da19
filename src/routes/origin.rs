//! Origin filtering for every inbound request and upgrade.
//!
//! Browsers attach `Origin`; only the server's own loopback origin (and,
//! in development builds, the local dev-server ports) may talk to us.
//! Requests without an `Origin` come from non-browser callers and pass.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::header::ORIGIN;
use axum::middleware::Next;
use axum::response::Response;
use regex::Regex;
use tracing::warn;

use super::error_response;
use crate::config::DEV_SERVER_PORTS;
use crate::state::AppState;

pub struct OriginPolicy {
    allowed: Option<Regex>,
}

impl OriginPolicy {
    /// Policy for a server on `port`.
    #[must_use]
    pub fn new(port: u16, dev: bool) -> Self {
        let mut ports = vec![port.to_string()];
        if dev {
            ports.extend(DEV_SERVER_PORTS.iter().map(u16::to_string));
        }
        let pattern = format!(r"^(?:http://)?(?:localhost|127\.0\.0\.1):(?:{})/?$", ports.join("|"));
        // Built from digits only; a compile failure would mean nothing is allowed.
        let allowed = Regex::new(&pattern).ok();
        Self { allowed }
    }

    #[must_use]
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(origin) => self.allowed.as_ref().is_some_and(|re| re.is_match(origin)),
        }
    }
}

/// Middleware: 403 for disallowed origins.
pub async fn require_allowed_origin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let origin = req.headers().get(ORIGIN).map(|v| v.to_str().unwrap_or_default());
    if !state.origins.allows(origin) {
        warn!(origin = origin.unwrap_or_default(), path = %req.uri().path(), "origin: rejected");
        return error_response(StatusCode::FORBIDDEN, "Forbidden", "Origin not allowed");
    }
    next.run(req).await
}
