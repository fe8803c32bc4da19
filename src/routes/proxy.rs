//! Reverse proxy: `/proxy/<path>` relayed verbatim to the Client.
//!
//! DESIGN
//! ======
//! The UI never holds the session credentials. Each request is rebuilt
//! against the active session (path plus original query, full body) and
//! the Client's status, headers and body are copied back. Cache and CORS
//! headers from the Client are dropped so our own CORS policy is the only
//! one the browser sees.
//!
//! ERROR HANDLING
//! ==============
//! - not Connected: 503
//! - method the Client does not take: 405
//! - no session to build against, or transport failure: 500

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONNECTION, CONTENT_LENGTH,
    TRANSFER_ENCODING,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tracing::{debug, warn};

use super::error_response;
use crate::client::gateway::ClientMethod;
use crate::state::AppState;

const PREFIX: &str = "/proxy";
const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, PATCH";

pub async fn forward(State(state): State<AppState>, method: Method, uri: Uri, body: Bytes) -> Response {
    if method == Method::OPTIONS {
        return with_cors(StatusCode::OK.into_response());
    }
    if !state.connector.is_connected() {
        return with_cors(error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable",
            "Riot Client connection not established",
        ));
    }
    let Some(client_method) = ClientMethod::from_http(&method) else {
        return with_cors(error_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed", "Method not supported"));
    };

    let path = target_path(&uri);
    let body = (!body.is_empty()).then(|| body.to_vec());
    let Some(request) = state.gateway().build_request(client_method, &path, body) else {
        return with_cors(failed_upstream());
    };

    debug!(%method, %path, "proxy: forwarding");
    match request.send().await {
        Ok(upstream) => with_cors(relay(upstream).await),
        Err(e) => {
            warn!(%method, %path, error = %e, "proxy: client request failed");
            with_cors(failed_upstream())
        }
    }
}

/// `/proxy/a/b?x=1` becomes `/a/b?x=1`.
#[must_use]
pub fn target_path(uri: &Uri) -> String {
    let path = uri.path().strip_prefix(PREFIX).unwrap_or(uri.path());
    let path = if path.is_empty() { "/" } else { path };
    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_owned(),
    }
}

/// Headers from the Client that must not reach the browser.
fn is_dropped(name: &HeaderName) -> bool {
    name == CACHE_CONTROL
        || name == CONTENT_LENGTH
        || name == CONNECTION
        || name == TRANSFER_ENCODING
        || name.as_str().starts_with("access-control-")
}

async fn relay(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = HeaderMap::new();
    for (name, value) in upstream.headers() {
        if !is_dropped(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    match upstream.bytes().await {
        Ok(body) => (status, headers, body).into_response(),
        Err(e) => {
            warn!(error = %e, "proxy: client response body failed");
            failed_upstream()
        }
    }
}

fn failed_upstream() -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", "Failed to establish connection")
}

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOWED_METHODS));
    response
}

#[cfg(test)]
#[path = "proxy_test.rs"]
mod tests;
