//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router on the fixed local port. `/ws` is the UI broadcast
//! socket, `/proxy/*` relays to the Client, `/rest/v1` is the local
//! control API. The origin guard wraps all three, so a rejected browser
//! origin never reaches a handler or completes an upgrade.

pub mod origin;
pub mod proxy;
pub mod rest;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/proxy/{*path}", any(proxy::forward))
        .nest("/rest/v1", rest::routes())
        .layer(middleware::from_fn_with_state(state.clone(), origin::require_allowed_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// UI-facing failure body: `{"message": ..., "details": ...}`.
pub fn error_response(status: StatusCode, message: &str, details: &str) -> Response {
    (status, Json(json!({ "message": message, "details": details }))).into_response()
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
