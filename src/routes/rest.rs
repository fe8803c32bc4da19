//! Local control API under `/rest/v1`.
//!
//! Connection control and game launching for the UI. Game launches need a
//! live session: the Riot Client UI is started as a local process, every
//! other product through the Client's launcher endpoint.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use super::error_response;
use crate::client::gateway::ClientMethod;
use crate::client::process::Game;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::PATCH])
        .allow_headers(Any);

    Router::new()
        .route("/connection", get(connection_state).post(connect))
        .route("/games", get(list_games))
        .route("/games/{game}/launch", post(launch_game))
        .route("/games/{game}/sessions", get(game_sessions))
        .layer(cors)
}

/// Path used to start a product through the Client.
#[must_use]
pub fn launch_path(game: Game) -> String {
    format!("/product-launcher/v1/products/{}/patchlines/live", game.internal_name())
}

fn unknown_game() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not Found", "Unknown game")
}

/// `GET /rest/v1/connection`
pub async fn connection_state(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "state": state.connector.state().as_str() }))
}

/// `POST /rest/v1/connection`: start an attempt if Disconnected.
pub async fn connect(State(state): State<AppState>) -> Response {
    let started = state.connector.connect();
    let body = json!({ "state": state.connector.state().as_str(), "started": started });
    (StatusCode::ACCEPTED, Json(body)).into_response()
}

/// `GET /rest/v1/games`
pub async fn list_games() -> Json<serde_json::Value> {
    Json(json!(Game::ALL.iter().map(|g| g.info()).collect::<Vec<_>>()))
}

/// `GET /rest/v1/games/{game}/sessions`
pub async fn game_sessions(State(state): State<AppState>, Path(game): Path<String>) -> Response {
    let Some(game) = Game::from_internal_name(&game) else {
        return unknown_game();
    };
    Json(state.managers.sessions_for_game(game)).into_response()
}

/// `POST /rest/v1/games/{game}/launch`
pub async fn launch_game(State(state): State<AppState>, Path(game): Path<String>) -> Response {
    let Some(game) = Game::from_internal_name(&game) else {
        return unknown_game();
    };
    let session = state.gateway().sessions().snapshot().filter(|_| state.connector.is_connected());
    let Some(session) = session else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable",
            "Riot Client connection not established",
        );
    };

    let outcome = if game == Game::RiotClient {
        state.connector.processes().launch_ui(session.port, &session.secret).await.map_err(|e| e.to_string())
    } else {
        state
            .gateway()
            .send_json(ClientMethod::Post, &launch_path(game), &json!({}))
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    };

    match outcome {
        Ok(()) => {
            info!(game = game.internal_name(), "rest: launch requested");
            (StatusCode::ACCEPTED, Json(json!({ "game": game.internal_name() }))).into_response()
        }
        Err(details) => {
            warn!(game = game.internal_name(), error = %details, "rest: launch failed");
            error_response(StatusCode::BAD_GATEWAY, "Launch Failed", &details)
        }
    }
}

#[cfg(test)]
#[path = "rest_test.rs"]
mod tests;
