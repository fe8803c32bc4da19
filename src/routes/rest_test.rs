use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::Request;
use serde_json::Value;
use tower::ServiceExt;

use super::*;
use crate::client::fake::FakeClient;
use crate::routes::app;
use crate::state::test_helpers::{NullProcesses, connect_to, server_config, test_app_state, test_app_state_with};

async fn call(state: &AppState, method: Method, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
    let resp = app(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

#[tokio::test]
async fn reports_connection_state() {
    let state = test_app_state();

    let (status, body) = call(&state, Method::GET, "/rest/v1/connection").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"state": "DISCONNECTED"}));
}

#[tokio::test]
async fn connect_is_accepted() {
    let state = test_app_state();

    let (status, body) = call(&state, Method::POST, "/rest/v1/connection").await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["started"], true);

    let fake = FakeClient::start().await;
    connect_to(&state, &fake);
    let (_, body) = call(&state, Method::POST, "/rest/v1/connection").await;
    assert_eq!(body, json!({"state": "CONNECTED", "started": false}));
}

#[tokio::test]
async fn lists_games() {
    let state = test_app_state();

    let (status, body) = call(&state, Method::GET, "/rest/v1/games").await;

    assert_eq!(status, StatusCode::OK);
    let games = body.as_array().unwrap();
    assert_eq!(games.len(), 4);
    assert_eq!(games[0], json!({"displayName": "Valorant", "internalName": "valorant"}));
}

#[tokio::test]
async fn unknown_game_is_404() {
    let state = test_app_state();

    let (status, _) = call(&state, Method::POST, "/rest/v1/games/minesweeper/launch").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&state, Method::GET, "/rest/v1/games/minesweeper/sessions").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn launch_needs_connection() {
    let state = test_app_state();

    let (status, body) = call(&state, Method::POST, "/rest/v1/games/valorant/launch").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], "Service Unavailable");
}

#[tokio::test]
async fn launches_products_through_the_client() {
    let fake = FakeClient::start().await;
    let state = test_app_state();
    connect_to(&state, &fake);

    let (status, body) = call(&state, Method::POST, "/rest/v1/games/valorant/launch").await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"game": "valorant"}));
    let recorded = fake.requests();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].method, Method::POST);
    assert_eq!(recorded[0].uri, "/product-launcher/v1/products/valorant/patchlines/live");
}

#[tokio::test]
async fn launches_riot_client_ui_locally() {
    let fake = FakeClient::start().await;
    let processes = Arc::new(NullProcesses::default());
    let state = test_app_state_with(server_config(), processes.clone());
    connect_to(&state, &fake);

    let (status, _) = call(&state, Method::POST, "/rest/v1/games/riot_client/launch").await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(*processes.launches.lock().unwrap(), vec![(fake.port, "test".to_owned())]);
    assert!(fake.requests().is_empty());
}

#[tokio::test]
async fn lists_sessions_for_a_game() {
    let fake = FakeClient::start().await;
    fake.insert_session("a", json!({"productId": "valorant", "phase": "Gameplay"}));
    fake.insert_session("b", json!({"productId": "bacon"}));
    let state = test_app_state();
    connect_to(&state, &fake);
    state.engine.start().await;

    let (status, body) = call(&state, Method::GET, "/rest/v1/games/valorant/sessions").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([{"productId": "valorant", "phase": "Gameplay"}]));
}

#[tokio::test]
async fn rest_rejects_foreign_origin() {
    let state = test_app_state();
    let req = Request::builder()
        .uri("/rest/v1/connection")
        .header("origin", "http://evil.example")
        .body(Body::empty())
        .unwrap();

    let resp = app(state).oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
