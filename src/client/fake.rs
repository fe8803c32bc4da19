//! In-process stand-in for the Client, used by tests.
//!
//! Serves plain HTTP and WS on a loopback port: the health endpoint (with
//! a configurable number of leading failures), the product-session
//! endpoints, a `/status/{code}` echo, a catch-all echo that records every
//! request, and the event WebSocket at `/`.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use serde_json::{Map, Value, json};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;

use crate::client::session::Session;
use crate::config::UpstreamConfig;

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: String,
    pub auth: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Clone)]
pub struct FakeState {
    pub health_failures: Arc<AtomicU32>,
    pub health_hits: Arc<AtomicU32>,
    pub requests: Arc<Mutex<VecDeque<Recorded>>>,
    pub sessions: Arc<Mutex<Map<String, Value>>>,
    pub frames: broadcast::Sender<String>,
    pub ws_received: Arc<Mutex<Vec<String>>>,
    pub ws_auth: Arc<Mutex<Option<String>>>,
    pub ws_connections: Arc<AtomicU32>,
    pub close_sockets: Arc<Notify>,
}

impl FakeState {
    fn new() -> Self {
        let (frames, _) = broadcast::channel(64);
        Self {
            health_failures: Arc::new(AtomicU32::new(0)),
            health_hits: Arc::new(AtomicU32::new(0)),
            requests: Arc::new(Mutex::new(VecDeque::new())),
            sessions: Arc::new(Mutex::new(Map::new())),
            frames,
            ws_received: Arc::new(Mutex::new(Vec::new())),
            ws_auth: Arc::new(Mutex::new(None)),
            ws_connections: Arc::new(AtomicU32::new(0)),
            close_sockets: Arc::new(Notify::new()),
        }
    }

    fn record(&self, method: Method, uri: &Uri, headers: &HeaderMap, body: &[u8]) {
        let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_owned);
        self.requests.lock().unwrap().push_back(Recorded {
            method,
            uri: uri.to_string(),
            auth,
            body: body.to_vec(),
        });
    }
}

pub struct FakeClient {
    pub port: u16,
    pub state: FakeState,
    task: JoinHandle<()>,
}

impl Drop for FakeClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl FakeClient {
    pub async fn start() -> Self {
        Self::start_on(0).await
    }

    pub async fn start_on(port: u16) -> Self {
        let state = FakeState::new();
        let listener = tokio::net::TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port))).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let app = router(state.clone());
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { port, state, task }
    }

    pub fn session(&self, secret: &str) -> Session {
        Session::new("riot", self.port, secret)
    }

    pub fn fail_health(&self, times: u32) {
        self.state.health_failures.store(times, Ordering::SeqCst);
    }

    pub fn health_hits(&self) -> u32 {
        self.state.health_hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().iter().cloned().collect()
    }

    pub fn push_frame(&self, frame: &str) {
        let _ = self.state.frames.send(frame.to_owned());
    }

    pub fn ws_received(&self) -> Vec<String> {
        self.state.ws_received.lock().unwrap().clone()
    }

    pub fn ws_connections(&self) -> u32 {
        self.state.ws_connections.load(Ordering::SeqCst)
    }

    pub fn close_sockets(&self) {
        self.state.close_sockets.notify_waiters();
    }

    pub fn insert_session(&self, id: &str, value: Value) {
        self.state.sessions.lock().unwrap().insert(id.to_owned(), value);
    }
}

/// Upstream config pointed at a plain fake with millisecond pauses.
pub fn fast_upstream() -> UpstreamConfig {
    UpstreamConfig {
        health_backoff: std::time::Duration::from_millis(10),
        subscribe_retry: std::time::Duration::from_millis(5),
        port_release: std::time::Duration::from_millis(5),
        secure: false,
        ..UpstreamConfig::default()
    }
}

fn router(state: FakeState) -> Router {
    Router::new()
        .route("/", get(event_socket))
        .route("/riotclient/app-name", get(app_name))
        .route("/product-session/v1/sessions", get(list_sessions))
        .route("/product-session/v1/sessions/{id}", any(one_session))
        .route("/status/{code}", any(status_echo))
        .fallback(echo)
        .with_state(state)
}

async fn app_name(State(state): State<FakeState>, method: Method, uri: Uri, headers: HeaderMap) -> Response {
    state.record(method, &uri, &headers, &[]);
    state.health_hits.fetch_add(1, Ordering::SeqCst);
    let remaining = state.health_failures.load(Ordering::SeqCst);
    if remaining > 0 {
        state.health_failures.store(remaining - 1, Ordering::SeqCst);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    axum::Json(json!("RiotClient")).into_response()
}

async fn list_sessions(State(state): State<FakeState>) -> Response {
    let sessions = state.sessions.lock().unwrap().clone();
    axum::Json(Value::Object(sessions)).into_response()
}

async fn one_session(
    State(state): State<FakeState>,
    Path(id): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.record(method.clone(), &uri, &headers, &body);
    let mut sessions = state.sessions.lock().unwrap();
    match method {
        Method::GET => match sessions.get(&id) {
            Some(v) => axum::Json(v.clone()).into_response(),
            None => (StatusCode::NOT_FOUND, axum::Json(json!({"errorCode": "RESOURCE_NOT_FOUND"}))).into_response(),
        },
        Method::POST | Method::PUT => {
            let value: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            sessions.insert(id, value.clone());
            axum::Json(value).into_response()
        }
        Method::DELETE => {
            sessions.remove(&id);
            StatusCode::NO_CONTENT.into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn status_echo(
    State(state): State<FakeState>,
    Path(code): Path<u16>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.record(method, &uri, &headers, &[]);
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::IM_A_TEAPOT);
    (status, axum::Json(json!({"status": code}))).into_response()
}

async fn echo(State(state): State<FakeState>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    state.record(method.clone(), &uri, &headers, &body);
    let payload = json!({
        "method": method.as_str(),
        "uri": uri.to_string(),
        "body": String::from_utf8_lossy(&body),
    });
    (
        [
            ("cache-control", "no-store"),
            ("access-control-allow-origin", "https://upstream.invalid"),
            ("x-upstream", "yes"),
        ],
        axum::Json(payload),
    )
        .into_response()
}

async fn event_socket(State(state): State<FakeState>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).map(str::to_owned);
    *state.ws_auth.lock().unwrap() = auth;
    ws.on_upgrade(move |socket| run_socket(socket, state))
}

async fn run_socket(mut socket: WebSocket, state: FakeState) {
    let mut frames = state.frames.subscribe();
    let close = state.close_sockets.clone();
    // Registered before the socket counts as open, so a close issued right
    // after the count rises is never missed.
    let mut closed = std::pin::pin!(close.notified());
    closed.as_mut().enable();
    state.ws_connections.fetch_add(1, Ordering::SeqCst);
    loop {
        tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => {
                    state.ws_received.lock().unwrap().push(text.as_str().to_owned());
                }
                Some(Ok(_)) => {}
                _ => break,
            },
            frame = frames.recv() => match frame {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            () = closed.as_mut() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
        }
    }
    state.ws_connections.fetch_sub(1, Ordering::SeqCst);
}
