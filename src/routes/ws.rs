//! UI WebSocket: one-way broadcast feed to the frontend.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade (origin already checked by the router) → register in the hub
//! 2. Greeting: current connection state, then one `Initial<Name>`
//!    envelope per projection holding state
//! 3. `select!` over inbound frames (ignored), the hub queue and the
//!    keep-alive tick (an empty text frame)
//! 4. Close or send failure → unregister

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info};

use crate::state::AppState;

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let (id, mut queue) = state.hub.add_connection();
    info!(%id, "ws: ui connected");

    let mut greeting = vec![state.connector.state().as_str().to_owned()];
    greeting.extend(state.engine.initial_messages().await);

    let mut open = true;
    for message in greeting {
        if socket.send(Message::Text(message.into())).await.is_err() {
            open = false;
            break;
        }
    }

    let period = state.config.ui_keepalive;
    let mut keepalive = interval_at(Instant::now() + period, period);

    while open {
        tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(Message::Text(text))) => debug!(%id, len = text.as_str().len(), "ws: ignoring ui message"),
                Some(Ok(_)) => {}
            },
            Some(out) = queue.recv() => {
                if socket.send(Message::Text(out.into())).await.is_err() {
                    break;
                }
            }
            _ = keepalive.tick() => {
                if socket.send(Message::Text(String::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    state.hub.remove_connection(id);
    info!(%id, "ws: ui disconnected");
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
