//! Event stream: the WebSocket the Client pushes its events on.
//!
//! DESIGN
//! ======
//! One task per stream. It connects with the session's Authorization
//! header, subscribes to the event channel, then selects over three
//! things: the cancel token, the keep-alive tick and inbound frames. Text
//! frames go straight to `DataEngine::dispatch_raw`.
//!
//! ERROR HANDLING
//! ==============
//! A peer close, a transport error or a failed connect all end the task
//! and fire the `on_closed` callback, which the connector maps to
//! `on_transport_closed`. A deliberate `stop` cancels the task without
//! firing the callback. Failed subscribe sends are retried a bounded
//! number of times, then the channel is logged as unreachable and the
//! stream carries on without it.

use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, InvalidHeaderValue};
use tokio_tungstenite::{Connector, connect_async_tls_with_config};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::session::Session;
use crate::config::UpstreamConfig;
use crate::data::DataEngine;

/// Control-frame opcode for subscribing to a channel.
const SUBSCRIBE_OPCODE: u8 = 5;

#[derive(Debug, thiserror::Error)]
pub enum EventStreamError {
    #[error("event stream transport failed: {0}")]
    Transport(#[source] Box<tokio_tungstenite::tungstenite::Error>),

    #[error("invalid authorization header: {0}")]
    Header(#[from] InvalidHeaderValue),
}

impl From<tokio_tungstenite::tungstenite::Error> for EventStreamError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(Box::new(e))
    }
}

pub type ClosedCallback = Box<dyn FnOnce() + Send + 'static>;

struct RunningStream {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct EventStreamClient {
    config: UpstreamConfig,
    tls: Option<Arc<rustls::ClientConfig>>,
    engine: Arc<DataEngine>,
    running: Mutex<Option<RunningStream>>,
}

/// `[5, "<channel>"]`.
#[must_use]
pub fn subscribe_frame(channel: &str) -> String {
    serde_json::json!([SUBSCRIBE_OPCODE, channel]).to_string()
}

impl EventStreamClient {
    #[must_use]
    pub fn new(config: UpstreamConfig, tls: Option<Arc<rustls::ClientConfig>>, engine: Arc<DataEngine>) -> Self {
        Self { config, tls, engine, running: Mutex::new(None) }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<RunningStream>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Open a stream against `session`, replacing any previous one.
    /// `on_closed` fires once if the stream ends on its own.
    pub fn start(&self, session: Arc<Session>, on_closed: ClosedCallback) {
        self.stop();

        let cancel = CancellationToken::new();
        let config = self.config.clone();
        let tls = self.tls.clone();
        let engine = self.engine.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let outcome = stream_events(&config, tls, &engine, &session, &token).await;
            if token.is_cancelled() {
                debug!(port = session.port, "events: stopped");
                return;
            }
            match outcome {
                Ok(()) => info!(port = session.port, "events: closed by client"),
                Err(e) => warn!(port = session.port, error = %e, "events: stream failed"),
            }
            on_closed();
        });

        *self.slot() = Some(RunningStream { cancel, task });
    }

    /// Cancel the running stream without notifying.
    pub fn stop(&self) {
        if let Some(running) = self.slot().take() {
            running.cancel.cancel();
            drop(running.task);
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.slot().as_ref().is_some_and(|r| !r.task.is_finished())
    }
}

async fn stream_events(
    config: &UpstreamConfig,
    tls: Option<Arc<rustls::ClientConfig>>,
    engine: &DataEngine,
    session: &Session,
    cancel: &CancellationToken,
) -> Result<(), EventStreamError> {
    let url = format!("{}://127.0.0.1:{}/", config.ws_scheme(), session.port);
    let mut request = url.into_client_request()?;
    request.headers_mut().insert(AUTHORIZATION, HeaderValue::from_str(&session.auth_token)?);

    let connector = tls.map(Connector::Rustls);
    let (socket, _) = tokio::select! {
        () = cancel.cancelled() => return Ok(()),
        connected = connect_async_tls_with_config(request, None, false, connector) => connected?,
    };
    info!(port = session.port, "events: connected");
    let (mut sink, mut stream) = socket.split();

    let frame = subscribe_frame(&config.event_channel);
    let mut subscribed = false;
    for attempt in 1..=config.subscribe_attempts {
        match sink.send(Message::Text(frame.clone().into())).await {
            Ok(()) => {
                subscribed = true;
                break;
            }
            Err(e) => {
                debug!(attempt, error = %e, "events: subscribe send failed");
                tokio::time::sleep(config.subscribe_retry).await;
            }
        }
    }
    if subscribed {
        info!(channel = %config.event_channel, "events: subscribed");
    } else {
        error!(channel = %config.event_channel, attempts = config.subscribe_attempts, "events: channel unreachable");
    }

    let period = config.event_keepalive;
    let mut keepalive = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
            _ = keepalive.tick() => {
                sink.send(Message::Text(String::new().into())).await?;
                debug!("events: keep-alive sent");
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => engine.dispatch_raw(text.as_str()),
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
#[path = "event_stream_test.rs"]
mod tests;
