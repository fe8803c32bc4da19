//! Connection state machine: owns the Client's lifecycle.
//!
//! ARCHITECTURE
//! ============
//! ```text
//! Disconnected -> Connecting -> AwaitingHandshake -> Connected
//!      ^              |                |                 |
//!      +--------------+----------------+-----------------+
//! ```
//! `transition` updates the state under the machine lock, broadcasts the
//! new state name to every UI client and enqueues the state's side effects
//! on the driver task. The driver runs side effects one at a time in
//! order, so the caller of `connect` never waits and no two transitions of
//! one attempt overlap.
//!
//! Every attempt gets a number. Side effects and transport callbacks carry
//! the attempt they belong to and are ignored once a newer attempt exists.
//! Entering Disconnected drops the session under the lock, so no reader
//! sees a half-torn-down connection. The rest of the cleanup always runs;
//! it is idempotent.
//!
//! ERROR HANDLING
//! ==============
//! A missing helper executable is fatal (404). A failed handshake returns
//! to Disconnected; after `max_handshake_failures` in a row it is fatal
//! (522). Everything else is logged and drives the machine back to
//! Disconnected.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::event_stream::EventStreamClient;
use super::gateway::{ClientMethod, ConnectionGateway, GatewayError};
use super::process::{Game, ProcessError, ProcessHandler};
use super::session::{Session, find_free_port, generate_secret};
use crate::data::DataEngine;
use crate::exit::{ExitCode, FatalSignal};
use crate::hub::Hub;

pub const PRODUCT_SESSION_PATH: &str = "/product-session/v1/sessions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingHandshake,
    Connected,
}

impl ConnectionState {
    /// Wire name broadcast to UI clients.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::AwaitingHandshake => "AWAIT_CONNECTION",
            Self::Connected => "CONNECTED",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of the placeholder session that keeps the helper alive while no
/// UI process is attached.
#[must_use]
pub fn keepalive_session_body() -> Value {
    json!({
        "exitCode": 0,
        "exitReason": null,
        "isInternal": true,
        "launchConfig": {
            "arguments": [],
            "executable": "",
            "locale": null,
            "voiceLocale": null,
            "workingDirectory": "",
        },
        "patchlineFullName": "Just dont quit on rc exit",
        "patchlineId": "developer_product.defaultpatchline",
        "phase": "None",
        "productId": Game::RiotClient.internal_name(),
        "version": "0.0.0.0",
    })
}

struct Machine {
    running: bool,
    state: ConnectionState,
    attempt: u64,
    pending: Option<Arc<Session>>,
    failures: u32,
}

struct Job {
    attempt: u64,
    state: ConnectionState,
}

/// Collaborators the connector drives.
pub struct ConnectorParts {
    pub gateway: Arc<ConnectionGateway>,
    pub events: EventStreamClient,
    pub engine: Arc<DataEngine>,
    pub processes: Arc<dyn ProcessHandler>,
    pub hub: Hub,
    pub fatal: FatalSignal,
}

pub struct Connector {
    me: Weak<Connector>,
    machine: Mutex<Machine>,
    state_tx: watch::Sender<ConnectionState>,
    jobs: mpsc::UnboundedSender<Job>,
    gateway: Arc<ConnectionGateway>,
    events: EventStreamClient,
    engine: Arc<DataEngine>,
    processes: Arc<dyn ProcessHandler>,
    hub: Hub,
    fatal: FatalSignal,
}

impl Connector {
    /// Build the connector and spawn its driver task.
    #[must_use]
    pub fn new(parts: ConnectorParts) -> Arc<Self> {
        let (jobs, rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let connector = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            machine: Mutex::new(Machine {
                running: true,
                state: ConnectionState::Disconnected,
                attempt: 0,
                pending: None,
                failures: 0,
            }),
            state_tx,
            jobs,
            gateway: parts.gateway,
            events: parts.events,
            engine: parts.engine,
            processes: parts.processes,
            hub: parts.hub,
            fatal: parts.fatal,
        });
        tokio::spawn(drive(Arc::downgrade(&connector), rx));
        connector
    }

    fn machine(&self) -> MutexGuard<'_, Machine> {
        match self.machine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.machine().state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watch every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub fn gateway(&self) -> &Arc<ConnectionGateway> {
        &self.gateway
    }

    #[must_use]
    pub fn processes(&self) -> &Arc<dyn ProcessHandler> {
        &self.processes
    }

    /// Apply a transition under the held lock. Returns whether it happened.
    fn apply(&self, m: &mut Machine, attempt: u64, next: ConnectionState) -> bool {
        if !m.running || m.attempt != attempt || m.state == next {
            return false;
        }
        debug!(from = %m.state, to = %next, attempt, "connector: transition");
        m.state = next;
        if next == ConnectionState::Disconnected {
            m.pending = None;
            self.gateway.sessions().clear();
        }
        self.hub.broadcast(next.as_str());
        self.state_tx.send_replace(next);
        let _ = self.jobs.send(Job { attempt, state: next });
        true
    }

    fn transition(&self, attempt: u64, next: ConnectionState) -> bool {
        let mut m = self.machine();
        self.apply(&mut m, attempt, next)
    }

    /// Begin a connection attempt. No-op unless Disconnected.
    pub fn connect(&self) -> bool {
        let mut m = self.machine();
        if !m.running || m.state != ConnectionState::Disconnected {
            info!(state = %m.state, "connector: connect ignored");
            return false;
        }
        m.attempt += 1;
        let attempt = m.attempt;
        info!(attempt, "connector: connecting");
        self.apply(&mut m, attempt, ConnectionState::Connecting)
    }

    /// The event stream dropped: force Disconnected.
    pub fn on_transport_closed(&self) {
        let mut m = self.machine();
        let attempt = m.attempt;
        self.apply(&mut m, attempt, ConnectionState::Disconnected);
    }

    fn on_transport_closed_for(&self, attempt: u64) {
        if self.transition(attempt, ConnectionState::Disconnected) {
            warn!(attempt, "connector: event stream closed");
        }
    }

    /// Stop for good: tear everything down and refuse further transitions.
    pub async fn shutdown(&self) {
        {
            let mut m = self.machine();
            m.running = false;
            m.state = ConnectionState::Disconnected;
            m.pending = None;
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
        self.teardown().await;
        info!("connector: shut down");
    }

    async fn teardown(&self) {
        self.events.stop();
        self.engine.stop().await;
        self.gateway.sessions().clear();
        self.machine().pending = None;
    }

    // =========================================================================
    // SIDE EFFECTS
    // =========================================================================

    fn is_current(&self, job: &Job) -> bool {
        let m = self.machine();
        m.running && m.attempt == job.attempt && m.state == job.state
    }

    async fn run(&self, job: Job) {
        if job.state == ConnectionState::Disconnected {
            self.teardown().await;
            info!(attempt = job.attempt, "connector: disconnected");
            return;
        }
        if !self.is_current(&job) {
            debug!(attempt = job.attempt, state = %job.state, "connector: stale transition skipped");
            return;
        }
        match job.state {
            ConnectionState::Connecting => self.on_connecting(job.attempt).await,
            ConnectionState::AwaitingHandshake => self.on_awaiting_handshake(job.attempt).await,
            ConnectionState::Connected => self.on_connected(job.attempt).await,
            ConnectionState::Disconnected => {}
        }
    }

    async fn on_connecting(&self, attempt: u64) {
        self.kill_lingering().await;

        let config = self.gateway.config();
        let port = match find_free_port(config.port_release).await {
            Ok(port) => port,
            Err(e) => {
                warn!(error = %e, "connector: no free port");
                self.transition(attempt, ConnectionState::Disconnected);
                return;
            }
        };
        let session = Arc::new(Session::new(&config.principal, port, generate_secret()));

        if let Err(e) = self.processes.start_helper(port, &session.secret).await {
            if matches!(e, ProcessError::HelperNotFound(_)) {
                self.fatal.raise(ExitCode::HelperExecutableNotFound);
            }
            warn!(error = %e, "connector: helper launch failed");
            self.transition(attempt, ConnectionState::Disconnected);
            return;
        }

        {
            let mut m = self.machine();
            if m.attempt != attempt {
                return;
            }
            m.pending = Some(session);
        }
        self.transition(attempt, ConnectionState::AwaitingHandshake);
    }

    async fn on_awaiting_handshake(&self, attempt: u64) {
        let pending = self.machine().pending.clone();
        let Some(session) = pending else {
            self.transition(attempt, ConnectionState::Disconnected);
            return;
        };

        if self.gateway.health_check(session.port, &session.auth_token).await {
            let promoted = {
                let mut m = self.machine();
                let current = m.running && m.attempt == attempt && m.state == ConnectionState::AwaitingHandshake;
                if current {
                    m.pending = None;
                    m.failures = 0;
                    self.gateway.sessions().set(session.clone());
                }
                current
            };
            if promoted {
                info!(port = session.port, "connector: handshake complete");
                self.transition(attempt, ConnectionState::Connected);
            }
            return;
        }

        let failures = {
            let mut m = self.machine();
            m.failures += 1;
            m.failures
        };
        warn!(port = session.port, failures, "connector: handshake failed");
        self.transition(attempt, ConnectionState::Disconnected);
        if failures >= self.gateway.config().max_handshake_failures {
            self.fatal.raise(ExitCode::RepeatedConnectionFailures);
        }
    }

    async fn on_connected(&self, attempt: u64) {
        let Some(session) = self.gateway.sessions().snapshot() else {
            self.transition(attempt, ConnectionState::Disconnected);
            return;
        };

        let me = self.me.clone();
        self.events.start(
            session,
            Box::new(move || {
                if let Some(connector) = me.upgrade() {
                    connector.on_transport_closed_for(attempt);
                }
            }),
        );

        if let Err(e) = self.register_keepalive_session().await {
            warn!(error = %e, "connector: keep-alive session not registered, the helper may exit with the ui");
        }

        self.engine.start().await;
    }

    async fn kill_lingering(&self) {
        for game in Game::ALL {
            if let Some(pid) = self.processes.game_process_id(game).await {
                self.processes.kill_process(pid).await;
            }
        }
        if let Some(pid) = self.processes.helper_process_id().await {
            self.processes.kill_process(pid).await;
        }
    }

    async fn register_keepalive_session(&self) -> Result<(), GatewayError> {
        let id = format!("{}{}", generate_secret(), generate_secret());
        let path = format!("{PRODUCT_SESSION_PATH}/{id}");
        let status = self.gateway.send_json(ClientMethod::Post, &path, &keepalive_session_body()).await?;
        if status != 200 && status != 204 {
            return Err(GatewayError::Status { status, body: String::new() });
        }
        debug!(%id, "connector: keep-alive session registered");
        Ok(())
    }
}

async fn drive(connector: Weak<Connector>, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        let Some(connector) = connector.upgrade() else {
            break;
        };
        connector.run(job).await;
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
impl Connector {
    /// Jump straight to Connected against `session` without side effects.
    pub fn force_connected(&self, session: Session) {
        self.gateway.sessions().set(Arc::new(session));
        let mut m = self.machine();
        m.attempt += 1;
        m.state = ConnectionState::Connected;
        self.state_tx.send_replace(ConnectionState::Connected);
    }
}

#[cfg(test)]
#[path = "connector_test.rs"]
mod tests;
