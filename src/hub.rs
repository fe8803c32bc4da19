//! Local WebSocket hub: the registry of live UI connections.
//!
//! DESIGN
//! ======
//! Each accepted UI socket registers an unbounded outbound queue under a
//! fresh id. `broadcast` holds the read lock only long enough to enqueue
//! the frame on every queue; the per-connection send loop in `routes::ws`
//! drains its own queue. A stalled client therefore only backs up its own
//! queue and never delays the broadcaster or other clients.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct Hub {
    connections: Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<String>>>>,
}

impl Hub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a UI connection and return its id and outbound queue.
    #[must_use]
    pub fn add_connection(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        match self.connections.write() {
            Ok(mut conns) => {
                conns.insert(id, tx);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(id, tx);
            }
        }
        debug!(%id, "hub: connection added");
        (id, rx)
    }

    pub fn remove_connection(&self, id: Uuid) {
        let removed = match self.connections.write() {
            Ok(mut conns) => conns.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        };
        if removed.is_some() {
            debug!(%id, "hub: connection removed");
        }
    }

    /// Enqueue `message` on every live connection. Connections whose queue
    /// has closed are pruned.
    pub fn broadcast(&self, message: &str) {
        let mut closed = Vec::new();
        {
            let conns = match self.connections.read() {
                Ok(conns) => conns,
                Err(poisoned) => poisoned.into_inner(),
            };
            for (id, tx) in conns.iter() {
                if tx.send(message.to_owned()).is_err() {
                    closed.push(*id);
                }
            }
        }
        for id in closed {
            warn!(%id, "hub: dropping closed connection");
            self.remove_connection(id);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self.connections.read() {
            Ok(conns) => conns.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serialize a UI event envelope: `{"eventType": ..., "data": ...}`.
#[must_use]
pub fn ui_event(event_type: &str, data: &Value) -> String {
    json!({ "eventType": event_type, "data": data }).to_string()
}

#[cfg(test)]
#[path = "hub_test.rs"]
mod tests;
