//! The projection capability shared by every manager shape.
//!
//! DESIGN
//! ======
//! One trait, three shapes (`object`, `map`, `set`). The engine only sees
//! `dyn Projection`; typed accessors live on the concrete structs and are
//! reached through the handles in `managers::Managers`.
//!
//! Every implementation keeps its running flag inside the same lock as its
//! state. `update` checks the flag under that lock, so an update racing a
//! `stop` either lands before the teardown or is discarded.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use super::envelope::Opcode;
use crate::client::gateway::ConnectionGateway;
use crate::hub::{Hub, ui_event};

/// Collaborators a projection may use: the gateway for fetches and the
/// hub for announcing changes.
#[derive(Clone)]
pub struct ProjectionContext {
    pub gateway: Arc<ConnectionGateway>,
    pub hub: Hub,
}

#[async_trait]
pub trait Projection: Send + Sync {
    /// Event type announced to UI clients.
    fn name(&self) -> &str;

    fn pattern(&self) -> &Regex;

    fn is_running(&self) -> bool;

    /// Capture groups of `path` when the whole path matches. Group 0 is the
    /// full match.
    fn matches(&self, path: &str) -> Option<Vec<String>> {
        let caps = self.pattern().captures(path)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 || whole.end() != path.len() {
            return None;
        }
        Some(caps.iter().map(|m| m.map_or_else(String::new, |m| m.as_str().to_owned())).collect())
    }

    async fn start(&self);

    /// Tear down all state. Nothing survives a stop.
    async fn stop(&self);

    /// Clear the cached projection and announce the empty state.
    async fn reset(&self);

    async fn update(&self, opcode: Opcode, groups: &[String], payload: Option<Value>);

    /// Current state as JSON; `None` when unknown.
    async fn snapshot(&self) -> Option<Value>;

    /// `Initial<Name>` greeting for a newly connected UI client.
    async fn initial_message(&self) -> Option<String> {
        let data = self.snapshot().await?;
        Some(ui_event(&format!("Initial{}", self.name()), &data))
    }
}
