//! Set-shaped projection: identifiers accumulated from Create events.
//!
//! Update and Delete are ignored; the set only empties on reset or stop.

use std::collections::BTreeSet;
use std::sync::RwLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::info;

use super::envelope::Opcode;
use super::projection::Projection;

struct SetState {
    running: bool,
    ids: BTreeSet<String>,
}

pub struct SetProjection {
    name: String,
    pattern: Regex,
    id_group: usize,
    state: RwLock<SetState>,
}

impl SetProjection {
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regex.
    pub fn new(name: &str, pattern: &str, id_group: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_owned(),
            pattern: Regex::new(pattern)?,
            id_group,
            state: RwLock::new(SetState { running: false, ids: BTreeSet::new() }),
        })
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SetState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SetState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.read().ids.contains(id)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.read().ids.iter().cloned().collect()
    }
}

#[async_trait]
impl Projection for SetProjection {
    fn name(&self) -> &str {
        &self.name
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    fn is_running(&self) -> bool {
        self.read().running
    }

    async fn start(&self) {
        let mut state = self.write();
        state.running = true;
        state.ids.clear();
    }

    async fn stop(&self) {
        let mut state = self.write();
        state.running = false;
        state.ids.clear();
    }

    async fn reset(&self) {
        let mut state = self.write();
        if state.running {
            state.ids.clear();
        }
    }

    async fn update(&self, opcode: Opcode, groups: &[String], _payload: Option<Value>) {
        if opcode != Opcode::Create {
            return;
        }
        let Some(id) = groups.get(self.id_group).filter(|id| !id.is_empty()) else {
            return;
        };
        let inserted = {
            let mut state = self.write();
            state.running && state.ids.insert(id.clone())
        };
        if inserted {
            info!(name = %self.name, %id, "set: new id observed");
        }
    }

    async fn snapshot(&self) -> Option<Value> {
        let state = self.read();
        state.running.then(|| Value::Array(state.ids.iter().cloned().map(Value::String).collect()))
    }

    /// Sets are internal bookkeeping and are not pushed to UI clients.
    async fn initial_message(&self) -> Option<String> {
        None
    }
}
