//! Object-shaped projection: one current JSON object.
//!
//! `None` means "unknown" (never seen, or reset) and is distinct from an
//! empty object. When a fetch path is configured, an unknown state is
//! pulled from the Client on first read.

use std::sync::RwLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::envelope::Opcode;
use super::projection::{Projection, ProjectionContext};
use crate::hub::ui_event;

/// How a Create/Update payload is applied to the current object.
#[derive(Debug, Clone, Copy)]
pub enum ObjectRule {
    /// The payload becomes the new state.
    Replace,
    /// Only the listed keys are deep-merged into the state. Payloads that
    /// carry none of them are ignored.
    MergeKeys(&'static [&'static str]),
}

struct ObjectState {
    running: bool,
    current: Option<Map<String, Value>>,
}

type Inspector = fn(&str, &Map<String, Value>);

pub struct ObjectProjection {
    name: String,
    pattern: Regex,
    rule: ObjectRule,
    fetch_path: Option<String>,
    inspect: Option<Inspector>,
    ctx: ProjectionContext,
    state: RwLock<ObjectState>,
}

impl ObjectProjection {
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regex.
    pub fn new(name: &str, pattern: &str, rule: ObjectRule, ctx: ProjectionContext) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_owned(),
            pattern: Regex::new(pattern)?,
            rule,
            fetch_path: None,
            inspect: None,
            ctx,
            state: RwLock::new(ObjectState { running: false, current: None }),
        })
    }

    /// Fetch unknown state from `path` on first read.
    #[must_use]
    pub fn with_fetch(mut self, path: &str) -> Self {
        self.fetch_path = Some(path.to_owned());
        self
    }

    /// Observe every accepted payload before it is applied.
    #[must_use]
    pub fn with_inspect(mut self, inspect: Inspector) -> Self {
        self.inspect = Some(inspect);
        self
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ObjectState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ObjectState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn announce(&self, data: &Value) {
        self.ctx.hub.broadcast(&ui_event(&self.name, data));
    }

    /// Current object, fetching it once when unknown and a fetch path is set.
    pub async fn current_state(&self) -> Option<Map<String, Value>> {
        {
            let state = self.read();
            if !state.running {
                return None;
            }
            if let Some(current) = &state.current {
                return Some(current.clone());
            }
        }

        let path = self.fetch_path.as_deref()?;
        let fetched = match self.ctx.gateway.get_json(path).await {
            Ok(Value::Object(obj)) if !obj.contains_key("errorCode") => obj,
            Ok(_) => {
                debug!(name = %self.name, "object: fetch returned no usable state");
                return None;
            }
            Err(e) => {
                debug!(name = %self.name, error = %e, "object: fetch failed");
                return None;
            }
        };

        let mut state = self.write();
        if !state.running {
            return None;
        }
        // An event may have landed while the fetch was in flight; it wins.
        Some(state.current.get_or_insert(fetched).clone())
    }

    fn apply(&self, payload: Map<String, Value>) -> Option<Value> {
        let mut state = self.write();
        if !state.running {
            return None;
        }
        match self.rule {
            ObjectRule::Replace => {
                state.current = Some(payload);
            }
            ObjectRule::MergeKeys(keys) => {
                if !keys.iter().any(|k| payload.contains_key(*k)) {
                    return None;
                }
                let current = state.current.get_or_insert_with(Map::new);
                for (key, value) in payload {
                    if !keys.contains(&key.as_str()) {
                        continue;
                    }
                    match current.get_mut(&key) {
                        Some(existing) => deep_merge(existing, value),
                        None => {
                            current.insert(key, value);
                        }
                    }
                }
            }
        }
        state.current.clone().map(Value::Object)
    }
}

/// Merge `patch` into `target`: objects merge key by key, everything else
/// is replaced.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(t), Value::Object(p)) => {
            for (key, value) in p {
                match t.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        t.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

#[async_trait]
impl Projection for ObjectProjection {
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
        if state.running {
            return;
        }
        state.running = true;
        state.current = None;
        info!(name = %self.name, "object: started");
    }

    async fn stop(&self) {
        let mut state = self.write();
        state.running = false;
        state.current = None;
    }

    async fn reset(&self) {
        {
            let mut state = self.write();
            if !state.running {
                return;
            }
            state.current = None;
        }
        self.announce(&Value::Object(Map::new()));
    }

    async fn update(&self, opcode: Opcode, _groups: &[String], payload: Option<Value>) {
        match opcode {
            Opcode::Create | Opcode::Update => {
                let Some(Value::Object(obj)) = payload else {
                    debug!(name = %self.name, "object: ignoring non-object payload");
                    return;
                };
                if let Some(inspect) = self.inspect {
                    inspect(&self.name, &obj);
                }
                if let Some(data) = self.apply(obj) {
                    self.announce(&data);
                }
            }
            Opcode::Delete => self.reset().await,
        }
    }

    async fn snapshot(&self) -> Option<Value> {
        self.current_state().await.map(Value::Object)
    }
}

/// Log the interactive sub-challenges of an authentication payload.
pub fn log_auth_challenges(name: &str, payload: &Map<String, Value>) {
    for key in ["captcha", "multifactor"] {
        if let Some(Value::Object(challenge)) = payload.get(key) {
            let detail = Value::Object(challenge.clone());
            info!(%name, challenge = key, %detail, "object: authentication challenge");
        }
    }
    if let Some(error) = payload.get("error").filter(|e| !e.is_null()) {
        warn!(%name, %error, "object: authentication error");
    }
}

#[cfg(test)]
#[path = "object_test.rs"]
mod tests;
