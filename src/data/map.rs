//! Map-shaped projection: key to JSON object, keyed by a capture group of
//! the resource path.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::envelope::Opcode;
use super::projection::{Projection, ProjectionContext};
use crate::hub::ui_event;

struct MapState {
    running: bool,
    entries: BTreeMap<String, Value>,
}

pub struct MapProjection {
    name: String,
    pattern: Regex,
    key_group: usize,
    snapshot_path: Option<String>,
    /// Path template with a `{key}` placeholder, used to fetch on miss.
    load_template: Option<String>,
    ctx: ProjectionContext,
    state: RwLock<MapState>,
}

impl MapProjection {
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regex.
    pub fn new(name: &str, pattern: &str, key_group: usize, ctx: ProjectionContext) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_owned(),
            pattern: Regex::new(pattern)?,
            key_group,
            snapshot_path: None,
            load_template: None,
            ctx,
            state: RwLock::new(MapState { running: false, entries: BTreeMap::new() }),
        })
    }

    /// Seed the table from an object-of-objects at `path` on start.
    #[must_use]
    pub fn with_snapshot(mut self, path: &str) -> Self {
        self.snapshot_path = Some(path.to_owned());
        self
    }

    /// Fetch missing keys from `template`, where `{key}` is substituted.
    #[must_use]
    pub fn with_load(mut self, template: &str) -> Self {
        self.load_template = Some(template.to_owned());
        self
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MapState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MapState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn announce(&self, key: &str, value: Option<&Value>) {
        let mut data = Map::new();
        data.insert(key.to_owned(), value.cloned().unwrap_or(Value::Null));
        self.ctx.hub.broadcast(&ui_event(&self.name, &Value::Object(data)));
    }

    /// Point lookup. Falls back to the load template on a miss.
    pub async fn get(&self, key: &str) -> Option<Value> {
        {
            let state = self.read();
            if !state.running {
                return None;
            }
            if let Some(value) = state.entries.get(key) {
                return Some(value.clone());
            }
        }

        let template = self.load_template.as_deref()?;
        let path = template.replace("{key}", key);
        let value = match self.ctx.gateway.get_json(&path).await {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => return None,
            Err(e) => {
                debug!(name = %self.name, %key, error = %e, "map: load failed");
                return None;
            }
        };

        let mut state = self.write();
        if !state.running {
            return None;
        }
        Some(state.entries.entry(key.to_owned()).or_insert(value).clone())
    }

    /// Point delete. Returns the evicted value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = {
            let mut state = self.write();
            if !state.running {
                return None;
            }
            state.entries.remove(key)
        };
        if removed.is_some() {
            self.announce(key, None);
        }
        removed
    }

    /// Consistent copy of the whole table.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let state = self.read();
        Value::Object(state.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Values whose `field` equals `expected`.
    #[must_use]
    pub fn values_where(&self, field: &str, expected: &str) -> Vec<Value> {
        let state = self.read();
        state
            .entries
            .values()
            .filter(|v| v.get(field).and_then(Value::as_str) == Some(expected))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn load_snapshot(&self, path: &str) {
        let entries = match self.ctx.gateway.get_json(path).await {
            Ok(Value::Object(obj)) => obj,
            Ok(_) => return,
            Err(e) => {
                debug!(name = %self.name, error = %e, "map: snapshot failed");
                return;
            }
        };

        let mut state = self.write();
        if !state.running {
            return;
        }
        let mut loaded = 0usize;
        for (key, value) in entries {
            if value.is_object() {
                // Deltas that arrived during the fetch are newer.
                state.entries.entry(key).or_insert(value);
                loaded += 1;
            }
        }
        info!(name = %self.name, loaded, "map: snapshot loaded");
    }
}

#[async_trait]
impl Projection for MapProjection {
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
        {
            let mut state = self.write();
            if state.running {
                return;
            }
            state.running = true;
            state.entries.clear();
        }
        if let Some(path) = &self.snapshot_path {
            self.load_snapshot(path).await;
        }
    }

    async fn stop(&self) {
        let mut state = self.write();
        state.running = false;
        state.entries.clear();
    }

    async fn reset(&self) {
        {
            let mut state = self.write();
            if !state.running {
                return;
            }
            state.entries.clear();
        }
        self.ctx.hub.broadcast(&ui_event(&self.name, &Value::Object(Map::new())));
    }

    async fn update(&self, opcode: Opcode, groups: &[String], payload: Option<Value>) {
        let Some(key) = groups.get(self.key_group).filter(|k| !k.is_empty()) else {
            return;
        };
        match opcode {
            Opcode::Create | Opcode::Update => {
                let Some(value @ Value::Object(_)) = payload else {
                    return;
                };
                {
                    let mut state = self.write();
                    if !state.running {
                        return;
                    }
                    state.entries.insert(key.clone(), value.clone());
                }
                self.announce(key, Some(&value));
            }
            Opcode::Delete => {
                self.remove(key);
            }
        }
    }

    async fn snapshot(&self) -> Option<Value> {
        if !self.is_running() {
            return None;
        }
        Some(self.to_json())
    }
}

#[cfg(test)]
#[path = "map_test.rs"]
mod tests;
