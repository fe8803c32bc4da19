//! Data projection engine.
//!
//! ARCHITECTURE
//! ============
//! Three registries (object, map, set) each hold projections keyed by name.
//! While the engine runs, every projection owns an unbounded job queue and
//! a worker task. `dispatch` matches the envelope's resource path against
//! every projection and enqueues an update on each match; it never awaits
//! a projection, so a slow projection only delays its own queue.
//!
//! ORDERING
//! ========
//! Dispatch is called from a single reader (the event stream), and each
//! queue is FIFO with one consumer, so a projection sees its events in
//! arrival order. Nothing is promised across projections.
//!
//! ERROR HANDLING
//! ==============
//! A panicking update is caught and logged by the worker; the worker keeps
//! serving its queue and other projections are unaffected.

pub mod envelope;
pub mod managers;
pub mod map;
pub mod object;
pub mod projection;
pub mod set;

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace};

use self::envelope::{EventEnvelope, Opcode, parse_frame};
use self::map::MapProjection;
use self::object::ObjectProjection;
use self::projection::Projection;
use self::set::SetProjection;

enum Job {
    Update { opcode: Opcode, groups: Vec<String>, payload: Option<Value> },
    #[cfg(test)]
    Barrier(tokio::sync::oneshot::Sender<()>),
}

struct Slot {
    projection: Arc<dyn Projection>,
    queue: Mutex<Option<mpsc::UnboundedSender<Job>>>,
}

impl Slot {
    fn new(projection: Arc<dyn Projection>) -> Self {
        Self { projection, queue: Mutex::new(None) }
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<Job>>> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn enqueue(&self, job: Job) -> bool {
        self.queue().as_ref().is_some_and(|tx| tx.send(job).is_ok())
    }
}

#[derive(Default)]
struct Registry {
    slots: BTreeMap<String, Slot>,
}

impl Registry {
    fn insert(&mut self, projection: Arc<dyn Projection>) {
        self.slots.insert(projection.name().to_owned(), Slot::new(projection));
    }
}

#[derive(Default)]
pub struct DataEngine {
    objects: Registry,
    maps: Registry,
    sets: Registry,
    running: AtomicBool,
}

impl DataEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_object(&mut self, projection: Arc<ObjectProjection>) {
        self.objects.insert(projection);
    }

    pub fn register_map(&mut self, projection: Arc<MapProjection>) {
        self.maps.insert(projection);
    }

    pub fn register_set(&mut self, projection: Arc<SetProjection>) {
        self.sets.insert(projection);
    }

    fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.objects.slots.values().chain(self.maps.slots.values()).chain(self.sets.slots.values())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Look up a projection by name across all registries.
    #[must_use]
    pub fn projection(&self, name: &str) -> Option<Arc<dyn Projection>> {
        self.slots().find(|slot| slot.projection.name() == name).map(|slot| slot.projection.clone())
    }

    /// Spawn the per-projection workers, mark running, then let each
    /// projection pull its initial snapshot.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        for slot in self.slots() {
            let (tx, rx) = mpsc::unbounded_channel();
            *slot.queue() = Some(tx);
            tokio::spawn(run_worker(slot.projection.clone(), rx));
        }
        for slot in self.slots() {
            slot.projection.start().await;
        }
        info!(projections = self.slots().count(), "engine: started");
    }

    /// Drop every queue and tear down all projection state.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for slot in self.slots() {
            slot.queue().take();
        }
        for slot in self.slots() {
            slot.projection.stop().await;
        }
        info!("engine: stopped");
    }

    /// Clear every cached projection and re-announce empty state.
    pub async fn reset(&self) {
        for slot in self.slots() {
            slot.projection.reset().await;
        }
    }

    /// Fan an envelope out to every matching projection.
    pub fn dispatch(&self, envelope: EventEnvelope) {
        if !self.is_running() {
            trace!(path = %envelope.resource_path, "engine: not running, dropping");
            return;
        }
        let mut matched = 0usize;
        for slot in self.slots() {
            let Some(groups) = slot.projection.matches(&envelope.resource_path) else {
                continue;
            };
            matched += 1;
            let job = Job::Update { opcode: envelope.opcode, groups, payload: envelope.payload.clone() };
            if !slot.enqueue(job) {
                debug!(name = slot.projection.name(), "engine: queue closed, dropping");
            }
        }
        if matched == 0 {
            trace!(path = %envelope.resource_path, "engine: no projection matched");
        }
    }

    /// Decode a raw frame and dispatch it. Malformed frames are dropped.
    pub fn dispatch_raw(&self, text: &str) {
        if let Some(envelope) = parse_frame(text) {
            self.dispatch(envelope);
        }
    }

    /// `Initial<Name>` greetings from object and map projections holding
    /// state.
    pub async fn initial_messages(&self) -> Vec<String> {
        let mut out = Vec::new();
        for slot in self.objects.slots.values().chain(self.maps.slots.values()) {
            if let Some(msg) = slot.projection.initial_message().await {
                out.push(msg);
            }
        }
        out
    }

    /// Wait until every queued update has been applied.
    #[cfg(test)]
    pub async fn settle(&self) {
        let mut waits = Vec::new();
        for slot in self.slots() {
            let (tx, rx) = tokio::sync::oneshot::channel();
            if slot.enqueue(Job::Barrier(tx)) {
                waits.push(rx);
            }
        }
        for rx in waits {
            let _ = rx.await;
        }
    }
}

async fn run_worker(projection: Arc<dyn Projection>, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Update { opcode, groups, payload } => {
                let outcome = AssertUnwindSafe(projection.update(opcode, &groups, payload)).catch_unwind().await;
                if outcome.is_err() {
                    error!(name = projection.name(), "engine: projection panicked during update");
                }
            }
            #[cfg(test)]
            Job::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!(name = projection.name(), "engine: worker exited");
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
