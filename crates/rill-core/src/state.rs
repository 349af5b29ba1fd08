use std::mem;
use std::sync::{Arc, Mutex};

use hashbrown::{HashMap, HashSet};

use crate::identity::WidgetId;
use crate::value::Value;

/// Callback scheduled when a widget's client-reported value changed since
/// the previous run; invoked before the script body executes.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Key into the session state store: either a derived widget identity or a
/// free-form key written by script code.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StateKey {
    Widget(WidgetId),
    User(String),
}

/// One batch of client-reported widget values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WidgetStates {
    values: HashMap<WidgetId, Value>,
}

impl WidgetStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: WidgetId, value: Value) {
        self.values.insert(id, value);
    }

    pub fn get(&self, id: &WidgetId) -> Option<&Value> {
        self.values.get(id)
    }

    pub fn remove(&mut self, id: &WidgetId) -> Option<Value> {
        self.values.remove(id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&WidgetId, &Value)> {
        self.values.iter()
    }

    /// Merges two successive client batches. The newer batch wins per
    /// identity; identities present only in the older batch are kept.
    pub fn coalesce(older: WidgetStates, newer: &WidgetStates) -> WidgetStates {
        let mut merged = older;
        for (id, value) in newer.values.iter() {
            merged.values.insert(id.clone(), value.clone());
        }
        merged
    }
}

impl FromIterator<(WidgetId, Value)> for WidgetStates {
    fn from_iter<I: IntoIterator<Item = (WidgetId, Value)>>(iter: I) -> Self {
        WidgetStates {
            values: iter.into_iter().collect(),
        }
    }
}

struct WidgetMetadata {
    /// Effective value as of the widget's most recent registration, used to
    /// decide whether an on_change callback should fire.
    serialized_value: Value,
    /// For trigger widgets (e.g. button), the value to reset to when a full
    /// run finishes, so a press reads true for exactly one run.
    trigger_resting: Option<Value>,
    on_change: Option<ChangeCallback>,
}

/// Session-scoped store of widget and user state.
///
/// Three zones coexist per key: the default registered by the script this
/// run, the most recent client-reported value, and pending writes issued by
/// script code. Precedence is pending > client > default; a pending write is
/// cleared once observed, and a client value is authoritative until the next
/// interaction replaces it.
#[derive(Default)]
pub struct SessionState {
    /// Effective values carried across runs.
    current: HashMap<StateKey, Value>,
    /// Most recent client-reported values, merged batch over batch.
    client: WidgetStates,
    /// Script-initiated writes not yet observed by a read.
    pending: HashMap<StateKey, Value>,
    metadata: HashMap<WidgetId, WidgetMetadata>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a widget's effective value, registering `default` if nothing
    /// else is present for the identity.
    pub fn get_or_default(&mut self, id: &WidgetId, default: Value) -> Value {
        let key = StateKey::Widget(id.clone());
        if let Some(value) = self.pending.remove(&key) {
            // An observed pending write supersedes whatever the client last
            // reported for this identity.
            self.client.remove(id);
            self.current.insert(key, value.clone());
            return value;
        }
        if let Some(value) = self.client.get(id).cloned() {
            self.current.insert(key, value.clone());
            return value;
        }
        self.current.entry(key).or_insert(default).clone()
    }

    /// Records a script-initiated write, observed by the next read of `key`.
    pub fn set_pending(&mut self, key: StateKey, value: Value) {
        self.pending.insert(key, value);
    }

    /// Reads a free-form user key, observing any pending write for it.
    pub fn get_user(&mut self, name: &str) -> Option<Value> {
        let key = StateKey::User(name.to_owned());
        if let Some(value) = self.pending.remove(&key) {
            self.current.insert(key, value.clone());
            return Some(value);
        }
        self.current.get(&key).cloned()
    }

    /// Records widget metadata for the current run. Called by the widget
    /// registration protocol after the effective value is resolved.
    pub fn register_widget(
        &mut self,
        id: &WidgetId,
        serialized_value: Value,
        trigger_resting: Option<Value>,
        on_change: Option<ChangeCallback>,
    ) {
        self.metadata.insert(
            id.clone(),
            WidgetMetadata {
                serialized_value,
                trigger_resting,
                on_change,
            },
        );
    }

    /// Merges a freshly-arrived client batch and returns the callbacks to
    /// invoke for identities whose effective value changed.
    pub fn on_script_will_rerun(&mut self, new_states: Option<WidgetStates>) -> Vec<ChangeCallback> {
        let Some(new_states) = new_states else {
            return Vec::new();
        };
        let mut callbacks = Vec::new();
        for (id, value) in new_states.iter() {
            if let Some(meta) = self.metadata.get(id) {
                if let Some(callback) = &meta.on_change {
                    if meta.serialized_value != *value {
                        callbacks.push(Arc::clone(callback));
                    }
                }
            }
        }
        self.client = WidgetStates::coalesce(mem::take(&mut self.client), &new_states);
        callbacks
    }

    /// Finalizes a full script run: prunes widget entries whose identity was
    /// not registered this run and resets trigger values. Fragment runs must
    /// not call this.
    pub fn on_script_finished(&mut self, active: &HashSet<WidgetId>) {
        let is_live = |key: &StateKey| match key {
            StateKey::Widget(id) => active.contains(id),
            StateKey::User(_) => true,
        };
        let before = self.current.len();
        self.current.retain(|key, _| is_live(key));
        self.pending.retain(|key, _| is_live(key));
        self.metadata.retain(|id, _| active.contains(id));
        let stale: Vec<WidgetId> = self
            .client
            .iter()
            .filter(|(id, _)| !active.contains(*id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.client.remove(id);
        }
        if before > self.current.len() {
            log::debug!(
                "pruned {} session state entries after full run",
                before - self.current.len()
            );
        }
        for (id, meta) in self.metadata.iter() {
            if let Some(resting) = &meta.trigger_resting {
                self.current
                    .insert(StateKey::Widget(id.clone()), resting.clone());
                self.client.remove(id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn contains(&self, key: &StateKey) -> bool {
        self.current.contains_key(key)
    }
}

/// Cloneable, thread-safe handle to a session's state store.
///
/// The store is the one piece of mutable state shared between the worker
/// thread and caller threads; every access goes through this handle's lock.
#[derive(Clone, Default)]
pub struct SessionStateHandle {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionStateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_default(&self, id: &WidgetId, default: Value) -> Value {
        self.inner.lock().unwrap().get_or_default(id, default)
    }

    pub fn set_pending(&self, key: StateKey, value: Value) {
        self.inner.lock().unwrap().set_pending(key, value);
    }

    pub fn get_user(&self, name: &str) -> Option<Value> {
        self.inner.lock().unwrap().get_user(name)
    }

    pub fn register_widget(
        &self,
        id: &WidgetId,
        serialized_value: Value,
        trigger_resting: Option<Value>,
        on_change: Option<ChangeCallback>,
    ) {
        self.inner
            .lock()
            .unwrap()
            .register_widget(id, serialized_value, trigger_resting, on_change);
    }

    pub fn on_script_will_rerun(&self, new_states: Option<WidgetStates>) -> Vec<ChangeCallback> {
        self.inner.lock().unwrap().on_script_will_rerun(new_states)
    }

    pub fn on_script_finished(&self, active: &HashSet<WidgetId>) {
        self.inner.lock().unwrap().on_script_finished(active);
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        f(&mut self.inner.lock().unwrap())
    }
}
