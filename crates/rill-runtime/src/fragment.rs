use std::sync::{Arc, Mutex};

use hashbrown::HashMap;

use rill_core::RootContainer;

use crate::pages::ScriptFn;

/// A fragment body saved during a full run, together with the tree
/// coordinate its block occupies, so a fragment rerun lands its elements at
/// the same positions the full run used.
#[derive(Clone)]
pub struct StoredFragment {
    pub body: ScriptFn,
    pub container: RootContainer,
    pub path: Vec<u32>,
}

/// Session-scoped storage of fragment bodies keyed by fragment id.
///
/// Cleared at the start of every full run (the script re-registers its
/// fragments); read by fragment-scoped reruns in between.
#[derive(Clone, Default)]
pub struct FragmentStorage {
    inner: Arc<Mutex<HashMap<String, StoredFragment>>>,
}

impl FragmentStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, id: impl Into<String>, fragment: StoredFragment) {
        self.inner.lock().unwrap().insert(id.into(), fragment);
    }

    pub fn get(&self, id: &str) -> Option<StoredFragment> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
