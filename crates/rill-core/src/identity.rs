use std::fmt;
use std::hash::Hash;

use hashbrown::HashMap;

use crate::error::UsageError;
use crate::hash::hash_one;

/// Stable identity of one widget invocation, derived from the widget's
/// semantic type and configuration, optionally salted with a user key.
///
/// Identities are recomputed on every run; equality across runs is the only
/// mechanism by which a widget's value survives a rerun.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetId(String);

impl WidgetId {
    pub fn derive<C: Hash>(widget_type: &str, config: &C, user_key: Option<&str>) -> Self {
        let digest = hash_one(&(widget_type, hash_one(config)));
        match user_key {
            Some(key) => WidgetId(format!("{widget_type}-{digest:016x}-{key}")),
            None => WidgetId(format!("{widget_type}-{digest:016x}")),
        }
    }

    /// Wraps an already-derived identity, e.g. one received from the client.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        WidgetId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WidgetId({})", self.0)
    }
}

/// Per-run record of every widget identity registered so far, used to detect
/// duplicate widgets within a single run.
///
/// Each entry remembers which fragment (if any) registered it, so a
/// fragment-scoped rerun can reset exactly the identities it owns while the
/// rest of the script's identities stay registered.
#[derive(Default)]
pub struct IdentityRegistry {
    seen: HashMap<WidgetId, Option<String>>,
    current_fragment: Option<String>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets all bookkeeping at the start of a full script run.
    pub fn begin_run(&mut self) {
        self.seen.clear();
        self.current_fragment = None;
    }

    /// Resets only the identities owned by `fragment_id` at the start of a
    /// fragment-scoped run.
    pub fn begin_fragment_run(&mut self, fragment_id: &str) {
        self.seen
            .retain(|_, owner| owner.as_deref() != Some(fragment_id));
        self.current_fragment = Some(fragment_id.to_owned());
    }

    /// Marks subsequently registered identities as owned by `fragment_id`.
    pub fn set_current_fragment(&mut self, fragment_id: Option<String>) {
        self.current_fragment = fragment_id;
    }

    pub fn check_unique(
        &mut self,
        id: &WidgetId,
        widget_type: &str,
        user_key: Option<&str>,
    ) -> Result<(), UsageError> {
        if self.seen.contains_key(id) {
            return Err(match user_key {
                Some(key) => UsageError::DuplicateWidgetKey {
                    widget_type: widget_type.to_owned(),
                    key: key.to_owned(),
                },
                None => UsageError::DuplicateWidgetId {
                    widget_type: widget_type.to_owned(),
                },
            });
        }
        self.seen
            .insert(id.clone(), self.current_fragment.clone());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
