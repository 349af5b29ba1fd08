use std::mem;
use std::sync::Mutex;

use crate::state::WidgetStates;

/// Everything the next run should use: interaction data plus page and
/// fragment context. Immutable once built; successive requests are merged
/// with [`RerunData::coalesce`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RerunData {
    pub query_string: String,
    pub widget_states: Option<WidgetStates>,
    pub page_script_hash: String,
    pub page_name: String,
    pub fragment_id: Option<String>,
    pub fragment_id_queue: Vec<String>,
    pub is_fragment_scoped_rerun: bool,
}

impl RerunData {
    /// A full-script rerun carrying one client batch.
    pub fn with_widget_states(states: WidgetStates) -> Self {
        RerunData {
            widget_states: Some(states),
            ..RerunData::default()
        }
    }

    /// A rerun of a single named fragment.
    pub fn for_fragment(fragment_id: impl Into<String>) -> Self {
        let fragment_id = fragment_id.into();
        RerunData {
            fragment_id: Some(fragment_id.clone()),
            fragment_id_queue: vec![fragment_id],
            ..RerunData::default()
        }
    }

    pub fn is_fragment_run(&self) -> bool {
        !self.fragment_id_queue.is_empty() || self.fragment_id.is_some()
    }

    /// Merges a queued request with a newer one.
    ///
    /// Widget states merge newer-wins-per-identity. A new single-fragment
    /// request appends its id to the queue if absent; a new full-script
    /// request clears the queue entirely, since the full run will re-render
    /// every fragment anyway. Page and query context always come from the
    /// newer request.
    pub fn coalesce(old: RerunData, new: RerunData) -> RerunData {
        let widget_states = match (old.widget_states, new.widget_states) {
            (Some(old_states), Some(new_states)) => {
                Some(WidgetStates::coalesce(old_states, &new_states))
            }
            (Some(old_states), None) => Some(old_states),
            (None, new_states) => new_states,
        };
        let fragment_id_queue = match &new.fragment_id {
            Some(id) => {
                let mut queue = old.fragment_id_queue;
                if !queue.iter().any(|queued| queued == id) {
                    queue.push(id.clone());
                }
                queue
            }
            None => Vec::new(),
        };
        RerunData {
            query_string: new.query_string,
            widget_states,
            page_script_hash: new.page_script_hash,
            page_name: new.page_name,
            fragment_id: new.fragment_id,
            fragment_id_queue,
            is_fragment_scoped_rerun: new.is_fragment_scoped_rerun,
        }
    }
}

/// Control request observed by the script runner at its checkpoints.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptRequest {
    Continue,
    Rerun(RerunData),
    Stop,
}

#[derive(Debug)]
enum RequestState {
    Continue,
    Rerun(RerunData),
    Stop,
}

/// Thread-safe mailbox of exactly one pending control request, shared
/// between the owning session and the executing worker thread.
///
/// Stop is terminal and unconditionally wins; successive rerun requests are
/// coalesced so the worker never has more than one pending request to
/// process.
pub struct ScriptRequests {
    state: Mutex<RequestState>,
}

impl Default for ScriptRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptRequests {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RequestState::Continue),
        }
    }

    /// Unconditionally transitions to Stop.
    pub fn request_stop(&self) {
        let mut state = self.state.lock().unwrap();
        *state = RequestState::Stop;
    }

    /// Requests a rerun with `new_data`. Returns false only if the runner
    /// has already been stopped.
    pub fn request_rerun(&self, new_data: RerunData) -> bool {
        let mut state = self.state.lock().unwrap();
        match mem::replace(&mut *state, RequestState::Continue) {
            RequestState::Stop => {
                *state = RequestState::Stop;
                false
            }
            RequestState::Continue => {
                *state = RequestState::Rerun(new_data);
                true
            }
            RequestState::Rerun(old_data) => {
                log::debug!("coalescing queued rerun request with newer request");
                *state = RequestState::Rerun(RerunData::coalesce(old_data, new_data));
                true
            }
        }
    }

    /// Checkpoint consulted after every element-producing call.
    ///
    /// Returns None when execution should continue: either nothing is
    /// pending, or the pending request is a plain fragment rerun, which must
    /// not preempt a run in progress unless it was explicitly scoped to.
    pub fn on_scriptrunner_yield(&self) -> Option<ScriptRequest> {
        let mut state = self.state.lock().unwrap();
        if let RequestState::Continue = *state {
            return None;
        }
        if let RequestState::Rerun(data) = &*state {
            if !data.fragment_id_queue.is_empty() && !data.is_fragment_scoped_rerun {
                return None;
            }
        }
        match mem::replace(&mut *state, RequestState::Continue) {
            RequestState::Rerun(data) => Some(ScriptRequest::Rerun(data)),
            RequestState::Stop => {
                *state = RequestState::Stop;
                Some(ScriptRequest::Stop)
            }
            RequestState::Continue => unreachable!("checked above while holding the lock"),
        }
    }

    /// Checkpoint consulted when the runner is idle or a run just finished.
    /// Consumes a pending rerun if there is one; otherwise the runner has
    /// nothing to do and the state is forced to Stop.
    pub fn on_scriptrunner_ready(&self) -> ScriptRequest {
        let mut state = self.state.lock().unwrap();
        match mem::replace(&mut *state, RequestState::Continue) {
            RequestState::Rerun(data) => ScriptRequest::Rerun(data),
            _ => {
                *state = RequestState::Stop;
                ScriptRequest::Stop
            }
        }
    }
}
