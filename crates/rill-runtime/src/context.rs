use std::cell::RefCell;
use std::sync::Arc;

use hashbrown::HashSet;

use rill_core::{
    DeltaBuilder, Element, IdentityRegistry, LockedCursor, RerunData, RootContainer,
    RunningCursor, ScriptRequest, ScriptRequests, SessionStateHandle, UsageError, Value,
    WidgetId,
};

use crate::control::{self, ScriptControl};
use crate::fragment::{FragmentStorage, StoredFragment};
use crate::pages::ScriptFn;

/// Per-run execution context for one script run on the worker thread.
///
/// This is the only mutable state a widget call may touch. It is attached to
/// the worker thread for the duration of one run and recovered by the runner
/// afterwards, whether the run completed or unwound.
pub struct RunContext {
    session_id: String,
    state: SessionStateHandle,
    requests: Arc<ScriptRequests>,
    deltas: DeltaBuilder,
    cursors: Vec<RunningCursor>,
    identity: IdentityRegistry,
    active_widget_ids: HashSet<WidgetId>,
    fragments: FragmentStorage,
    fragment_stack: Vec<String>,
    query_string: String,
    page_script_hash: String,
    page_name: String,
}

impl RunContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_id: String,
        state: SessionStateHandle,
        requests: Arc<ScriptRequests>,
        deltas: DeltaBuilder,
        identity: IdentityRegistry,
        fragments: FragmentStorage,
        query_string: String,
        page_script_hash: String,
        page_name: String,
    ) -> Self {
        RunContext {
            session_id,
            state,
            requests,
            deltas,
            cursors: vec![RunningCursor::root(RootContainer::Main)],
            identity,
            active_widget_ids: HashSet::new(),
            fragments,
            fragment_stack: Vec::new(),
            query_string,
            page_script_hash,
            page_name,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> &SessionStateHandle {
        &self.state
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// The rerun data a script-initiated rerun should carry: same page and
    /// query context, no new interaction data.
    pub fn rerun_data_for_current_page(&self) -> RerunData {
        RerunData {
            query_string: self.query_string.clone(),
            page_script_hash: self.page_script_hash.clone(),
            page_name: self.page_name.clone(),
            ..RerunData::default()
        }
    }

    /// Emits a leaf element at the current position, then checks for a
    /// pending interruption. This is the framework's yield point: a rerun or
    /// stop observed here unwinds immediately.
    pub fn enqueue_element(&mut self, element: Element) -> LockedCursor {
        let cursor = self
            .cursors
            .last_mut()
            .expect("cursor stack is never empty during a run");
        let locked = self.deltas.new_element(cursor, element);
        self.maybe_yield();
        locked
    }

    /// Emits the element without consulting the coordinator, used by the
    /// runner itself once a run has already been classified.
    pub(crate) fn render_exception(&mut self, exception_type: &str, message: String) {
        let element = Element::Exception {
            exception_type: exception_type.to_owned(),
            message,
        };
        let cursor = self
            .cursors
            .last_mut()
            .expect("cursor stack is never empty during a run");
        self.deltas.new_element(cursor, element);
    }

    /// Opens a nested block at the current position and makes it the
    /// insertion target until [`RunContext::exit_block`].
    pub fn enter_block(&mut self) {
        let cursor = self
            .cursors
            .last_mut()
            .expect("cursor stack is never empty during a run");
        let child = self.deltas.enter_block(cursor);
        self.cursors.push(child);
        self.maybe_yield();
    }

    pub fn exit_block(&mut self) {
        debug_assert!(self.cursors.len() > 1, "exit_block without enter_block");
        self.cursors.pop();
    }

    /// Appends rows to a previously created element.
    pub fn add_rows(
        &mut self,
        target: &LockedCursor,
        rows: Vec<Vec<Value>>,
    ) -> Result<(), UsageError> {
        self.deltas.add_rows(target, rows)?;
        self.maybe_yield();
        Ok(())
    }

    fn maybe_yield(&self) {
        match self.requests.on_scriptrunner_yield() {
            None | Some(ScriptRequest::Continue) => {}
            Some(ScriptRequest::Rerun(data)) => control::raise(ScriptControl::Rerun(data)),
            Some(ScriptRequest::Stop) => control::raise(ScriptControl::Stop),
        }
    }

    pub fn identity_mut(&mut self) -> &mut IdentityRegistry {
        &mut self.identity
    }

    /// Records that `id` was registered this run, for end-of-run pruning.
    pub fn mark_active(&mut self, id: &WidgetId) {
        self.active_widget_ids.insert(id.clone());
    }

    /// Saves a fragment body under `id` and opens its block. The fragment's
    /// elements live inside that block, so a later fragment-scoped rerun can
    /// reuse the exact same coordinates.
    pub fn register_fragment(&mut self, id: &str, body: ScriptFn) {
        self.enter_block();
        let child = self
            .cursors
            .last()
            .expect("cursor stack is never empty during a run");
        self.fragments.store(
            id,
            StoredFragment {
                body,
                container: child.container(),
                path: child.path().to_vec(),
            },
        );
        self.fragment_stack.push(id.to_owned());
        self.identity.set_current_fragment(Some(id.to_owned()));
    }

    /// Closes the block opened by [`RunContext::register_fragment`].
    pub fn finish_fragment(&mut self) {
        self.exit_block();
        self.fragment_stack.pop();
        self.identity
            .set_current_fragment(self.fragment_stack.last().cloned());
    }

    /// Positions the context for re-executing one stored fragment body.
    pub(crate) fn begin_fragment_rerun(&mut self, id: &str, stored: &StoredFragment) {
        self.identity.begin_fragment_run(id);
        self.cursors
            .push(RunningCursor::at(stored.container, stored.path.clone()));
        self.fragment_stack.push(id.to_owned());
    }

    pub(crate) fn end_fragment_rerun(&mut self) {
        self.cursors.pop();
        self.fragment_stack.pop();
        self.identity
            .set_current_fragment(self.fragment_stack.last().cloned());
    }

    pub(crate) fn into_parts(self) -> (IdentityRegistry, HashSet<WidgetId>) {
        (self.identity, self.active_widget_ids)
    }
}

thread_local! {
    static RUN_CTX: RefCell<Option<RunContext>> = RefCell::new(None);
}

/// Attaches `ctx` to the current thread for the duration of one run.
pub(crate) fn attach(ctx: RunContext) {
    RUN_CTX.with(|slot| {
        let previous = slot.borrow_mut().replace(ctx);
        assert!(previous.is_none(), "a run context was already attached");
    });
}

/// Recovers the context after a run, whether it completed or unwound.
pub(crate) fn detach() -> Option<RunContext> {
    RUN_CTX.with(|slot| slot.borrow_mut().take())
}

/// Runs `f` with the current thread's run context.
///
/// Panics if no script run is in progress on this thread; calling widget
/// APIs outside a run is a programming error.
pub fn with_run_ctx<R>(f: impl FnOnce(&mut RunContext) -> R) -> R {
    RUN_CTX.with(|slot| {
        let mut slot = slot.borrow_mut();
        let ctx = slot
            .as_mut()
            .expect("no script run in progress on this thread");
        f(ctx)
    })
}

pub fn try_with_run_ctx<R>(f: impl FnOnce(&mut RunContext) -> R) -> Option<R> {
    RUN_CTX.with(|slot| {
        let mut slot = slot.borrow_mut();
        slot.as_mut().map(f)
    })
}
