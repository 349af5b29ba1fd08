#![doc = r"In-process session driver: runs a script against a real runner and observes its output."]

use std::cell::RefCell;
use std::panic;
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;

use rill_core::{
    Delta, ForwardMsg, ForwardQueue, RerunData, ScriptRequests, SessionStateHandle, UsageError,
    Value, WidgetId, WidgetStates,
};
use rill_runtime::{
    FragmentStorage, NullMediaRegistry, PageRegistry, ScriptCache, ScriptRunner,
    ScriptRunnerEvent,
};

const RUN_TIMEOUT: Duration = Duration::from_secs(5);

/// Silences panic reports from the script runner's worker thread.
///
/// The runner delivers rerun and stop signals by unwinding, so the worker
/// thread "panics" many times during a perfectly healthy test. Panics on any
/// other thread still report normally.
pub fn install_quiet_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if thread::current().name() == Some("rill-script-runner") {
                return;
            }
            previous(info);
        }));
    });
}

/// One scripted session under test.
///
/// Owns the long-lived session collaborators (state, forward queue,
/// fragment storage, script cache) and a current runner. A runner shuts
/// itself down whenever it goes idle; submitting the next request through
/// this harness starts a fresh one against the same session, the way a real
/// session owner would.
///
/// Construction submits the initial rerun request and starts the first
/// runner, so the first script run is already in flight; call
/// [`TestSession::wait_for_run_end`] to synchronize with it.
pub struct TestSession {
    state: SessionStateHandle,
    queue: ForwardQueue,
    fragments: FragmentStorage,
    cache: Arc<dyn ScriptCache>,
    runner: RefCell<Option<ScriptRunner>>,
    events: RefCell<Receiver<ScriptRunnerEvent>>,
}

impl TestSession {
    /// Starts a session whose app is a single main page.
    pub fn run(body: impl Fn() -> Result<(), UsageError> + Send + Sync + 'static) -> Self {
        Self::with_cache(Arc::new(PageRegistry::with_main("main", body)))
    }

    /// Starts a session against an arbitrary script cache, e.g. a
    /// multi-page [`PageRegistry`] or a failing stub.
    pub fn with_cache(cache: Arc<dyn ScriptCache>) -> Self {
        install_quiet_panic_hook();
        let state = SessionStateHandle::new();
        let queue = ForwardQueue::new();
        let fragments = FragmentStorage::new();
        let (runner, events) = start_runner(
            &state,
            &queue,
            &fragments,
            &cache,
            RerunData::default(),
        );
        TestSession {
            state,
            queue,
            fragments,
            cache,
            runner: RefCell::new(Some(runner)),
            events: RefCell::new(events),
        }
    }

    pub fn state(&self) -> &SessionStateHandle {
        &self.state
    }

    /// Submits a rerun request, starting a fresh runner if the previous one
    /// already went idle and stopped.
    pub fn request_rerun(&self, data: RerunData) {
        if let Some(runner) = self.runner.borrow().as_ref() {
            if runner.request_rerun(data.clone()) {
                return;
            }
        }
        if let Some(old) = self.runner.borrow_mut().take() {
            old.join();
        }
        let (runner, events) =
            start_runner(&self.state, &self.queue, &self.fragments, &self.cache, data);
        *self.runner.borrow_mut() = Some(runner);
        *self.events.borrow_mut() = events;
    }

    /// Collects lifecycle events until a run reaches a terminal state.
    ///
    /// Runs abandoned for a newer request are not terminal; collection
    /// continues through `ScriptStoppedForRerun` into the follow-up run.
    pub fn wait_for_run_end(&self) -> Vec<ScriptRunnerEvent> {
        let events = self.events.borrow();
        let mut seen = Vec::new();
        loop {
            let event = events
                .recv_timeout(RUN_TIMEOUT)
                .unwrap_or_else(|_| panic!("no run completion within {RUN_TIMEOUT:?}: {seen:?}"));
            let terminal = matches!(
                event,
                ScriptRunnerEvent::ScriptStoppedWithSuccess
                    | ScriptRunnerEvent::ScriptStoppedWithCompileError { .. }
                    | ScriptRunnerEvent::FragmentStoppedWithSuccess
                    | ScriptRunnerEvent::Shutdown
            );
            seen.push(event);
            if terminal {
                return seen;
            }
        }
    }

    /// Simulates one client interaction and waits for the resulting run.
    pub fn interact(&self, id: WidgetId, value: Value) -> Vec<ScriptRunnerEvent> {
        self.interact_many(vec![(id, value)])
    }

    /// Simulates a client batch of several widget values in one rerun.
    pub fn interact_many(
        &self,
        values: impl IntoIterator<Item = (WidgetId, Value)>,
    ) -> Vec<ScriptRunnerEvent> {
        let states: WidgetStates = values.into_iter().collect();
        self.request_rerun(RerunData::with_widget_states(states));
        self.wait_for_run_end()
    }

    /// Requests a rerun of a single named fragment and waits for it.
    pub fn rerun_fragment(&self, fragment_id: impl Into<String>) -> Vec<ScriptRunnerEvent> {
        self.request_rerun(RerunData::for_fragment(fragment_id));
        self.wait_for_run_end()
    }

    /// Removes and returns every outbound message produced so far.
    pub fn drain_messages(&self) -> Vec<ForwardMsg> {
        self.queue.drain()
    }

    /// Like [`TestSession::drain_messages`], keeping only delta payloads.
    pub fn drain_deltas(&self) -> Vec<Delta> {
        self.queue
            .drain()
            .into_iter()
            .filter_map(|msg| match msg {
                ForwardMsg::Delta(delta) => Some(delta),
                ForwardMsg::PageNotFound { .. } => None,
            })
            .collect()
    }

    /// Stops the current runner and blocks until its worker thread exits,
    /// returning the events it emitted on the way out.
    pub fn stop_and_join(&self) -> Vec<ScriptRunnerEvent> {
        if let Some(runner) = self.runner.borrow_mut().take() {
            runner.request_stop();
            runner.join();
        }
        let events = self.events.borrow();
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        if let Some(runner) = self.runner.borrow_mut().take() {
            runner.request_stop();
            runner.join();
        }
    }
}

fn start_runner(
    state: &SessionStateHandle,
    queue: &ForwardQueue,
    fragments: &FragmentStorage,
    cache: &Arc<dyn ScriptCache>,
    initial: RerunData,
) -> (ScriptRunner, Receiver<ScriptRunnerEvent>) {
    let requests = Arc::new(ScriptRequests::new());
    let (mut runner, events) = ScriptRunner::new(
        "test-session",
        state.clone(),
        Arc::clone(&requests),
        queue.clone(),
        Arc::clone(cache),
        Arc::new(NullMediaRegistry),
        fragments.clone(),
    );
    // The initial request must be in the mailbox before the worker starts,
    // or the runner sees nothing pending and shuts down at once.
    requests.request_rerun(initial);
    runner.start();
    (runner, events)
}
