use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

use rill_core::{
    DeltaBuilder, ForwardMsg, ForwardQueue, IdentityRegistry, RerunData, ScriptRequest,
    ScriptRequests, SessionStateHandle, UsageError,
};

use crate::context::{self, RunContext};
use crate::control::{self, ScriptControl};
use crate::fragment::FragmentStorage;
use crate::media::MediaRegistry;
use crate::pages::{CompileError, PageLookup, ScriptCache};

/// Lifecycle notification emitted by the worker thread, in order.
#[derive(Clone, Debug)]
pub enum ScriptRunnerEvent {
    /// A run is about to execute user code.
    ScriptStarted { page_script_hash: String },
    /// A full run reached a terminal state and the session was finalized.
    ScriptStoppedWithSuccess,
    /// The requested page failed to compile; the session stays alive.
    ScriptStoppedWithCompileError { error: CompileError },
    /// The run was abandoned mid-flight in favor of a newer rerun request.
    ScriptStoppedForRerun,
    /// A fragment-scoped run completed.
    FragmentStoppedWithSuccess,
    /// Always the final event; the worker thread is about to exit.
    Shutdown,
}

/// How a single run left the worker loop.
enum RunOutcome {
    Finished,
    Rerun(RerunData),
    Stop,
}

/// What the unwound user code turned out to mean.
enum Classified {
    Success,
    Rerun(RerunData),
    StopRunner,
    Exception {
        exception_type: &'static str,
        message: String,
    },
}

fn usage_exception_type(error: &UsageError) -> &'static str {
    match error {
        UsageError::DuplicateWidgetId { .. } => "DuplicateWidgetId",
        UsageError::DuplicateWidgetKey { .. } => "DuplicateWidgetKey",
        UsageError::InvalidWidgetArgs { .. } => "InvalidWidgetArgs",
        UsageError::BadAppendTarget { .. } => "BadAppendTarget",
    }
}

struct RunnerInner {
    session_id: String,
    state: SessionStateHandle,
    requests: Arc<ScriptRequests>,
    queue: ForwardQueue,
    cache: Arc<dyn ScriptCache>,
    media: Arc<dyn MediaRegistry>,
    fragments: FragmentStorage,
    events: Sender<ScriptRunnerEvent>,
}

/// Executes script runs for one session on a dedicated worker thread.
///
/// The runner owns nothing the session needs to survive it: state, request
/// mailbox, and forward queue are shared handles, so a runner can be torn
/// down and a fresh one started against the same session.
pub struct ScriptRunner {
    inner: Arc<RunnerInner>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ScriptRunner {
    /// `fragments` is session-owned: a session may run several runners over
    /// its lifetime (one per burst of activity) and stored fragment bodies
    /// must survive from one runner to the next.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        state: SessionStateHandle,
        requests: Arc<ScriptRequests>,
        queue: ForwardQueue,
        cache: Arc<dyn ScriptCache>,
        media: Arc<dyn MediaRegistry>,
        fragments: FragmentStorage,
    ) -> (Self, Receiver<ScriptRunnerEvent>) {
        let (events, receiver) = unbounded();
        let inner = Arc::new(RunnerInner {
            session_id: session_id.into(),
            state,
            requests,
            queue,
            cache,
            media,
            fragments,
            events,
        });
        (
            ScriptRunner {
                inner,
                worker: None,
            },
            receiver,
        )
    }

    /// Spawns the worker thread. A rerun request should already be pending,
    /// otherwise the runner observes an idle mailbox and shuts down at once.
    pub fn start(&mut self) {
        debug_assert!(self.worker.is_none(), "runner already started");
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("rill-script-runner".to_owned())
            .spawn(move || RunnerInner::run_loop(inner))
            .unwrap_or_else(|err| panic!("failed to spawn script runner thread: {err}"));
        self.worker = Some(handle);
    }

    /// Forwards a rerun request to the coordinator. Returns false if the
    /// runner has already been stopped; the caller should start a new runner.
    pub fn request_rerun(&self, data: RerunData) -> bool {
        self.inner.requests.request_rerun(data)
    }

    pub fn request_stop(&self) {
        self.inner.requests.request_stop();
    }

    /// Blocks until the worker thread exits.
    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("script runner worker thread panicked");
            }
        }
    }
}

impl RunnerInner {
    fn run_loop(inner: Arc<RunnerInner>) {
        // Survives across runs within this runner; fragment runs reset only
        // the identities they own.
        let mut identity = IdentityRegistry::new();
        let mut immediate: Option<RerunData> = None;
        loop {
            let data = match immediate.take() {
                Some(data) => data,
                None => match inner.requests.on_scriptrunner_ready() {
                    ScriptRequest::Rerun(data) => data,
                    _ => break,
                },
            };
            match inner.run_script(data, &mut identity) {
                RunOutcome::Finished => {}
                RunOutcome::Rerun(next) => immediate = Some(next),
                RunOutcome::Stop => break,
            }
        }
        let _ = inner.events.send(ScriptRunnerEvent::Shutdown);
    }

    fn run_script(&self, data: RerunData, identity: &mut IdentityRegistry) -> RunOutcome {
        let fragment_queue = if data.is_fragment_run() {
            if data.fragment_id_queue.is_empty() {
                data.fragment_id.iter().cloned().collect()
            } else {
                data.fragment_id_queue.clone()
            }
        } else {
            Vec::new()
        };
        let is_fragment_run = !fragment_queue.is_empty();

        let page = if is_fragment_run {
            None
        } else {
            match self.cache.resolve(&data.page_script_hash, &data.page_name) {
                Ok(PageLookup::Found(page)) => Some(page),
                Ok(PageLookup::NotFound { fallback }) => {
                    log::info!("page `{}` not found, falling back to main", data.page_name);
                    self.queue.enqueue(ForwardMsg::PageNotFound {
                        page_name: data.page_name.clone(),
                    });
                    Some(fallback)
                }
                Err(error) => {
                    log::warn!("script compile failed: {error}");
                    let _ = self
                        .events
                        .send(ScriptRunnerEvent::ScriptStoppedWithCompileError { error });
                    return RunOutcome::Finished;
                }
            }
        };
        let (page_script_hash, page_name) = match &page {
            Some(page) => (page.script_hash.clone(), page.name.clone()),
            None => (data.page_script_hash.clone(), data.page_name.clone()),
        };

        let _ = self.events.send(ScriptRunnerEvent::ScriptStarted {
            page_script_hash: page_script_hash.clone(),
        });
        log::debug!(
            "session {}: starting {} run of `{}`",
            self.session_id,
            if is_fragment_run { "fragment" } else { "full" },
            page_name
        );

        if !is_fragment_run {
            identity.begin_run();
            self.fragments.clear();
            self.media.clear_session_refs(&self.session_id);
        }

        // Callbacks fire for widgets whose client value changed; they run on
        // this thread, before the body, inside the unwind boundary.
        let callbacks = self.state.on_script_will_rerun(data.widget_states.clone());

        let ctx = RunContext::new(
            self.session_id.clone(),
            self.state.clone(),
            Arc::clone(&self.requests),
            DeltaBuilder::new(self.queue.clone()),
            mem::take(identity),
            self.fragments.clone(),
            data.query_string.clone(),
            page_script_hash,
            page_name,
        );
        context::attach(ctx);

        let fragments = self.fragments.clone();
        let result = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), UsageError> {
            for callback in callbacks {
                callback();
            }
            if is_fragment_run {
                for fragment_id in &fragment_queue {
                    let Some(stored) = fragments.get(fragment_id) else {
                        log::warn!("fragment `{fragment_id}` is not registered, skipping");
                        continue;
                    };
                    context::with_run_ctx(|ctx| ctx.begin_fragment_rerun(fragment_id, &stored));
                    let body_result = (stored.body)();
                    context::with_run_ctx(|ctx| ctx.end_fragment_rerun());
                    body_result?;
                }
            } else if let Some(page) = &page {
                (page.body)()?;
            }
            Ok(())
        }));

        let mut ctx = context::detach().unwrap_or_else(|| {
            panic!("internal error: run context lost during script execution")
        });

        let classified = match result {
            Ok(Ok(())) => Classified::Success,
            Ok(Err(error)) => Classified::Exception {
                exception_type: usage_exception_type(&error),
                message: error.to_string(),
            },
            Err(payload) => match payload.downcast::<ScriptControl>() {
                Ok(control) => match *control {
                    ScriptControl::Rerun(next) => Classified::Rerun(next),
                    ScriptControl::Finish => Classified::Success,
                    ScriptControl::Stop => Classified::StopRunner,
                },
                Err(payload) => Classified::Exception {
                    exception_type: "ScriptPanic",
                    message: control::panic_message(payload.as_ref()),
                },
            },
        };

        if let Classified::Exception {
            exception_type,
            message,
        } = &classified
        {
            log::info!("script raised {exception_type}: {message}");
            ctx.render_exception(exception_type, message.clone());
        }

        let (identity_back, active) = ctx.into_parts();
        *identity = identity_back;

        match classified {
            Classified::Success | Classified::Exception { .. } => {
                if is_fragment_run {
                    let _ = self.events.send(ScriptRunnerEvent::FragmentStoppedWithSuccess);
                } else {
                    self.state.on_script_finished(&active);
                    self.media.remove_orphaned_files();
                    let _ = self.events.send(ScriptRunnerEvent::ScriptStoppedWithSuccess);
                }
                RunOutcome::Finished
            }
            Classified::Rerun(next) => {
                let _ = self.events.send(ScriptRunnerEvent::ScriptStoppedForRerun);
                RunOutcome::Rerun(next)
            }
            Classified::StopRunner => {
                // The run was cut short, so no pruning: widgets below the
                // interruption point never got a chance to re-register.
                let _ = self.events.send(ScriptRunnerEvent::ScriptStoppedWithSuccess);
                RunOutcome::Stop
            }
        }
    }
}
