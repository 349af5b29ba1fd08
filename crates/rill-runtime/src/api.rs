//! Script-facing runtime APIs: control flow, user state, and fragments.
//!
//! Every function here requires a script run to be in progress on the
//! calling thread; they are meant to be called from page and fragment
//! bodies executing under the [`ScriptRunner`](crate::ScriptRunner).

use std::sync::Arc;

use rill_core::{StateKey, UsageError, Value};

use crate::context;
use crate::control::{self, ScriptControl};
use crate::pages::ScriptFn;

/// Abandons the current run and schedules an immediate rerun of the same
/// page with the same query context. Never returns.
pub fn rerun() -> ! {
    let data = context::with_run_ctx(|ctx| ctx.rerun_data_for_current_page());
    control::raise(ScriptControl::Rerun(data))
}

/// Ends the current run early, as if the script had run to completion.
/// Never returns.
pub fn stop() -> ! {
    control::raise(ScriptControl::Finish)
}

/// The query string the current run was started with.
pub fn query_string() -> String {
    context::with_run_ctx(|ctx| ctx.query_string().to_owned())
}

/// Reads a free-form session state key written by script code.
pub fn session_get(name: &str) -> Option<Value> {
    context::with_run_ctx(|ctx| ctx.state().get_user(name))
}

/// Writes a free-form session state key. The write is observed by the next
/// read of the same key, including in later runs.
pub fn session_set(name: impl Into<String>, value: impl Into<Value>) {
    let key = StateKey::User(name.into());
    let value = value.into();
    context::with_run_ctx(|ctx| ctx.state().set_pending(key, value));
}

/// Registers `body` as the fragment named `id` and runs it inline.
///
/// The fragment's elements render inside a dedicated block, and its body is
/// stored so a later fragment-scoped rerun can re-execute it in place
/// without rerunning the rest of the script.
pub fn fragment(
    id: impl Into<String>,
    body: impl Fn() -> Result<(), UsageError> + Send + Sync + 'static,
) -> Result<(), UsageError> {
    let id = id.into();
    let body: ScriptFn = Arc::new(body);
    context::with_run_ctx(|ctx| ctx.register_fragment(&id, Arc::clone(&body)));
    let result = body();
    context::with_run_ctx(|ctx| ctx.finish_fragment());
    result
}
