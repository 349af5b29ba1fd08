#![doc = r"Script execution runtime: worker thread, run loop, and ambient run context."]

pub mod api;
pub mod context;
mod control;
pub mod fragment;
pub mod media;
pub mod pages;
pub mod runner;

pub use api::{fragment, query_string, rerun, session_get, session_set, stop};
pub use context::{with_run_ctx, RunContext};
pub use fragment::{FragmentStorage, StoredFragment};
pub use media::{MediaRegistry, NullMediaRegistry};
pub use pages::{CompileError, PageLookup, PageRegistry, ScriptCache, ScriptFn, ScriptPage};
pub use runner::{ScriptRunner, ScriptRunnerEvent};
