use std::panic;

use rill_core::RerunData;

/// Non-local control-flow signal used to unwind user frames back to the run
/// loop.
///
/// Raised as a panic payload at the runner's checkpoints and caught only at
/// the single run-loop boundary; script code never observes it. It is
/// deliberately not an error type: generic error handling inside a script
/// cannot swallow an interruption.
#[derive(Debug)]
pub enum ScriptControl {
    /// Unwind the current run and restart with this data.
    Rerun(RerunData),
    /// End the current script run early, as if it ran to completion.
    Finish,
    /// Unwind and shut the runner down.
    Stop,
}

pub(crate) fn raise(control: ScriptControl) -> ! {
    panic::panic_any(control)
}

/// Best-effort text for an arbitrary user panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "script panicked".to_owned()
    }
}
