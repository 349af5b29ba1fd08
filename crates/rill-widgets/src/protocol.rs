use rill_core::{ChangeCallback, Element, UsageError, Value, WidgetId};
use rill_runtime::with_run_ctx;

/// Runs the widget registration protocol for one already-validated widget.
///
/// Order matters: uniqueness is checked before the value is resolved, the
/// value is resolved before metadata is recorded, and the element is
/// enqueued last, because enqueueing is the yield point that may unwind the
/// run.
pub(crate) fn register_widget(
    widget_type: &'static str,
    id: WidgetId,
    user_key: Option<&str>,
    element: Element,
    default: Value,
    trigger_resting: Option<Value>,
    on_change: Option<ChangeCallback>,
) -> Result<Value, UsageError> {
    with_run_ctx(|ctx| {
        ctx.identity_mut().check_unique(&id, widget_type, user_key)?;
        let value = ctx.state().get_or_default(&id, default);
        ctx.state()
            .register_widget(&id, value.clone(), trigger_resting, on_change);
        ctx.mark_active(&id);
        ctx.enqueue_element(element);
        Ok(value)
    })
}
