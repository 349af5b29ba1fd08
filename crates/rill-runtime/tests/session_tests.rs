use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rill_core::{
    Coordinate, Delta, ForwardMsg, RerunData, RootContainer, StateKey, UsageError, Value,
};
use rill_runtime::{
    fragment, query_string, rerun, session_get, session_set, stop, CompileError, PageLookup,
    PageRegistry, ScriptCache, ScriptPage, ScriptRunnerEvent,
};
use rill_testing::TestSession;
use rill_widgets::{button, checkbox, container, dataframe, slider, text, Button, Checkbox};

fn coords(deltas: &[Delta]) -> Vec<Coordinate> {
    deltas.iter().map(|d| d.coordinate().clone()).collect()
}

fn coord(path: &[u32], index: u32) -> Coordinate {
    Coordinate {
        container: RootContainer::Main,
        path: path.to_vec(),
        index,
    }
}

fn assert_success(events: &[ScriptRunnerEvent]) {
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ScriptRunnerEvent::ScriptStoppedWithSuccess)),
        "expected a successful run, got {events:?}"
    );
}

#[test]
fn unchanged_script_produces_identical_coordinates_across_runs() {
    let session = TestSession::run(|| {
        text("one");
        container(|| {
            text("inner");
            Ok(())
        })?;
        text("two");
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    let first = coords(&session.drain_deltas());

    session.request_rerun(RerunData::default());
    assert_success(&session.wait_for_run_end());
    let second = coords(&session.drain_deltas());

    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![coord(&[], 0), coord(&[], 1), coord(&[1], 0), coord(&[], 2)]
    );
}

#[test]
fn widget_value_survives_rerun_and_drives_conditionals() {
    let session = TestSession::run(|| {
        let show = checkbox("show", false)?;
        if show {
            text("revealed");
        }
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    let first = session.drain_deltas();
    assert_eq!(first.len(), 1, "only the checkbox renders initially");

    let id = Checkbox::new("show", false).widget_id();
    assert_success(&session.interact(id, Value::Bool(true)));
    let second = session.drain_deltas();
    assert!(
        second
            .iter()
            .any(|d| matches!(d, Delta::NewElement { element, .. } if element.type_name() == "text")),
        "checked state should reveal the text element"
    );

    // A rerun with no new interaction keeps the client-reported value.
    session.request_rerun(RerunData::default());
    assert_success(&session.wait_for_run_end());
    let third = session.drain_deltas();
    assert_eq!(third.len(), 2);
}

#[test]
fn button_press_reads_true_for_exactly_one_run() {
    let clicks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&clicks);
    let session = TestSession::run(move || {
        if button("go")? {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    assert_eq!(clicks.load(Ordering::SeqCst), 0);

    let id = Button::new("go").widget_id();
    assert_success(&session.interact(id, Value::Bool(true)));
    assert_eq!(clicks.load(Ordering::SeqCst), 1);

    session.request_rerun(RerunData::default());
    assert_success(&session.wait_for_run_end());
    assert_eq!(clicks.load(Ordering::SeqCst), 1, "trigger must reset");
}

#[test]
fn on_change_fires_once_per_value_change_before_the_body() {
    let changes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&changes);
    let session = TestSession::run(move || {
        let counter = Arc::clone(&counter);
        Checkbox::new("agree", false)
            .on_change(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .call()?;
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    assert_eq!(changes.load(Ordering::SeqCst), 0);

    let id = Checkbox::new("agree", false).widget_id();
    assert_success(&session.interact(id.clone(), Value::Bool(true)));
    assert_eq!(changes.load(Ordering::SeqCst), 1);

    // Same value again: no change, no callback.
    assert_success(&session.interact(id, Value::Bool(true)));
    assert_eq!(changes.load(Ordering::SeqCst), 1);
}

#[test]
fn int_slider_coerces_whole_client_floats() {
    let seen = Arc::new(AtomicUsize::new(0));
    let latest = Arc::clone(&seen);
    let session = TestSession::run(move || {
        let n = slider("count", 0_i64, 100, 10)?;
        latest.store(n as usize, Ordering::SeqCst);
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    assert_eq!(seen.load(Ordering::SeqCst), 10);
    session.drain_deltas();

    let id = rill_widgets::Slider::new("count", 0_i64, 100, 10).widget_id();
    assert_success(&session.interact(id, Value::Float(42.0)));
    assert_eq!(seen.load(Ordering::SeqCst), 42);

    // The re-emitted element still carries the initial render default; the
    // live value travels only through widget states.
    let slider_element = session.drain_deltas().into_iter().find_map(|d| match d {
        Delta::NewElement {
            element: element @ rill_core::Element::Slider { .. },
            ..
        } => Some(element),
        _ => None,
    });
    match slider_element {
        Some(rill_core::Element::Slider { default, .. }) => assert_eq!(default, 10.0),
        other => panic!("expected a slider element in the rerun, got {other:?}"),
    }
}

#[test]
fn session_state_prunes_widgets_that_stopped_rendering() {
    let session = TestSession::run(|| {
        let show = checkbox("show", true)?;
        if show {
            button("inner")?;
        }
        Ok(())
    });
    assert_success(&session.wait_for_run_end());

    let inner_id = Button::new("inner").widget_id();
    let show_id = Checkbox::new("show", true).widget_id();
    session.state().with(|state| {
        assert!(state.contains(&StateKey::Widget(inner_id.clone())));
    });

    // Unchecking removes the button from the script; its entry must go.
    assert_success(&session.interact(show_id, Value::Bool(false)));
    session.state().with(|state| {
        assert!(!state.contains(&StateKey::Widget(inner_id.clone())));
    });
}

#[test]
fn user_state_keys_survive_pruning() {
    let session = TestSession::run(|| {
        session_set("visits", session_get("visits").and_then(|v| v.as_i64()).unwrap_or(0) + 1);
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    session.request_rerun(RerunData::default());
    assert_success(&session.wait_for_run_end());
    assert_eq!(session.state().get_user("visits"), Some(Value::Int(2)));
}

#[test]
fn script_rerun_api_restarts_until_condition_holds() {
    let session = TestSession::run(|| {
        let n = session_get("n").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
        session_set("n", n);
        if n < 3 {
            rerun();
        }
        Ok(())
    });
    let events = session.wait_for_run_end();
    let rerun_stops = events
        .iter()
        .filter(|e| matches!(e, ScriptRunnerEvent::ScriptStoppedForRerun))
        .count();
    assert_eq!(rerun_stops, 2);
    assert_success(&events);
    assert_eq!(session.state().get_user("n"), Some(Value::Int(3)));
}

#[test]
fn script_stop_api_ends_the_run_cleanly() {
    let session = TestSession::run(|| -> Result<(), UsageError> {
        text("kept");
        stop()
    });
    assert_success(&session.wait_for_run_end());
    let deltas = session.drain_deltas();
    assert_eq!(deltas.len(), 1);
}

#[test]
fn external_stop_interrupts_a_running_script() {
    let session = TestSession::run(|| -> Result<(), UsageError> {
        loop {
            text("tick");
            thread::sleep(Duration::from_millis(5));
        }
    });
    thread::sleep(Duration::from_millis(30));
    assert!(!session.drain_deltas().is_empty());
    let events = session.stop_and_join();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, ScriptRunnerEvent::Shutdown)),
        "runner must shut down after an external stop: {events:?}"
    );
}

#[test]
fn duplicate_widget_renders_exception_and_finishes_the_run() {
    let session = TestSession::run(|| {
        button("twice")?;
        button("twice")?;
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    let deltas = session.drain_deltas();
    let exception = deltas.iter().find_map(|d| match d {
        Delta::NewElement { element, .. } if element.type_name() == "exception" => Some(element),
        _ => None,
    });
    match exception {
        Some(rill_core::Element::Exception { exception_type, .. }) => {
            assert_eq!(exception_type, "DuplicateWidgetId");
        }
        other => panic!("expected an exception element, got {other:?}"),
    }
}

#[test]
fn duplicate_key_is_reported_with_the_key() {
    let session = TestSession::run(|| {
        Button::new("a").key("k").call()?;
        Button::new("a").key("k").call()?;
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    let deltas = session.drain_deltas();
    assert!(deltas.iter().any(|d| matches!(
        d,
        Delta::NewElement {
            element: rill_core::Element::Exception { exception_type, message },
            ..
        } if exception_type == "DuplicateWidgetKey" && message.contains("`k`")
    )));
}

#[test]
fn script_panic_renders_exception_and_run_completes() {
    let session = TestSession::run(|| -> Result<(), UsageError> {
        text("first");
        panic!("boom");
    });
    assert_success(&session.wait_for_run_end());
    let deltas = session.drain_deltas();
    assert!(deltas.iter().any(|d| matches!(
        d,
        Delta::NewElement {
            element: rill_core::Element::Exception { exception_type, message },
            ..
        } if exception_type == "ScriptPanic" && message == "boom"
    )));
}

#[test]
fn scripts_can_render_caught_errors_as_exception_elements() {
    let session = TestSession::run(|| {
        if let Err(err) = rill_widgets::selectbox("pick", Vec::<String>::new(), 0) {
            rill_widgets::exception(&err);
        }
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    let deltas = session.drain_deltas();
    assert!(deltas.iter().any(|d| matches!(
        d,
        Delta::NewElement {
            element: rill_core::Element::Exception { exception_type, .. },
            ..
        } if exception_type == "UsageError"
    )));
}

struct FailingCache;

impl ScriptCache for FailingCache {
    fn resolve(&self, _hash: &str, page_name: &str) -> Result<PageLookup, CompileError> {
        Err(CompileError::Compile {
            page_name: if page_name.is_empty() { "main" } else { page_name }.to_owned(),
            message: "unexpected token".to_owned(),
        })
    }
}

#[test]
fn compile_error_emits_event_without_touching_the_screen() {
    let session = TestSession::with_cache(Arc::new(FailingCache));
    let events = session.wait_for_run_end();
    assert!(events.iter().any(|e| matches!(
        e,
        ScriptRunnerEvent::ScriptStoppedWithCompileError {
            error: CompileError::Compile { message, .. }
        } if message == "unexpected token"
    )));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, ScriptRunnerEvent::ScriptStarted { .. })),
        "a run that fails to compile never starts"
    );
    assert!(session.drain_messages().is_empty());
}

#[test]
fn unknown_page_falls_back_to_main_and_reports_it() {
    let mut registry = PageRegistry::with_main("main", || {
        text("main page");
        Ok(())
    });
    registry.add_page("settings", || {
        text("settings page");
        Ok(())
    });
    let session = TestSession::with_cache(Arc::new(registry));
    assert_success(&session.wait_for_run_end());
    session.drain_messages();

    session.request_rerun(RerunData {
        page_name: "missing".to_owned(),
        ..RerunData::default()
    });
    assert_success(&session.wait_for_run_end());
    let messages = session.drain_messages();
    assert!(messages
        .iter()
        .any(|m| matches!(m, ForwardMsg::PageNotFound { page_name } if page_name == "missing")));
    assert!(messages.iter().any(|m| matches!(
        m,
        ForwardMsg::Delta(Delta::NewElement { element: rill_core::Element::Text { body }, .. })
            if body == "main page"
    )));
}

#[test]
fn switching_pages_runs_the_requested_page() {
    let mut registry = PageRegistry::with_main("main", || {
        text("main page");
        Ok(())
    });
    registry.add_page("settings", || {
        text("settings page");
        Ok(())
    });
    let settings_hash = ScriptPage::new("settings", || Ok(())).script_hash;
    let session = TestSession::with_cache(Arc::new(registry));
    assert_success(&session.wait_for_run_end());
    session.drain_messages();

    session.request_rerun(RerunData {
        page_name: "settings".to_owned(),
        ..RerunData::default()
    });
    let events = session.wait_for_run_end();
    assert!(events.iter().any(|e| matches!(
        e,
        ScriptRunnerEvent::ScriptStarted { page_script_hash } if *page_script_hash == settings_hash
    )));
    assert!(session.drain_deltas().iter().any(|d| matches!(
        d,
        Delta::NewElement { element: rill_core::Element::Text { body }, .. }
            if body == "settings page"
    )));
}

#[test]
fn query_string_reaches_the_script() {
    let session = TestSession::run(|| {
        session_set("qs", query_string());
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    assert_eq!(session.state().get_user("qs"), Some(Value::Text(String::new())));

    session.request_rerun(RerunData {
        query_string: "tab=2".to_owned(),
        ..RerunData::default()
    });
    assert_success(&session.wait_for_run_end());
    assert_eq!(
        session.state().get_user("qs"),
        Some(Value::Text("tab=2".to_owned()))
    );
}

#[test]
fn add_rows_appends_to_the_original_coordinate() {
    let session = TestSession::run(|| {
        text("title");
        let table = dataframe(["a", "b"], vec![vec![Value::Int(1), Value::Int(2)]])?;
        text("middle");
        table.add_rows(vec![vec![Value::Int(3), Value::Int(4)]])?;
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    let deltas = session.drain_deltas();
    let table_coord = coord(&[], 1);
    assert!(deltas.iter().any(|d| matches!(
        d,
        Delta::AddRows { coordinate, rows } if *coordinate == table_coord && rows.len() == 1
    )));
}

#[test]
fn fragment_rerun_replays_only_the_fragment_at_its_coordinates() {
    let runs = Arc::new(AtomicUsize::new(0));
    let full_runs = Arc::clone(&runs);
    let session = TestSession::run(move || {
        full_runs.fetch_add(1, Ordering::SeqCst);
        text("header");
        fragment("ticker", || {
            text("inside");
            Ok(())
        })?;
        text("footer");
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    let full = coords(&session.drain_deltas());
    assert_eq!(
        full,
        vec![coord(&[], 0), coord(&[], 1), coord(&[1], 0), coord(&[], 2)]
    );

    let events = session.rerun_fragment("ticker");
    assert!(events
        .iter()
        .any(|e| matches!(e, ScriptRunnerEvent::FragmentStoppedWithSuccess)));
    assert_eq!(runs.load(Ordering::SeqCst), 1, "main body must not rerun");
    let partial = coords(&session.drain_deltas());
    assert_eq!(partial, vec![coord(&[1], 0)]);
}

#[test]
fn fragment_rerun_keeps_main_script_widget_state() {
    let session = TestSession::run(|| {
        checkbox("outer", true)?;
        fragment("frag", || {
            button("inner")?;
            Ok(())
        })?;
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    session.rerun_fragment("frag");

    let outer = Checkbox::new("outer", true).widget_id();
    session.state().with(|state| {
        assert!(state.contains(&StateKey::Widget(outer.clone())));
    });
}

#[test]
fn fragment_rerun_does_not_trip_duplicate_detection() {
    // The fragment re-registers its own widget; ids owned by the main body
    // stay registered and must not collide with it.
    let session = TestSession::run(|| {
        button("outer")?;
        fragment("frag", || {
            button("inner")?;
            Ok(())
        })?;
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    session.drain_deltas();

    let events = session.rerun_fragment("frag");
    assert!(events
        .iter()
        .any(|e| matches!(e, ScriptRunnerEvent::FragmentStoppedWithSuccess)));
    let deltas = session.drain_deltas();
    assert!(
        !deltas
            .iter()
            .any(|d| matches!(d, Delta::NewElement { element, .. } if element.type_name() == "exception")),
        "fragment rerun raised a duplicate-id exception: {deltas:?}"
    );
}

#[test]
fn widget_states_reach_widgets_registered_by_a_keyed_loop() {
    let total = Arc::new(AtomicUsize::new(0));
    let sum = Arc::clone(&total);
    let session = TestSession::run(move || {
        let mut checked = 0;
        for i in 0..3 {
            if Checkbox::new("item", false).key(format!("item-{i}")).call()? {
                checked += 1;
            }
        }
        sum.store(checked, Ordering::SeqCst);
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    assert_eq!(total.load(Ordering::SeqCst), 0);

    let id_of = |i: usize| Checkbox::new("item", false).key(format!("item-{i}")).widget_id();
    assert_success(&session.interact_many(vec![
        (id_of(0), Value::Bool(true)),
        (id_of(2), Value::Bool(true)),
    ]));
    assert_eq!(total.load(Ordering::SeqCst), 2);
}

#[test]
fn forward_queue_preserves_emission_order() {
    let session = TestSession::run(|| {
        for i in 0..5 {
            text(format!("line {i}"));
        }
        Ok(())
    });
    assert_success(&session.wait_for_run_end());
    let deltas = session.drain_deltas();
    let indices: Vec<u32> = deltas.iter().map(|d| d.coordinate().index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
}

#[test]
fn idle_runner_shuts_down_after_its_last_request() {
    let session = TestSession::run(|| Ok(()));
    assert_success(&session.wait_for_run_end());
    let events = session.stop_and_join();
    assert!(events
        .iter()
        .any(|e| matches!(e, ScriptRunnerEvent::Shutdown)));
}

#[test]
fn interactions_mixing_widget_ids_coalesce_newer_wins() {
    // Two batches for the same widget submitted back to back while the
    // runner is busy: the script must observe the newer value.
    let observed = Arc::new(AtomicUsize::new(0));
    let latest = Arc::clone(&observed);
    let session = TestSession::run(move || {
        let n = slider("n", 0_i64, 100, 0)?;
        latest.store(n as usize, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Ok(())
    });
    assert_success(&session.wait_for_run_end());

    let id = rill_widgets::Slider::new("n", 0_i64, 100, 0).widget_id();
    session.request_rerun(RerunData::with_widget_states(
        [(id.clone(), Value::Int(1))].into_iter().collect(),
    ));
    session.request_rerun(RerunData::with_widget_states(
        [(id, Value::Int(2))].into_iter().collect(),
    ));
    // Both requests coalesce into at most two runs; the final observed value
    // must be the newest.
    loop {
        assert_success(&session.wait_for_run_end());
        if observed.load(Ordering::SeqCst) == 2 {
            break;
        }
    }
}
