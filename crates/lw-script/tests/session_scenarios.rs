//! End-to-end session scenario tests for the script engine.

use std::cell::RefCell;
use std::rc::Rc;

use lw_script::{ScriptEngine, compile_source};
use lw_session::{
    SaveState, SessionConfig, SessionError, SessionPhase, StorySession, TagMap, Value,
};

const SAMPLE: &str = include_str!("fixtures/sample.story");

fn sample() -> StorySession<ScriptEngine> {
    let mut session = StorySession::new(ScriptEngine::new());
    session.load_from_compiled_form(SAMPLE).unwrap();
    session
}

fn compiled(source: &str) -> String {
    compile_source(source).story.unwrap().to_json().unwrap()
}

// ---------------------------------------------------------------------------
// loading
// ---------------------------------------------------------------------------

#[test]
fn hello_world() {
    let mut session = StorySession::new(ScriptEngine::new());
    session
        .load_from_compiled_form("Hello, World!\n-> END")
        .unwrap();
    assert_eq!(session.current_text(), "Hello, World!\n");
    assert!(!session.can_continue());
    assert!(session.options().is_empty());
    assert_eq!(session.phase(), SessionPhase::Ended);
}

#[test]
fn sample_starts_on_first_line() {
    let session = sample();
    assert_eq!(session.current_text(), "Line 1\n");
    assert!(session.can_continue());
    assert!(session.current_tags().is_empty());
    assert_eq!(session.phase(), SessionPhase::Continuing);
}

#[test]
fn unknown_divert_fails_to_compile() {
    let mut session = StorySession::new(ScriptEngine::new());
    let err = session.load_from_compiled_form("Hello,\n-> Foo").unwrap_err();
    assert!(matches!(err, SessionError::Compile(_)));
    assert_eq!(session.phase(), SessionPhase::Idle);
    assert_eq!(session.current_text(), "");
}

#[test]
fn misspelled_end_fails_to_compile() {
    let mut session = StorySession::new(ScriptEngine::new());
    assert!(session.load_from_compiled_form("-> End").is_err());
    assert!(!session.is_loaded());
}

#[test]
fn serialized_form_loads_and_advances() {
    let mut session = StorySession::new(ScriptEngine::new());
    session.load_from_serialized_form(&compiled("Hello, World!\n-> END\n"));
    assert_eq!(session.current_text(), "Hello, World!\n");
    assert!(session.current_errors().is_empty());
}

#[test]
fn bad_serialized_form_is_advisory() {
    let mut session = StorySession::new(ScriptEngine::new());
    session.load_from_serialized_form("{ definitely not a story");
    assert!(!session.is_loaded());
    assert_eq!(session.current_errors().len(), 1);
    assert!(session.state().last_failure.is_some());
}

#[test]
fn story_errors_are_advisory_and_clear_on_advance() {
    let mut session = StorySession::new(ScriptEngine::new());
    session
        .load_from_compiled_form("VAR x = 1\n~ x = x / 0\nStill here\nAnd on\n")
        .unwrap();
    assert_eq!(session.current_text(), "Still here\n");
    assert_eq!(session.current_errors(), ["division by zero"]);
    assert_eq!(session.phase(), SessionPhase::Errored);
    assert!(session.can_continue());
    assert_eq!(session.read_variable("x"), Value::Int(1));

    session.advance();
    assert!(session.current_errors().is_empty());
    assert_eq!(session.current_text(), "And on\n");
    assert_eq!(session.phase(), SessionPhase::Ended);
}

// ---------------------------------------------------------------------------
// knots, stitches and choices
// ---------------------------------------------------------------------------

#[test]
fn jump_to_knot() {
    let mut session = sample();
    session.jump_to("Knot1", None);
    assert_eq!(session.current_text(), "Move to knot1\n");
}

#[test]
fn jump_to_stitch() {
    let mut session = sample();
    session.jump_to("Knot2", Some("stitch1"));
    assert_eq!(session.current_text(), "You are now at stitch 1\n");
}

#[test]
fn jump_to_missing_path_is_advisory() {
    let mut session = sample();
    session.jump_to("Nowhere", None);
    assert_eq!(session.current_text(), "Line 1\n");
    assert!(
        session
            .state()
            .last_failure
            .as_deref()
            .is_some_and(|f| f.contains("Nowhere"))
    );
}

#[test]
fn choices_are_presented_and_taken() {
    let mut session = sample();
    session.jump_to("Choice", None);
    assert_eq!(session.current_text(), "Choice 1\n");
    assert!(!session.can_continue());
    assert_eq!(session.phase(), SessionPhase::PresentingChoices);

    let texts: Vec<&str> = session.options().iter().map(|c| c.text()).collect();
    assert_eq!(texts, vec!["Option 1", "Option 2"]);

    session.choose_option(1);
    assert_eq!(session.current_text(), "You chose option 2\n");
    assert!(session.options().is_empty());
}

#[test]
fn choose_then_sees_refreshed_state() {
    let mut session = sample();
    session.jump_to("Choice", None);

    let seen = Rc::new(RefCell::new(String::new()));
    let sink = Rc::clone(&seen);
    session.choose_option_then(0, move |state| {
        *sink.borrow_mut() = state.current_text.clone();
    });
    assert_eq!(seen.borrow().as_str(), "You chose option 1\n");
}

#[test]
fn invalid_choice_leaves_options_in_place() {
    let mut session = sample();
    session.jump_to("Choice", None);
    session.choose_option(7);
    assert_eq!(session.options().len(), 2);
    assert!(session.state().last_failure.is_some());
}

// ---------------------------------------------------------------------------
// tags
// ---------------------------------------------------------------------------

#[test]
fn bare_tag() {
    let mut session = sample();
    session.jump_to("Tags", Some("EmptyTag"));
    assert_eq!(
        session.current_tags().get("testTag").map(String::as_str),
        Some("testTag")
    );
}

#[test]
fn value_tag() {
    let mut session = sample();
    session.jump_to("Tags", Some("ValueTag"));
    assert_eq!(
        session.current_tags().get("testTag2").map(String::as_str),
        Some("tag2Value")
    );
}

#[test]
fn image_tag_is_retained() {
    let mut session = sample();
    session.jump_to("Tags", Some("RetainTag"));
    assert_eq!(
        session.current_tags().get("IMAGE").map(String::as_str),
        Some("retain.png")
    );
    session.advance();
    assert_eq!(session.current_text(), "Gulls overhead\n");
    assert_eq!(
        session.current_tags().get("IMAGE").map(String::as_str),
        Some("retain.png")
    );
}

#[test]
fn other_tags_are_dropped() {
    let mut session = sample();
    session.jump_to("Tags", Some("NonRetainTag"));
    assert!(session.current_tags().contains_key("nonRetainTag"));
    session.advance();
    assert!(session.current_tags().is_empty());
}

#[test]
fn retention_can_be_disabled() {
    let engine = ScriptEngine::new();
    let mut session =
        StorySession::with_config(engine, SessionConfig::new().without_retained_tags());
    session.load_from_compiled_form(SAMPLE).unwrap();
    session.jump_to("Tags", Some("RetainTag"));
    session.advance();
    assert!(session.current_tags().is_empty());
}

#[test]
fn global_tags_are_kept() {
    let mut session = StorySession::new(ScriptEngine::new());
    session
        .load_from_compiled_form("# title: The Harbor\n# author\nHello\n-> END\n")
        .unwrap();
    let expected = TagMap::from([
        ("author".to_string(), "author".to_string()),
        ("title".to_string(), "The Harbor".to_string()),
    ]);
    assert_eq!(session.global_tags(), &expected);
    assert!(session.current_tags().is_empty());
}

// ---------------------------------------------------------------------------
// variables
// ---------------------------------------------------------------------------

#[test]
fn read_declared_variables() {
    let session = sample();
    assert_eq!(session.read_variable("stringVar"), Value::from("Initial"));
    assert_eq!(session.read_variable("intVar"), Value::Int(0));
    assert_eq!(session.read_variable("doubleVar"), Value::Float(0.1));
    assert!(session.read_variable("notDeclared").is_null());
}

#[test]
fn set_variables_of_each_type() {
    let mut session = sample();
    session.set_variable("stringVar", "Value Set");
    session.set_variable("intVar", 1);
    session.set_variable("doubleVar", 1.1);
    assert_eq!(session.read_variable("stringVar"), Value::from("Value Set"));
    assert_eq!(session.read_variable("intVar"), Value::Int(1));
    assert_eq!(session.read_variable("doubleVar"), Value::Float(1.1));
    assert!(session.state().last_failure.is_none());
}

#[test]
fn set_variable_shows_in_text() {
    let mut session = sample();
    session.set_variable("stringVar", "changed");
    assert_eq!(session.advance(), "Line 2 changed\n");
}

#[test]
fn set_undeclared_variable_is_advisory() {
    let mut session = sample();
    session.set_variable("notDeclared", 3);
    assert!(session.state().last_failure.is_some());
    assert!(session.read_variable("notDeclared").is_null());
}

#[test]
fn observed_variable_tracks_turns() {
    let mut session = sample();
    session.register_observed_variable("counter");
    assert_eq!(session.observed_variables()["counter"], Value::Null);

    session.jump_to("Counter", None);
    assert_eq!(session.observed_variables()["counter"], Value::Int(0));
    session.advance();
    assert_eq!(session.observed_variables()["counter"], Value::Int(1));
    session.advance();
    assert_eq!(session.observed_variables()["counter"], Value::Int(2));
    assert_eq!(session.current_text(), "Counted twice\n");
}

#[test]
fn serialized_story_keeps_its_logic() {
    let mut session = StorySession::new(ScriptEngine::new());
    session.load_from_serialized_form(&compiled(SAMPLE));
    assert!(session.current_errors().is_empty());
    session.register_observed_variable("counter");

    session.jump_to("Counter", None);
    assert_eq!(session.observed_variables()["counter"], Value::Int(0));
    session.advance();
    assert_eq!(session.observed_variables()["counter"], Value::Int(1));
    session.advance();
    assert_eq!(session.observed_variables()["counter"], Value::Int(2));
}

#[test]
fn observed_variable_follows_set_variable() {
    let mut session = sample();
    session.register_observed_variable("intVar");
    session.set_variable("intVar", 5);
    assert_eq!(session.observed_variables()["intVar"], Value::Int(5));

    session.deregister_observed_variable("intVar");
    assert!(session.observed_variables().is_empty());
}

// ---------------------------------------------------------------------------
// save / restore
// ---------------------------------------------------------------------------

#[test]
fn save_envelope_has_both_fields() {
    let mut session = sample();
    session.jump_to("Tags", Some("RetainTag"));
    let text = session.save();
    let envelope = SaveState::decode(&text).unwrap();
    assert_eq!(
        envelope.current_tags.get("IMAGE").map(String::as_str),
        Some("retain.png")
    );
    assert!(!envelope.json_state.is_empty());
    assert!(text.find("jsonState") < text.find("currentTags"));
}

#[test]
fn restore_round_trip() {
    let mut session = sample();
    session.jump_to("Tags", Some("RetainTag"));
    let saved = session.save();
    let text = session.current_text().to_string();
    let can_continue = session.can_continue();
    let tags = session.current_tags().clone();

    session.jump_to("Knot1", None);
    assert_eq!(session.current_text(), "Move to knot1\n");

    session.restore(&saved);
    assert_eq!(session.current_text(), text);
    assert_eq!(session.can_continue(), can_continue);
    assert_eq!(session.current_tags(), &tags);
    assert!(session.state().last_failure.is_none());

    session.advance();
    assert_eq!(session.current_text(), "Gulls overhead\n");
}

#[test]
fn restore_brings_back_variables_and_choices() {
    let mut session = sample();
    session.set_variable("intVar", 2);
    session.jump_to("Choice", None);
    let saved = session.save();

    session.choose_option(0);
    session.set_variable("intVar", 9);

    session.restore(&saved);
    assert_eq!(session.read_variable("intVar"), Value::Int(2));
    assert_eq!(session.options().len(), 2);
    assert_eq!(session.phase(), SessionPhase::PresentingChoices);
}

#[test]
fn restore_garbage_leaves_session_alone() {
    let mut session = sample();
    let before = session.state().clone();
    session.restore("not an envelope");
    assert_eq!(session.current_text(), before.current_text);
    assert_eq!(session.current_tags(), &before.current_tags);
    assert!(session.state().last_failure.is_some());
}

#[test]
fn restore_rejects_foreign_state() {
    let mut session = sample();
    let envelope = SaveState::new(r#"{"pc": 100000}"#, TagMap::new())
        .encode(true)
        .unwrap();
    assert!(matches!(
        session.try_restore(&envelope),
        Err(SessionError::Operation { operation: "restore", .. })
    ));
}

// ---------------------------------------------------------------------------
// subscriptions
// ---------------------------------------------------------------------------

#[test]
fn subscribers_see_whole_snapshots() {
    let mut session = sample();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let id = session.subscribe(move |state| {
        sink.borrow_mut().push(state.current_text.clone());
    });

    session.advance();
    session.jump_to("Knot1", None);
    assert!(session.unsubscribe(id));
    session.jump_to("Knot2", Some("stitch1"));

    assert_eq!(
        seen.borrow().as_slice(),
        ["Line 2 Initial\n", "Move to knot1\n"]
    );
}
