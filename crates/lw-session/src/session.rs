//! Story session management.
//!
//! `StorySession` owns one engine and republishes its state as a
//! [`SessionState`] snapshot. Every operation that can change the engine ends
//! in the same refresh routine, and subscribers receive the whole new snapshot
//! once that routine finishes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use tracing::{debug, info, warn};

use crate::choice::{Choice, choices_from_value};
use crate::config::SessionConfig;
use crate::engine::{EngineError, StoryEngine};
use crate::error::{SessionError, SessionResult};
use crate::observe::VariableRegistry;
use crate::save::SaveState;
use crate::state::{SessionPhase, SessionState};
use crate::tags::{TagMap, TagRetention, merge_tags};
use crate::value::Value;

/// Handle returned by [`StorySession::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&SessionState)>;

/// A story session driving one engine.
pub struct StorySession<E: StoryEngine> {
    engine: E,
    config: SessionConfig,
    retention: TagRetention,
    observed: VariableRegistry,
    state: SessionState,
    loaded: bool,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl<E: StoryEngine> fmt::Debug for StorySession<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorySession")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("loaded", &self.loaded)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl<E: StoryEngine> StorySession<E> {
    /// Create an idle session with the default configuration.
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, SessionConfig::default())
    }

    /// Create an idle session.
    pub fn with_config(engine: E, config: SessionConfig) -> Self {
        let retention = TagRetention::new(config.retained_tags.iter().cloned());
        Self {
            engine,
            config,
            retention,
            observed: VariableRegistry::new(),
            state: SessionState::default(),
            loaded: false,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// The engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The current snapshot.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The lifecycle phase of the current snapshot.
    pub fn phase(&self) -> SessionPhase {
        SessionPhase::of(&self.state, self.loaded)
    }

    /// Whether a story has been loaded successfully.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Text produced by the last advance.
    pub fn current_text(&self) -> &str {
        &self.state.current_text
    }

    /// Whether the story can advance without a choice.
    pub fn can_continue(&self) -> bool {
        self.state.can_continue
    }

    /// Choices presented this turn.
    pub fn options(&self) -> &[Choice] {
        &self.state.options
    }

    /// Story-wide tags.
    pub fn global_tags(&self) -> &TagMap {
        &self.state.global_tags
    }

    /// Tags of the current turn, including retained ones.
    pub fn current_tags(&self) -> &TagMap {
        &self.state.current_tags
    }

    /// Story errors reported after the last operation.
    pub fn current_errors(&self) -> &[String] {
        &self.state.current_errors
    }

    /// Observed variables and their last fetched values.
    pub fn observed_variables(&self) -> &BTreeMap<String, Value> {
        &self.state.observed_variables
    }

    /// Tag keys currently retained across turns.
    pub fn retained_tags(&self) -> &BTreeSet<String> {
        self.retention.keys()
    }

    /// Replace the retained tag keys.
    ///
    /// The new set applies from the next tag refresh; tags already present
    /// are left alone until then.
    pub fn set_retained_tags<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retention = TagRetention::new(keys);
        self.config.retained_tags = self.retention.keys().clone();
        self.publish();
    }

    // -- Subscriptions --

    /// Receive every new snapshot.
    pub fn subscribe<F>(&mut self, subscriber: F) -> SubscriptionId
    where
        F: FnMut(&SessionState) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Stop receiving snapshots. Returns `false` for an unknown id.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    fn publish(&mut self) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(&self.state);
        }
    }

    // -- Loading --

    /// Compile story source, load it and advance once.
    ///
    /// A compile failure leaves the session as it was.
    pub fn load_from_compiled_form(&mut self, source: &str) -> SessionResult<()> {
        if let Err(e) = self.engine.load_source(source) {
            warn!("failed to compile story: {e}");
            return Err(SessionError::Compile(e));
        }
        info!("compiled and loaded story");
        self.start_story();
        Ok(())
    }

    /// Load a compiled story and advance once.
    ///
    /// Failures are logged and reported through `current_errors` rather than
    /// returned.
    pub fn load_from_serialized_form(&mut self, data: &str) {
        if let Err(e) = self.try_load_from_serialized_form(data) {
            let message = e.to_string();
            let mut next = self.state.clone();
            next.current_errors.push(message.clone());
            next.last_failure = Some(message);
            self.state = next;
            self.publish();
        }
    }

    /// Load a compiled story and advance once, returning any failure.
    pub fn try_load_from_serialized_form(&mut self, data: &str) -> SessionResult<()> {
        if let Err(e) = self.engine.load_compiled(data) {
            warn!("failed to load story: {e}");
            return Err(SessionError::Load(e));
        }
        info!("loaded compiled story");
        self.start_story();
        Ok(())
    }

    fn start_story(&mut self) {
        self.loaded = true;
        self.state.global_tags.clear();
        self.state.current_tags.clear();
        self.advance();
    }

    // -- Playing --

    /// Ask the engine for the next line, then refresh all derived state.
    ///
    /// Returns the new current text.
    pub fn advance(&mut self) -> String {
        let failure = match self.engine.advance() {
            Ok(()) => None,
            Err(e) => {
                warn!("advance failed: {e}");
                Some(SessionError::operation("advance", e).to_string())
            }
        };
        self.refresh(failure);
        self.state.current_text.clone()
    }

    /// Pick one of the presented choices and advance.
    pub fn choose_option(&mut self, index: i64) {
        self.choose(index, None::<fn(&SessionState)>);
    }

    /// Pick one of the presented choices, advance, then run `after` with the
    /// refreshed snapshot. `after` only runs if the choice was applied.
    pub fn choose_option_then<F>(&mut self, index: i64, after: F)
    where
        F: FnOnce(&SessionState),
    {
        self.choose(index, Some(after));
    }

    fn choose<F>(&mut self, index: i64, after: Option<F>)
    where
        F: FnOnce(&SessionState),
    {
        let presented = self.state.options.iter().any(|c| c.index() == index);
        let result = if presented {
            self.engine.choose_choice_index(index)
        } else {
            Err(EngineError::InvalidChoice(index))
        };

        match result {
            Ok(()) => {
                debug!(index, "choice applied");
                self.advance();
                if let Some(after) = after {
                    after(&self.state);
                }
            }
            Err(e) => {
                warn!("failed to choose option {index}: {e}");
                self.refresh(Some(SessionError::operation("choose", e).to_string()));
            }
        }
    }

    /// Move to `location` (or `location.sub_location`) and advance.
    pub fn jump_to(&mut self, location: &str, sub_location: Option<&str>) {
        let path = match sub_location {
            Some(sub) => format!("{location}.{sub}"),
            None => location.to_string(),
        };

        match self.engine.choose_path(&path) {
            Ok(()) => {
                debug!(%path, "jumped");
                self.advance();
            }
            Err(e) => {
                warn!("failed to jump to {path}: {e}");
                self.refresh(Some(SessionError::operation("jump", e).to_string()));
            }
        }
    }

    // -- Variables --

    /// Read a story variable straight from the engine.
    pub fn read_variable(&self, name: &str) -> Value {
        self.engine.variable(name)
    }

    /// Write a story variable, then re-fetch observed variables.
    pub fn set_variable(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        let failure = match self.engine.set_variable(name, value.clone()) {
            Ok(()) => {
                debug!(name, %value, "variable set");
                None
            }
            Err(e) => {
                warn!("failed to set variable {name} to {value}: {e}");
                Some(SessionError::operation("set variable", e).to_string())
            }
        };
        self.resync_observed(failure);
    }

    /// Start mirroring `name` into `observed_variables`.
    ///
    /// A new entry starts unset and is filled in by the next mutating
    /// operation.
    pub fn register_observed_variable(&mut self, name: &str) {
        if self.observed.register(name) {
            self.state.observed_variables = self.observed.values().clone();
            self.publish();
        }
    }

    /// Stop mirroring `name`.
    pub fn deregister_observed_variable(&mut self, name: &str) {
        if self.observed.deregister(name) {
            self.state.observed_variables = self.observed.values().clone();
            self.publish();
        }
    }

    fn resync_observed(&mut self, failure: Option<String>) {
        let engine = &self.engine;
        self.observed.refresh(|name| engine.variable(name));

        let mut next = self.state.clone();
        next.observed_variables = self.observed.values().clone();
        next.last_failure = failure;
        self.state = next;
        self.publish();
    }

    // -- Save / restore --

    /// Encode the engine state and current tags. Returns an empty string on
    /// failure.
    pub fn save(&self) -> String {
        match self.try_save() {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to save state: {e}");
                String::new()
            }
        }
    }

    /// Encode the engine state and current tags.
    pub fn try_save(&self) -> SessionResult<String> {
        let blob = self
            .engine
            .save_state()
            .map_err(|e| SessionError::operation("save", e))?;
        let text = SaveState::new(blob, self.state.current_tags.clone())
            .encode(self.config.pretty_saves)?;
        info!("created save state");
        Ok(text)
    }

    /// Restore a save produced by [`StorySession::save`].
    ///
    /// Failures are logged and recorded in `last_failure`.
    pub fn restore(&mut self, text: &str) {
        if let Err(e) = self.try_restore(text) {
            warn!("failed to restore state: {e}");
            self.state.last_failure = Some(e.to_string());
            self.publish();
        }
    }

    /// Restore a save, returning any failure.
    ///
    /// A save that does not decode leaves the session untouched. If the engine
    /// rejects the state, the session keeps whatever the engine has.
    pub fn try_restore(&mut self, text: &str) -> SessionResult<()> {
        let save = SaveState::decode(text)?;
        self.engine
            .load_state(&save.token())
            .map_err(|e| SessionError::operation("restore", e))?;

        self.state.current_tags = save.current_tags;
        self.refresh(None);
        info!("restored state");
        Ok(())
    }

    // -- Refresh --

    /// Rebuild the snapshot from the engine and publish it.
    fn refresh(&mut self, failure: Option<String>) {
        let engine = &self.engine;

        let current_text = engine.current_text().text_or_default();
        let options = choices_from_value(&engine.current_choices());

        let mut global_tags = self.state.global_tags.clone();
        merge_tags(&mut global_tags, engine.global_tags().strings());
        let current_tags = self
            .retention
            .next_turn(&self.state.current_tags, engine.current_tags().strings());

        self.observed.refresh(|name| engine.variable(name));
        let current_errors = engine.current_errors().strings();
        let can_continue = engine.can_continue().bool_or_false();

        for error in &current_errors {
            warn!("story error: {error}");
        }
        debug!(
            text_len = current_text.len(),
            choices = options.len(),
            errors = current_errors.len(),
            can_continue,
            "refreshed session state"
        );

        self.state = SessionState {
            current_text,
            can_continue,
            options,
            global_tags,
            current_tags,
            current_errors,
            observed_variables: self.observed.values().clone(),
            last_failure: failure,
        };
        self.publish();
    }
}
