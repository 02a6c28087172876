//! The engine handle the session drives.
//!
//! An engine owns the compiled story and its machine state. Reads hand back
//! raw [`Value`]s that the session interprets; operations that can be refused
//! return an [`EngineError`].

use thiserror::Error;

use crate::save::StateToken;
use crate::value::Value;

/// Errors an engine reports for a refused operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The story source did not compile.
    #[error("compilation failed: {}", .0.join("; "))]
    Compile(Vec<String>),

    /// A compiled story could not be loaded.
    #[error("story could not be loaded: {0}")]
    Load(String),

    /// No story is loaded yet.
    #[error("no story loaded")]
    NotLoaded,

    /// The index does not name one of the presented choices.
    #[error("invalid choice index: {0}")]
    InvalidChoice(i64),

    /// The path does not name a knot or stitch.
    #[error("unknown path: {0}")]
    UnknownPath(String),

    /// The variable was never declared by the story.
    #[error("variable not declared: {0}")]
    UndeclaredVariable(String),

    /// A machine state could not be produced or applied.
    #[error("state error: {0}")]
    State(String),

    /// Any other runtime failure.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// A story engine: compiler, interpreter and machine state behind one handle.
///
/// Each session owns exactly one engine.
pub trait StoryEngine {
    /// Compile story source and make it the running story.
    fn load_source(&mut self, source: &str) -> Result<(), EngineError>;

    /// Load an already-compiled story.
    fn load_compiled(&mut self, data: &str) -> Result<(), EngineError>;

    /// Produce the next unit of output.
    fn advance(&mut self) -> Result<(), EngineError>;

    /// The text produced by the last advance.
    fn current_text(&self) -> Value;

    /// Whether another advance would produce output.
    fn can_continue(&self) -> Value;

    /// The presented choices, as a list of `{index, text}` maps.
    fn current_choices(&self) -> Value;

    /// Story-wide tags as a list of raw tag strings.
    fn global_tags(&self) -> Value;

    /// Tags of the last produced line as a list of raw tag strings.
    fn current_tags(&self) -> Value;

    /// Story errors raised during the last operation, as a list of strings.
    fn current_errors(&self) -> Value;

    /// Select one of the presented choices.
    fn choose_choice_index(&mut self, index: i64) -> Result<(), EngineError>;

    /// Move execution to a `knot` or `knot.stitch` path.
    fn choose_path(&mut self, path: &str) -> Result<(), EngineError>;

    /// Read a story variable; unknown names yield [`Value::Null`].
    fn variable(&self, name: &str) -> Value;

    /// Write a story variable.
    fn set_variable(&mut self, name: &str, value: Value) -> Result<(), EngineError>;

    /// Serialize the machine state into an opaque blob.
    fn save_state(&self) -> Result<String, EngineError>;

    /// Replace the machine state from an escaped blob.
    fn load_state(&mut self, token: &StateToken) -> Result<(), EngineError>;
}
