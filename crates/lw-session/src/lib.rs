//! Session-state synchronization between an interactive fiction engine and
//! its host.
//!
//! The engine is driven through the [`StoryEngine`] handle and reports
//! loosely-typed [`Value`]s. A [`StorySession`] turns those into a coherent
//! [`SessionState`]: current text, continuability, choices, global and
//! current tags (with per-key retention across turns), advisory errors and a
//! set of observed variables. Sessions can be saved into a [`SaveState`]
//! envelope and restored from one.

/// Choices presented by the story.
pub mod choice;
/// Session configuration.
pub mod config;
/// The engine handle trait and its error type.
pub mod engine;
/// Error types for the session layer.
pub mod error;
/// Observed-variable registry.
pub mod observe;
/// Save-state envelope and state token escaping.
pub mod save;
/// The story session state machine.
pub mod session;
/// The observable session snapshot and lifecycle phases.
pub mod state;
/// Tag parsing and retention.
pub mod tags;
/// The tagged value type used at the engine boundary.
pub mod value;

pub use choice::Choice;
pub use config::SessionConfig;
pub use engine::{EngineError, StoryEngine};
pub use error::{SessionError, SessionResult};
pub use observe::VariableRegistry;
pub use save::{SaveState, StateToken};
pub use session::{StorySession, SubscriptionId};
pub use state::{SessionPhase, SessionState};
pub use tags::{TagMap, TagRetention, parse_tag, parse_tags};
pub use value::Value;
