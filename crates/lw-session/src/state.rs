//! The observable session snapshot.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::choice::Choice;
use crate::tags::TagMap;
use crate::value::Value;

/// Everything a host can observe about a session, replaced whole after every
/// operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionState {
    /// Text produced by the last advance.
    pub current_text: String,
    /// Whether the story can advance without a choice.
    pub can_continue: bool,
    /// Choices presented this turn, in engine order.
    pub options: Vec<Choice>,
    /// Story-wide tags; never cleared.
    pub global_tags: TagMap,
    /// Tags of the current turn plus retained tags from earlier turns.
    pub current_tags: TagMap,
    /// Story errors reported after the last operation.
    pub current_errors: Vec<String>,
    /// Observed variables and their values after the last operation.
    pub observed_variables: BTreeMap<String, Value>,
    /// The most recent advisory failure, if the last operation had one.
    pub last_failure: Option<String>,
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// No story loaded.
    Idle,
    /// Story loaded and able to advance.
    Continuing,
    /// Waiting for the host to pick a choice.
    PresentingChoices,
    /// Nothing more to show.
    Ended,
    /// The engine reported errors; the session is still usable.
    Errored,
}

impl SessionPhase {
    /// Derive the phase from a snapshot.
    pub fn of(state: &SessionState, loaded: bool) -> Self {
        if !loaded {
            Self::Idle
        } else if !state.current_errors.is_empty() {
            Self::Errored
        } else if state.can_continue {
            Self::Continuing
        } else if !state.options.is_empty() {
            Self::PresentingChoices
        } else {
            Self::Ended
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Continuing => write!(f, "continuing"),
            Self::PresentingChoices => write!(f, "presenting choices"),
            Self::Ended => write!(f, "ended"),
            Self::Errored => write!(f, "errored"),
        }
    }
}
