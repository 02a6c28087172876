use lw_session::EngineError;
use thiserror::Error;

/// Errors raised by the reference engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    /// Source did not compile; one message per error diagnostic.
    #[error("story has {} compile error(s)", .0.len())]
    Compile(Vec<String>),

    /// A compiled story or machine state is malformed.
    #[error("malformed data: {0}")]
    Format(String),

    /// A compiled story was written by an incompatible compiler.
    #[error("unsupported story format version {found} (expected {expected})")]
    Version {
        /// Version found in the data.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// No story loaded.
    #[error("no story loaded")]
    NotLoaded,

    /// The index is not one of the presented choices.
    #[error("no choice with index {0}")]
    InvalidChoice(i64),

    /// The path names no knot or stitch.
    #[error("no knot or stitch named '{0}'")]
    UnknownPath(String),

    /// The variable was never declared with `VAR`.
    #[error("variable '{0}' is not declared")]
    UndeclaredVariable(String),

    /// Evaluation failed while running the story.
    #[error("{0}")]
    Runtime(String),
}

impl From<ScriptError> for EngineError {
    fn from(err: ScriptError) -> Self {
        match err {
            ScriptError::Compile(messages) => EngineError::Compile(messages),
            ScriptError::Format(_) | ScriptError::Version { .. } => {
                EngineError::Load(err.to_string())
            }
            ScriptError::NotLoaded => EngineError::NotLoaded,
            ScriptError::InvalidChoice(index) => EngineError::InvalidChoice(index),
            ScriptError::UnknownPath(path) => EngineError::UnknownPath(path),
            ScriptError::UndeclaredVariable(name) => EngineError::UndeclaredVariable(name),
            ScriptError::Runtime(message) => EngineError::Runtime(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_onto_engine_errors() {
        assert_eq!(
            EngineError::from(ScriptError::UnknownPath("Nowhere".into())),
            EngineError::UnknownPath("Nowhere".into())
        );
        let load = EngineError::from(ScriptError::Version {
            found: 2,
            expected: 1,
        });
        assert_eq!(
            load,
            EngineError::Load("unsupported story format version 2 (expected 1)".into())
        );
    }
}
