//! Error types for the session layer.

use thiserror::Error;

use crate::engine::EngineError;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while driving a story session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Story source failed to compile; the session stays unloaded.
    #[error("compile error: {0}")]
    Compile(EngineError),

    /// A compiled story failed to load.
    #[error("load error: {0}")]
    Load(EngineError),

    /// A choice, jump, variable write or state operation was refused.
    #[error("{operation} failed: {source}")]
    Operation {
        /// The operation that failed.
        operation: &'static str,
        /// What the engine reported.
        source: EngineError,
    },

    /// A save envelope could not be decoded.
    #[error("invalid save state: {0}")]
    Decode(#[source] serde_json::Error),

    /// A save envelope could not be encoded.
    #[error("could not encode save state: {0}")]
    Encode(#[source] serde_json::Error),
}

impl SessionError {
    pub(crate) fn operation(operation: &'static str, source: EngineError) -> Self {
        Self::Operation { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_display_names_the_operation() {
        let err = SessionError::operation("choose", EngineError::InvalidChoice(7));
        assert_eq!(err.to_string(), "choose failed: invalid choice index: 7");
    }

    #[test]
    fn compile_display_joins_messages() {
        let err = SessionError::Compile(EngineError::Compile(vec![
            "unknown divert target 'Foo'".into(),
            "unknown divert target 'Bar'".into(),
        ]));
        assert_eq!(
            err.to_string(),
            "compile error: compilation failed: unknown divert target 'Foo'; unknown divert target 'Bar'"
        );
    }
}
