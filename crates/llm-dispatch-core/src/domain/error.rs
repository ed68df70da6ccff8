//! Dispatch error taxonomy.
//!
//! Validation errors are raised before any process is spawned.
//! Infrastructure errors mean the process could not run to completion.
//! A process that exits with a non-zero code is not an error; it is
//! reported as a `DispatchResult`.

/// Errors produced by dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown LLM: {0}")]
    UnknownLlm(String),

    #[error("LLM {0} is disabled")]
    LlmDisabled(String),

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("LLM {llm_id} has no argument containing {{{{PROMPT}}}} and stdin mode is off")]
    MissingPlaceholder { llm_id: String },

    #[error("timeout {requested}s is outside the allowed range {min}..={max} seconds")]
    TimeoutOutOfRange { requested: u64, min: u64, max: u64 },

    #[error("context resolution failed: {0}")]
    Context(String),

    #[error("command timed out after {0} seconds")]
    TimedOut(u64),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl DispatchError {
    /// Bad request; no process was spawned.
    pub fn is_validation(&self) -> bool {
        !self.is_infrastructure()
    }

    /// The process could not start or did not finish before its deadline.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::TimedOut(_) | Self::Infrastructure(_))
    }
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = DispatchError::TimedOut(30);
        assert_eq!(err.to_string(), "command timed out after 30 seconds");
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_infrastructure_message() {
        let err = DispatchError::Infrastructure("No such file or directory".to_string());
        assert!(err.to_string().starts_with("infrastructure failure: "));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_missing_placeholder_message() {
        let err = DispatchError::MissingPlaceholder {
            llm_id: "claude".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("{{PROMPT}}"), "got: {msg}");
        assert!(msg.contains("claude"));
        assert!(err.is_validation());
    }

    #[test]
    fn test_validation_errors() {
        assert!(DispatchError::EmptyPrompt.is_validation());
        assert!(DispatchError::UnknownLlm("x".into()).is_validation());
        assert!(DispatchError::LlmDisabled("x".into()).is_validation());
        assert!(DispatchError::TimeoutOutOfRange {
            requested: 0,
            min: 1,
            max: 3600
        }
        .is_validation());
    }
}
