//! Invocation outcomes and their classification.

use crate::domain::{DispatchError, Result};

/// Captured, trimmed output of a process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// Decode raw bytes (lossy UTF-8) and trim surrounding whitespace.
    pub fn from_bytes(stdout: &[u8], stderr: &[u8]) -> Self {
        Self {
            stdout: String::from_utf8_lossy(stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }
}

/// What happened to a spawned process. Exactly one variant per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The process ran and exited; `exit_code` is `-1` for signal termination.
    Completed {
        exit_code: i32,
        output: CapturedOutput,
    },
    /// The deadline elapsed first. Output holds whatever was read before the kill.
    TimedOut {
        timeout_secs: u64,
        output: CapturedOutput,
    },
    /// The process could not be started or waited on.
    InfrastructureFailure { cause: String },
}

/// A process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    pub exit_code: i32,
    pub output: CapturedOutput,
}

/// Split an outcome into data (completed runs) and errors (everything else).
pub fn classify(outcome: InvocationOutcome) -> Result<Completed> {
    match outcome {
        InvocationOutcome::Completed { exit_code, output } => Ok(Completed { exit_code, output }),
        InvocationOutcome::TimedOut { timeout_secs, .. } => {
            Err(DispatchError::TimedOut(timeout_secs))
        }
        InvocationOutcome::InfrastructureFailure { cause } => {
            Err(DispatchError::Infrastructure(cause))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonzero_exit_is_data() {
        let completed = classify(InvocationOutcome::Completed {
            exit_code: 2,
            output: CapturedOutput {
                stdout: String::new(),
                stderr: "usage".to_string(),
            },
        })
        .unwrap();
        assert_eq!(completed.exit_code, 2);
        assert_eq!(completed.output.stderr, "usage");
    }

    #[test]
    fn test_timeout_is_error() {
        let err = classify(InvocationOutcome::TimedOut {
            timeout_secs: 5,
            output: CapturedOutput::default(),
        })
        .unwrap_err();
        assert!(matches!(err, DispatchError::TimedOut(5)));
    }

    #[test]
    fn test_spawn_failure_is_error() {
        let err = classify(InvocationOutcome::InfrastructureFailure {
            cause: "No such file or directory (os error 2)".to_string(),
        })
        .unwrap_err();
        assert!(matches!(err, DispatchError::Infrastructure(_)));
        assert!(err.to_string().contains("os error 2"));
    }

    #[test]
    fn test_captured_output_trims() {
        let out = CapturedOutput::from_bytes(b"  {\"a\":1}\n\n", b"\twarn\n");
        assert_eq!(out.stdout, "{\"a\":1}");
        assert_eq!(out.stderr, "warn");
    }
}
