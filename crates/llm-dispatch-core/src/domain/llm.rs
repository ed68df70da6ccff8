//! LLM backend definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Token substituted with the composed prompt in argument templates.
pub const PROMPT_PLACEHOLDER: &str = "{{PROMPT}}";

/// How a backend is invoked. Only external commands are supported.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InvocationMode {
    #[default]
    Command,
}

/// Recovery hints consumed by callers that decide retry policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecoveryConfig {
    /// Case-insensitive substrings that mark a failed run as rate limited.
    #[serde(default)]
    pub rate_limit_patterns: Vec<String>,

    /// Prompt used to probe availability.
    #[serde(default)]
    pub test_prompt: Option<String>,

    /// Ordered probe delays in seconds.
    #[serde(default)]
    pub test_schedule: Vec<u64>,

    /// Give up on recovery after this many seconds.
    #[serde(default)]
    pub abort_after_seconds: Option<u64>,
}

impl RecoveryConfig {
    /// Delay before the given (zero-based) probe attempt.
    ///
    /// Once the schedule is exhausted its last entry repeats; an empty
    /// schedule yields `None`.
    pub fn probe_delay(&self, attempt: usize) -> Option<Duration> {
        let secs = self
            .test_schedule
            .get(attempt)
            .or_else(|| self.test_schedule.last())?;
        Some(Duration::from_secs(*secs))
    }

    /// Ceiling after which recovery should be abandoned.
    pub fn abort_after(&self) -> Option<Duration> {
        self.abort_after_seconds.map(Duration::from_secs)
    }
}

/// A command-line LLM backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LlmDefinition {
    /// Registry key used by dispatch requests.
    pub id: String,

    /// Human-readable display name.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub mode: InvocationMode,

    /// Executable path or name resolved through `PATH`.
    pub command: String,

    /// Argument template; occurrences of [`PROMPT_PLACEHOLDER`] are substituted.
    #[serde(default)]
    pub args: Vec<String>,

    /// Feed the prompt on standard input instead of through arguments.
    #[serde(default)]
    pub stdin: bool,

    #[serde(default)]
    pub recovery: Option<RecoveryConfig>,
}

fn default_enabled() -> bool {
    true
}

impl LlmDefinition {
    /// Create an enabled argument-mode definition.
    pub fn new(id: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            enabled: true,
            mode: InvocationMode::Command,
            command: command.into(),
            args,
            stdin: false,
            recovery: None,
        }
    }

    /// Switch to stdin mode.
    pub fn with_stdin(mut self) -> Self {
        self.stdin = true;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryConfig) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Disable this backend.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether any argument carries the prompt placeholder.
    pub fn has_placeholder(&self) -> bool {
        self.args.iter().any(|a| a.contains(PROMPT_PLACEHOLDER))
    }

    /// Rate-limit patterns, empty when no recovery config is present.
    pub fn rate_limit_patterns(&self) -> &[String] {
        self.recovery
            .as_ref()
            .map(|r| r.rate_limit_patterns.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_placeholder() {
        let llm = LlmDefinition::new(
            "claude",
            "claude",
            vec!["-p".to_string(), "{{PROMPT}}".to_string()],
        );
        assert!(llm.has_placeholder());

        let embedded = LlmDefinition::new("x", "x", vec!["--prompt={{PROMPT}}".to_string()]);
        assert!(embedded.has_placeholder());

        let none = LlmDefinition::new("y", "y", vec!["--json".to_string()]);
        assert!(!none.has_placeholder());
    }

    #[test]
    fn test_probe_delay_repeats_last_entry() {
        let recovery = RecoveryConfig {
            test_schedule: vec![30, 60, 120],
            ..Default::default()
        };
        assert_eq!(recovery.probe_delay(0), Some(Duration::from_secs(30)));
        assert_eq!(recovery.probe_delay(2), Some(Duration::from_secs(120)));
        assert_eq!(recovery.probe_delay(7), Some(Duration::from_secs(120)));
        assert_eq!(RecoveryConfig::default().probe_delay(0), None);
    }

    #[test]
    fn test_abort_after() {
        let recovery = RecoveryConfig {
            abort_after_seconds: Some(900),
            ..Default::default()
        };
        assert_eq!(recovery.abort_after(), Some(Duration::from_secs(900)));
        assert_eq!(RecoveryConfig::default().abort_after(), None);
    }

    #[test]
    fn test_definition_deserializes_with_defaults() {
        let llm: LlmDefinition = serde_json::from_str(
            r#"{"id": "codex", "command": "codex", "args": ["exec", "{{PROMPT}}"]}"#,
        )
        .unwrap();
        assert!(llm.enabled);
        assert!(!llm.stdin);
        assert_eq!(llm.mode, InvocationMode::Command);
        assert!(llm.rate_limit_patterns().is_empty());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let res = serde_json::from_str::<LlmDefinition>(
            r#"{"id": "x", "command": "x", "mode": "http"}"#,
        );
        assert!(res.is_err());
    }
}
