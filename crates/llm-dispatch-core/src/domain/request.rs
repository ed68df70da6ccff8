//! Dispatch request and result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How successful stdout is turned into `DispatchResult::output`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Wrap stdout as `{"text": stdout}`.
    #[default]
    Text,
    /// Parse stdout as arbitrary JSON.
    Json,
}

/// Per-request options. Token and temperature settings are carried for
/// backends that read them; dispatch does not enforce them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DispatchOptions {
    #[serde(default)]
    pub format: ResponseFormat,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub model: Option<String>,

    /// Overrides the configured default timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// A single unit of work for one backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchRequest {
    pub llm_id: String,

    pub prompt: String,

    /// Keys resolved into a context prefix by a `ContextProvider`.
    #[serde(default)]
    pub context_keys: Vec<String>,

    #[serde(default)]
    pub options: Option<DispatchOptions>,
}

impl DispatchRequest {
    pub fn new(llm_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            llm_id: llm_id.into(),
            prompt: prompt.into(),
            context_keys: Vec::new(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: DispatchOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_context_keys(mut self, keys: Vec<String>) -> Self {
        self.context_keys = keys;
        self
    }

    pub fn format(&self) -> ResponseFormat {
        self.options.as_ref().map(|o| o.format).unwrap_or_default()
    }

    pub fn timeout_override(&self) -> Option<u64> {
        self.options.as_ref().and_then(|o| o.timeout_secs)
    }
}

/// Outcome of a process that ran to completion, whatever its exit code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchResult {
    /// Exit code (`-1` when terminated by a signal).
    pub exit_code: i32,

    /// Trimmed standard output.
    pub stdout: String,

    /// Trimmed standard error.
    pub stderr: String,

    /// Parsed output; present only when the exit code is 0 and parsing succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Size of stdout in bytes.
    pub response_size: usize,
}

impl DispatchResult {
    /// Whether the backend reported success (exit code 0).
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_to_text_format() {
        let req = DispatchRequest::new("claude", "hello");
        assert_eq!(req.format(), ResponseFormat::Text);
        assert_eq!(req.timeout_override(), None);
    }

    #[test]
    fn test_request_options() {
        let req = DispatchRequest::new("claude", "hello").with_options(DispatchOptions {
            format: ResponseFormat::Json,
            timeout_secs: Some(42),
            ..Default::default()
        });
        assert_eq!(req.format(), ResponseFormat::Json);
        assert_eq!(req.timeout_override(), Some(42));
    }

    #[test]
    fn test_result_omits_absent_output() {
        let result = DispatchResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: "boom".to_string(),
            output: None,
            response_size: 0,
        };
        assert!(!result.succeeded());
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("output").is_none());
        assert_eq!(json["exit_code"], 1);
    }
}
