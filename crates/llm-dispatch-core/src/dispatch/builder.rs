//! Command construction: placeholder substitution or stdin payload.

use std::collections::HashMap;

use crate::domain::llm::{LlmDefinition, PROMPT_PLACEHOLDER};
use crate::domain::{DispatchError, Result};

/// Marker separating resolved context from the task prompt.
pub const TASK_MARKER: &str = "=== TASK ===\n";

/// Resolves request context keys into a prompt prefix.
pub trait ContextProvider: Send + Sync {
    fn context_prefix(&self, keys: &[String]) -> std::result::Result<String, String>;
}

/// In-memory context provider keyed by name.
///
/// Each key renders as `=== KEY ===\n<content>\n\n`, in request order.
#[derive(Debug, Clone, Default)]
pub struct MapContextProvider {
    entries: HashMap<String, String>,
}

impl MapContextProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: impl Into<String>, content: impl Into<String>) -> Self {
        self.entries.insert(key.into(), content.into());
        self
    }
}

impl ContextProvider for MapContextProvider {
    fn context_prefix(&self, keys: &[String]) -> std::result::Result<String, String> {
        let mut prefix = String::new();
        for key in keys {
            let content = self
                .entries
                .get(key)
                .ok_or_else(|| format!("unknown context key: {key}"))?;
            prefix.push_str(&format!("=== {} ===\n{}\n\n", key.to_uppercase(), content.trim()));
        }
        Ok(prefix)
    }
}

/// A fully resolved command, ready for the invoker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Payload written to the child's stdin when present.
    pub stdin: Option<String>,
}

/// Join a context prefix and the task prompt.
///
/// [`TASK_MARKER`] is inserted only when `context_prefix` is non-empty; a
/// bare prompt is returned unchanged.
pub fn compose_prompt(context_prefix: &str, prompt: &str) -> String {
    if context_prefix.is_empty() {
        prompt.to_string()
    } else {
        format!("{context_prefix}{TASK_MARKER}{prompt}")
    }
}

/// Build the command for `llm`.
///
/// Arguments are discrete tokens; nothing is escaped or passed through a shell.
/// The prompt is composed with [`compose_prompt`], so an empty `context_prefix`
/// adds no task marker.
pub fn build_command(
    llm: &LlmDefinition,
    prompt: &str,
    context_prefix: &str,
) -> Result<BuiltCommand> {
    if !llm.enabled {
        return Err(DispatchError::LlmDisabled(llm.id.clone()));
    }
    if prompt.is_empty() {
        return Err(DispatchError::EmptyPrompt);
    }

    let full_prompt = compose_prompt(context_prefix, prompt);

    if llm.stdin {
        return Ok(BuiltCommand {
            program: llm.command.clone(),
            args: llm.args.clone(),
            stdin: Some(full_prompt),
        });
    }

    if !llm.has_placeholder() {
        return Err(DispatchError::MissingPlaceholder {
            llm_id: llm.id.clone(),
        });
    }

    let args = llm
        .args
        .iter()
        .map(|arg| arg.replace(PROMPT_PLACEHOLDER, &full_prompt))
        .collect();

    Ok(BuiltCommand {
        program: llm.command.clone(),
        args,
        stdin: None,
    })
}
