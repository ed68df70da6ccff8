//! Dispatch orchestration: validate → bound timeout → build → invoke → classify.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, Instrument};

use super::builder::{build_command, ContextProvider};
use super::invoker::{ProcessInvocation, ProcessRunner, TokioProcessRunner};
use super::outcome::classify;
use super::rate_limit::is_rate_limited;
use crate::config::LlmRegistry;
use crate::domain::{
    DispatchError, DispatchOptions, DispatchRequest, DispatchResult, LlmDefinition,
    ResponseFormat, Result,
};
use crate::obs;

/// Probe prompt used when a backend configures none.
pub const DEFAULT_TEST_PROMPT: &str = "Respond with the single word OK.";

/// Probe timeout, clamped into the registry's bounds.
pub const PROBE_TIMEOUT_SECS: u64 = 30;

/// Result of an availability probe that ran to completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Available,
    RateLimited { exit_code: i32 },
    Unavailable { exit_code: i32 },
}

impl ProbeOutcome {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

/// Public entry point for running backends.
///
/// Holds only read-only state, so one dispatcher can serve concurrent calls.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<LlmRegistry>,
    runner: Arc<dyn ProcessRunner>,
    context: Option<Arc<dyn ContextProvider>>,
}

impl Dispatcher {
    /// Dispatcher that spawns real processes.
    pub fn new(registry: Arc<LlmRegistry>) -> Self {
        Self {
            registry,
            runner: Arc::new(TokioProcessRunner::new()),
            context: None,
        }
    }

    /// Replace the process runner.
    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(provider);
        self
    }

    pub fn registry(&self) -> &LlmRegistry {
        &self.registry
    }

    /// Run one request.
    ///
    /// Returns `Ok` for every process that ran to completion, whatever its
    /// exit code. Errors are validation failures (no process spawned),
    /// timeouts and spawn failures.
    pub async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchResult> {
        self.dispatch_inner(request)
            .instrument(obs::dispatch_span(&request.llm_id))
            .await
    }

    async fn dispatch_inner(&self, request: &DispatchRequest) -> Result<DispatchResult> {
        let llm = self.validate(request)?;
        let timeout_secs = self.registry.limits().resolve(request.timeout_override())?;
        let context_prefix = self.resolve_context(&request.context_keys)?;
        let command = build_command(llm, &request.prompt, &context_prefix)?;

        if let Some(options) = &request.options {
            debug!(
                model = ?options.model,
                max_tokens = ?options.max_tokens,
                temperature = ?options.temperature,
                "dispatch options"
            );
        }

        let invocation = ProcessInvocation {
            program: command.program,
            args: command.args,
            stdin: command.stdin,
            timeout: Duration::from_secs(timeout_secs),
        };

        obs::emit_dispatch_started(&llm.id, timeout_secs, llm.stdin);
        let start = Instant::now();
        let outcome = self.runner.run(&invocation).await;

        let completed = classify(outcome).map_err(|e| {
            match &e {
                DispatchError::TimedOut(secs) => obs::emit_dispatch_timed_out(&llm.id, *secs),
                other => obs::emit_dispatch_infrastructure_failure(&llm.id, other),
            }
            e
        })?;

        let stdout = completed.output.stdout;
        let mut result = DispatchResult {
            exit_code: completed.exit_code,
            response_size: stdout.len(),
            stdout,
            stderr: completed.output.stderr,
            output: None,
        };
        obs::emit_dispatch_completed(
            &llm.id,
            result.exit_code,
            start.elapsed().as_millis() as u64,
            result.response_size,
        );

        if !result.succeeded() {
            if is_rate_limited(&result, llm.rate_limit_patterns()) {
                obs::emit_rate_limited(&llm.id, result.exit_code);
            }
            return Ok(result);
        }

        result.output = parse_output(request.format(), &result.stdout);
        Ok(result)
    }

    /// Probe a backend with a short prompt.
    ///
    /// Infrastructure failures (spawn errors, timeouts) are returned as errors.
    pub async fn test_llm(&self, llm_id: &str) -> Result<ProbeOutcome> {
        let llm = self
            .registry
            .get(llm_id)
            .ok_or_else(|| DispatchError::UnknownLlm(llm_id.to_string()))?;

        let prompt = llm
            .recovery
            .as_ref()
            .and_then(|r| r.test_prompt.as_deref())
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_TEST_PROMPT);

        let limits = self.registry.limits();
        let timeout = PROBE_TIMEOUT_SECS.clamp(limits.min_timeout_secs, limits.max_timeout_secs);
        let request = DispatchRequest::new(llm_id, prompt).with_options(DispatchOptions {
            timeout_secs: Some(timeout),
            ..Default::default()
        });

        let result = self.dispatch(&request).await?;
        let outcome = if result.succeeded() {
            ProbeOutcome::Available
        } else if is_rate_limited(&result, llm.rate_limit_patterns()) {
            ProbeOutcome::RateLimited {
                exit_code: result.exit_code,
            }
        } else {
            ProbeOutcome::Unavailable {
                exit_code: result.exit_code,
            }
        };
        obs::emit_probe_finished(llm_id, outcome.as_str());
        Ok(outcome)
    }

    /// Check `result` against the rate-limit patterns configured for `llm_id`.
    ///
    /// Unknown ids have no patterns and never match.
    pub fn is_rate_limited(&self, llm_id: &str, result: &DispatchResult) -> bool {
        self.registry
            .get(llm_id)
            .map(|llm| is_rate_limited(result, llm.rate_limit_patterns()))
            .unwrap_or(false)
    }

    fn validate(&self, request: &DispatchRequest) -> Result<&LlmDefinition> {
        let llm = self
            .registry
            .get(&request.llm_id)
            .ok_or_else(|| DispatchError::UnknownLlm(request.llm_id.clone()))?;
        if !llm.enabled {
            return Err(DispatchError::LlmDisabled(llm.id.clone()));
        }
        if request.prompt.is_empty() {
            return Err(DispatchError::EmptyPrompt);
        }
        Ok(llm)
    }

    fn resolve_context(&self, keys: &[String]) -> Result<String> {
        if keys.is_empty() {
            return Ok(String::new());
        }
        let provider = self.context.as_ref().ok_or_else(|| {
            DispatchError::Context("context keys given but no context provider is configured".into())
        })?;
        provider.context_prefix(keys).map_err(DispatchError::Context)
    }
}

fn parse_output(format: ResponseFormat, stdout: &str) -> Option<Value> {
    match format {
        ResponseFormat::Text => Some(json!({ "text": stdout })),
        ResponseFormat::Json => match serde_json::from_str(stdout) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, "stdout is not valid JSON; leaving output unset");
                None
            }
        },
    }
}
