//! Structured observability hooks for dispatch lifecycle events.
//!
//! This module provides:
//! - Dispatch-scoped tracing spans via [`dispatch_span`]
//! - Emission functions for start, completion, timeout, spawn failure,
//!   rate limiting and probe results
//!
//! Events are emitted at `info!` level unless noted. Verbosity follows
//! `RUST_LOG`; see [`crate::telemetry::init_tracing`].

use tracing::{info, warn};

/// Build a dispatch-scoped span tagged with the LLM id and a fresh dispatch id.
///
/// Attach it with `tracing::Instrument` so the dispatch future stays `Send`:
///
/// ```ignore
/// dispatcher.run(request).instrument(dispatch_span("claude")).await
/// ```
pub fn dispatch_span(llm_id: &str) -> tracing::Span {
    let dispatch_id = uuid::Uuid::new_v4();
    tracing::info_span!("llm.dispatch", llm_id = %llm_id, dispatch_id = %dispatch_id)
}

/// Emit event: process about to be spawned.
pub fn emit_dispatch_started(llm_id: &str, timeout_secs: u64, stdin: bool) {
    info!(
        event = "dispatch.started",
        llm_id = %llm_id,
        timeout_secs = timeout_secs,
        stdin = stdin
    );
}

/// Emit event: process exited (any exit code).
pub fn emit_dispatch_completed(llm_id: &str, exit_code: i32, duration_ms: u64, response_size: usize) {
    info!(
        event = "dispatch.completed",
        llm_id = %llm_id,
        exit_code = exit_code,
        duration_ms = duration_ms,
        response_size = response_size
    );
}

/// Emit event: deadline elapsed (warning level).
pub fn emit_dispatch_timed_out(llm_id: &str, timeout_secs: u64) {
    warn!(event = "dispatch.timed_out", llm_id = %llm_id, timeout_secs = timeout_secs);
}

/// Emit event: process could not run (warning level).
pub fn emit_dispatch_infrastructure_failure(llm_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "dispatch.infrastructure_failure", llm_id = %llm_id, error = %error);
}

/// Emit event: failed run matched a rate-limit pattern (warning level).
pub fn emit_rate_limited(llm_id: &str, exit_code: i32) {
    warn!(event = "dispatch.rate_limited", llm_id = %llm_id, exit_code = exit_code);
}

/// Emit event: availability probe finished.
pub fn emit_probe_finished(llm_id: &str, outcome: &str) {
    info!(event = "probe.finished", llm_id = %llm_id, outcome = %outcome);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_span_create() {
        let _entered = dispatch_span("test-llm").entered();
        emit_dispatch_started("test-llm", 30, false);
    }
}
