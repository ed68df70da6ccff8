//! Dispatch: run a command-line LLM backend under a deadline.
//!
//! # Modules
//!
//! - [`builder`]: `build_command()`, `ContextProvider`
//! - [`invoker`]: `ProcessRunner` trait + `TokioProcessRunner`
//! - [`outcome`]: `InvocationOutcome` and `classify()`
//! - [`rate_limit`]: `is_rate_limited()`
//! - [`dispatcher`]: `Dispatcher::dispatch()` / `Dispatcher::test_llm()`

pub mod builder;
pub mod dispatcher;
pub mod invoker;
pub mod outcome;
pub mod rate_limit;

pub use builder::{
    build_command, compose_prompt, BuiltCommand, ContextProvider, MapContextProvider, TASK_MARKER,
};
pub use dispatcher::{Dispatcher, ProbeOutcome, DEFAULT_TEST_PROMPT, PROBE_TIMEOUT_SECS};
pub use invoker::{ProcessInvocation, ProcessRunner, TokioProcessRunner};
pub use outcome::{classify, CapturedOutput, Completed, InvocationOutcome};
pub use rate_limit::is_rate_limited;
