//! llm-dispatch core library
//!
//! Runs command-line LLM backends under a deadline and post-processes
//! what they print.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod obs;
pub mod response;
pub mod telemetry;

pub use config::{ConfigError, LlmRegistry, TimeoutLimits};

pub use dispatch::{
    ContextProvider, Dispatcher, InvocationOutcome, MapContextProvider, ProbeOutcome,
    ProcessInvocation, ProcessRunner, TokioProcessRunner,
};

pub use domain::{
    DispatchError, DispatchOptions, DispatchRequest, DispatchResult, LlmDefinition,
    RecoveryConfig, ResponseFormat, Result,
};

pub use response::{
    extract_json, parse_qa_response, validate_against_schema, validate_against_schema_file,
    validate_qa_schema, QaResponse, SchemaCache, ValidationResult, Verdict,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
