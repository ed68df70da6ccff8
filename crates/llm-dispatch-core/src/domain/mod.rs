//! Domain types: backend definitions, requests, results and errors.

pub mod error;
pub mod llm;
pub mod request;

pub use error::{DispatchError, Result};
pub use llm::{InvocationMode, LlmDefinition, RecoveryConfig, PROMPT_PLACEHOLDER};
pub use request::{DispatchOptions, DispatchRequest, DispatchResult, ResponseFormat};
