//! Post-processing of captured backend output.
//!
//! Callers apply these independently of dispatch: [`extract_json`] to
//! recover a JSON value from stdout, then schema validation and/or
//! [`parse_qa_response`].

pub mod extract;
pub mod schema;
pub mod verdict;

pub use extract::{extract_balanced, extract_fenced, extract_json, unwrap_text_wrapper};
pub use schema::{
    validate_against_schema, validate_against_schema_file, CompiledSchema, SchemaCache,
    SchemaError, ValidationResult,
};
pub use verdict::{
    parse_qa_response, validate_qa_schema, QaResponse, QaSchemaError, Verdict, VerdictError,
    DEFAULT_QA_SCHEMA, REQUIRED_VERDICTS,
};
