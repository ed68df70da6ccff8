//! JSON Schema validation of extracted backend responses.
//!
//! Each violation is reported twice: the validator's raw message prefixed
//! with its location, and a shorter message meant to be fed back to the
//! backend for self-correction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};

use jsonschema::error::ValidationErrorKind;
use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Location label used for violations at the document root.
const ROOT_CONTEXT: &str = "(root)";

/// Errors raised for unusable schemas. Invalid documents are not errors.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("schema failed to compile: {0}")]
    Compile(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;

/// Outcome of validating one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    /// Human-readable messages, one per violation.
    pub errors: Vec<String>,
    /// Validator messages, same length and order as `errors`.
    pub raw_errors: Vec<String>,
}

impl ValidationResult {
    fn passed() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    fn failed(violations: Vec<Violation>) -> Self {
        let (errors, raw_errors) = violations.into_iter().map(|v| (v.human, v.raw)).unzip();
        Self {
            valid: false,
            errors,
            raw_errors,
        }
    }
}

struct Violation {
    raw: String,
    human: String,
}

/// A compiled schema together with its source document.
pub struct CompiledSchema {
    source: Value,
    compiled: JSONSchema,
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl CompiledSchema {
    pub fn compile(schema: &str) -> Result<Self> {
        let source: Value = serde_json::from_str(schema)?;
        let compiled =
            JSONSchema::compile(&source).map_err(|e| SchemaError::Compile(e.to_string()))?;
        Ok(Self { source, compiled })
    }

    /// Validate a JSON document. A document that is not JSON at all is
    /// reported as a single root violation.
    pub fn validate(&self, document: &str) -> ValidationResult {
        let instance: Value = match serde_json::from_str(document) {
            Ok(v) => v,
            Err(e) => {
                let message = format!("document is not valid JSON: {e}");
                return ValidationResult::failed(vec![Violation {
                    raw: format!("{ROOT_CONTEXT}: {message}"),
                    human: message,
                }]);
            }
        };

        let violations: Vec<Violation> = match self.compiled.validate(&instance) {
            Ok(()) => return ValidationResult::passed(),
            Err(errors) => errors.map(|e| self.describe(&e)).collect(),
        };
        ValidationResult::failed(violations)
    }

    fn describe(&self, error: &ValidationError<'_>) -> Violation {
        let context = dotted_path(&error.instance_path.to_string());
        let raw = format!("{}: {}", context.as_deref().unwrap_or(ROOT_CONTEXT), error);
        let human = match &error.kind {
            ValidationErrorKind::Required { property } => {
                let field = property
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| property.to_string());
                match &context {
                    Some(ctx) => format!("Missing required field: {field} (in {ctx})"),
                    None => format!("Missing required field: {field}"),
                }
            }
            ValidationErrorKind::AdditionalProperties { unexpected } => {
                format!("Unexpected field: {} (not allowed by schema)", unexpected.join(", "))
            }
            ValidationErrorKind::Type { .. } => {
                let expected = self.declared_type(&error.schema_path.to_string());
                let field = context.as_deref().unwrap_or("root object");
                format!(
                    "Field '{field}': expected {expected}, got {}",
                    json_type_name(&error.instance)
                )
            }
            ValidationErrorKind::Enum { .. } => {
                let field = context.as_deref().unwrap_or("root value");
                format!("Field '{field}': {error}")
            }
            _ => raw
                .strip_prefix(&format!("{ROOT_CONTEXT}: "))
                .unwrap_or(&raw)
                .to_string(),
        };
        Violation { raw, human }
    }

    /// `type` keyword the failing schema node declares, e.g. `string` or
    /// `string, null`.
    fn declared_type(&self, schema_pointer: &str) -> String {
        match self.source.pointer(schema_pointer) {
            Some(Value::String(t)) => t.clone(),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            _ => "unknown".to_string(),
        }
    }
}

/// `/items/0/name` becomes `items.0.name`; the root pointer becomes `None`.
fn dotted_path(pointer: &str) -> Option<String> {
    let segments: Vec<String> = pointer
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("."))
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate `document` against an inline schema string.
pub fn validate_against_schema(document: &str, schema: &str) -> Result<ValidationResult> {
    Ok(CompiledSchema::compile(schema)?.validate(document))
}

/// Compiled schemas keyed by file path, kept for the life of the cache.
///
/// Concurrent misses on the same path may each compile the file; the first
/// insert wins and later ones are discarded.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<PathBuf, Arc<CompiledSchema>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide cache.
    pub fn global() -> &'static SchemaCache {
        static GLOBAL: OnceLock<SchemaCache> = OnceLock::new();
        GLOBAL.get_or_init(SchemaCache::new)
    }

    /// Compiled schema for `path`, loading it on first use.
    pub fn get_or_load(&self, path: &Path) -> Result<Arc<CompiledSchema>> {
        if let Some(hit) = self.read_entries().get(path) {
            return Ok(Arc::clone(hit));
        }

        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let compiled = Arc::new(CompiledSchema::compile(&text)?);
        tracing::debug!(path = %path.display(), "compiled schema");

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(Arc::clone(entries.entry(path.to_path_buf()).or_insert(compiled)))
    }

    /// Validate `document` against the schema stored at `path`.
    pub fn validate_file(&self, document: &str, path: &Path) -> Result<ValidationResult> {
        Ok(self.get_or_load(path)?.validate(document))
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<PathBuf, Arc<CompiledSchema>>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Validate `document` against the schema file at `path` using the
/// process-wide cache.
pub fn validate_against_schema_file(document: &str, path: &Path) -> Result<ValidationResult> {
    SchemaCache::global().validate_file(document, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const REVIEW_SCHEMA: &str = r#"{
        "type": "object",
        "properties": {
            "verdict": {"type": "string", "enum": ["pass", "fail", "escalate"]},
            "score": {"type": "integer"},
            "findings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {"file": {"type": "string"}, "line": {"type": "integer"}},
                    "required": ["file"]
                }
            }
        },
        "required": ["verdict"],
        "additionalProperties": false
    }"#;

    #[test]
    fn test_valid_document() {
        let result =
            validate_against_schema(r#"{"verdict": "pass", "score": 3}"#, REVIEW_SCHEMA).unwrap();
        assert!(result.valid);
        assert!(result.errors.is_empty());
        assert!(result.raw_errors.is_empty());
    }

    #[test]
    fn test_missing_required_at_root() {
        let result = validate_against_schema(r#"{"score": 3}"#, REVIEW_SCHEMA).unwrap();
        assert!(!result.valid);
        assert_eq!(result.errors, vec!["Missing required field: verdict"]);
        assert!(result.raw_errors[0].starts_with("(root): "));
    }

    #[test]
    fn test_missing_required_in_nested_item() {
        let doc = r#"{"verdict": "fail", "findings": [{"file": "a.rs"}, {"line": 4}]}"#;
        let result = validate_against_schema(doc, REVIEW_SCHEMA).unwrap();
        assert_eq!(result.errors, vec!["Missing required field: file (in findings.1)"]);
        assert!(result.raw_errors[0].starts_with("findings.1: "));
    }

    #[test]
    fn test_additional_property() {
        let doc = r#"{"verdict": "pass", "mood": "great"}"#;
        let result = validate_against_schema(doc, REVIEW_SCHEMA).unwrap();
        assert_eq!(
            result.errors,
            vec!["Unexpected field: mood (not allowed by schema)"]
        );
    }

    #[test]
    fn test_type_mismatch_on_field() {
        let doc = r#"{"verdict": "pass", "score": "high"}"#;
        let result = validate_against_schema(doc, REVIEW_SCHEMA).unwrap();
        assert_eq!(result.errors, vec!["Field 'score': expected integer, got string"]);
    }

    #[test]
    fn test_type_mismatch_inside_array_item() {
        let doc = r#"{"verdict": "pass", "findings": [{"file": "a.rs", "line": "x"}]}"#;
        let result = validate_against_schema(doc, REVIEW_SCHEMA).unwrap();
        assert_eq!(
            result.errors,
            vec!["Field 'findings.0.line': expected integer, got string"]
        );
    }

    #[test]
    fn test_type_mismatch_at_root() {
        let result = validate_against_schema("[1, 2]", REVIEW_SCHEMA).unwrap();
        assert_eq!(result.errors, vec!["Field 'root object': expected object, got array"]);
    }

    #[test]
    fn test_enum_violation() {
        let result = validate_against_schema(r#"{"verdict": "maybe"}"#, REVIEW_SCHEMA).unwrap();
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Field 'verdict': "));
        assert!(result.errors[0].contains("maybe"));
    }

    #[test]
    fn test_enum_violation_at_root() {
        let schema = r#"{"enum": ["a", "b"]}"#;
        let result = validate_against_schema(r#""c""#, schema).unwrap();
        assert!(result.errors[0].starts_with("Field 'root value': "));
    }

    #[test]
    fn test_fallback_strips_root_prefix() {
        let schema = r#"{"type": "string", "minLength": 5}"#;
        let result = validate_against_schema(r#""abc""#, schema).unwrap();
        assert!(!result.valid);
        assert!(result.raw_errors[0].starts_with("(root): "));
        assert_eq!(
            format!("(root): {}", result.errors[0]),
            result.raw_errors[0]
        );
    }

    #[test]
    fn test_errors_and_raw_errors_align() {
        let doc = r#"{"score": "x", "extra": 1}"#;
        let result = validate_against_schema(doc, REVIEW_SCHEMA).unwrap();
        assert_eq!(result.errors.len(), 3);
        assert_eq!(result.errors.len(), result.raw_errors.len());
    }

    #[test]
    fn test_document_not_json() {
        let result = validate_against_schema("definitely not json", REVIEW_SCHEMA).unwrap();
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.raw_errors.len(), 1);
    }

    #[test]
    fn test_invalid_schema_is_an_error() {
        assert!(matches!(
            validate_against_schema("{}", "{not json"),
            Err(SchemaError::InvalidJson(_))
        ));
        assert!(matches!(
            validate_against_schema("{}", r#"{"type": 12}"#),
            Err(SchemaError::Compile(_))
        ));
    }

    #[test]
    fn test_dotted_path() {
        assert_eq!(dotted_path(""), None);
        assert_eq!(dotted_path("/a/0/b"), Some("a.0.b".to_string()));
        assert_eq!(dotted_path("/a~1b"), Some("a/b".to_string()));
    }

    #[test]
    fn test_cache_loads_once_per_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(REVIEW_SCHEMA.as_bytes()).unwrap();

        let cache = SchemaCache::new();
        let first = cache.get_or_load(file.path()).unwrap();
        let second = cache.get_or_load(file.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        let result = cache
            .validate_file(r#"{"verdict": "pass"}"#, file.path())
            .unwrap();
        assert!(result.valid);
    }

    #[test]
    fn test_cache_missing_file() {
        let cache = SchemaCache::new();
        let err = cache
            .validate_file("{}", Path::new("/nonexistent/schema.json"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::Read { .. }));
        assert!(cache.is_empty());
    }
}
