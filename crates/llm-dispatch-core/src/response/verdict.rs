//! QA verdict parsing and QA-schema authoring checks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Verdict values every QA schema must allow.
pub const REQUIRED_VERDICTS: [Verdict; 3] = [Verdict::Pass, Verdict::Fail, Verdict::Escalate];

/// QA schema used when a task set configures none.
pub const DEFAULT_QA_SCHEMA: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "type": "object",
  "properties": {
    "verdict": {
      "type": "string",
      "enum": ["pass", "fail", "escalate"]
    },
    "summary": { "type": "string" },
    "issues": {
      "type": "array",
      "items": { "type": "string" }
    }
  },
  "required": ["verdict"]
}"#;

/// Outcome of a QA review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Escalate,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
            Verdict::Escalate => "escalate",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = VerdictError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        match normalized.as_str() {
            "" => Err(VerdictError::EmptyVerdict),
            "pass" => Ok(Verdict::Pass),
            "fail" => Ok(Verdict::Fail),
            "escalate" => Ok(Verdict::Escalate),
            _ => Err(VerdictError::InvalidVerdict(s.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerdictError {
    #[error("QA response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("QA response has no verdict field")]
    MissingVerdict,

    #[error("QA response verdict must be a string")]
    NotAString,

    #[error("QA response verdict is empty")]
    EmptyVerdict,

    #[error("invalid verdict {0:?}: expected pass, fail or escalate")]
    InvalidVerdict(String),
}

/// The parts of a QA response this crate interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaResponse {
    pub verdict: Verdict,
}

/// Read the `verdict` field of a QA response. All other fields are ignored.
///
/// The value is trimmed and matched case-insensitively, so `" Pass "` reads
/// as [`Verdict::Pass`].
pub fn parse_qa_response(data: &[u8]) -> Result<QaResponse, VerdictError> {
    let value: Value =
        serde_json::from_slice(data).map_err(|e| VerdictError::InvalidJson(e.to_string()))?;

    let raw = match value.get("verdict") {
        None | Some(Value::Null) => return Err(VerdictError::MissingVerdict),
        Some(Value::String(s)) => s,
        Some(_) => return Err(VerdictError::NotAString),
    };

    Ok(QaResponse {
        verdict: raw.parse()?,
    })
}

/// Defects in a custom QA schema.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QaSchemaError {
    #[error("QA schema is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("QA schema must define properties.verdict")]
    MissingVerdictProperty,

    #[error("QA schema properties.verdict must declare an enum")]
    MissingVerdictEnum,

    #[error("QA schema verdict enum is missing required value {0:?}")]
    MissingEnumValue(String),

    #[error("QA schema must list verdict in required")]
    VerdictNotRequired,
}

/// Check that a custom QA schema can produce every verdict the pipeline
/// acts on. An empty schema means none is configured and is accepted.
pub fn validate_qa_schema(schema: &str) -> Result<(), QaSchemaError> {
    if schema.trim().is_empty() {
        return Ok(());
    }

    let value: Value =
        serde_json::from_str(schema).map_err(|e| QaSchemaError::InvalidJson(e.to_string()))?;

    let verdict = value
        .get("properties")
        .and_then(|p| p.get("verdict"))
        .ok_or(QaSchemaError::MissingVerdictProperty)?;

    let allowed: Vec<String> = verdict
        .get("enum")
        .and_then(Value::as_array)
        .ok_or(QaSchemaError::MissingVerdictEnum)?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_lowercase)
        .collect();

    if let Some(missing) = REQUIRED_VERDICTS
        .iter()
        .find(|v| !allowed.iter().any(|a| a == v.as_str()))
    {
        return Err(QaSchemaError::MissingEnumValue(missing.to_string()));
    }

    let required = value
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().any(|f| f.as_str() == Some("verdict")))
        .unwrap_or(false);
    if !required {
        return Err(QaSchemaError::VerdictNotRequired);
    }

    Ok(())
}
