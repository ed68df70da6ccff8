//! LLM registry configuration.
//!
//! A registry file is TOML (or JSON when the extension is `.json`):
//!
//! ```toml
//! [dispatch]
//! default_timeout_secs = 300
//!
//! [[llm]]
//! id = "claude"
//! command = "claude"
//! args = ["-p", "{{PROMPT}}", "--output-format", "json"]
//!
//! [llm.recovery]
//! rate_limit_patterns = ["rate limit", "429"]
//! ```
//!
//! The registry is built once and shared read-only between dispatches.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::llm::LlmDefinition;
use crate::domain::DispatchError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Errors raised while loading or validating a registry.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("LLM definition has an empty id")]
    EmptyId,

    #[error("duplicate LLM id: {0}")]
    DuplicateId(String),

    #[error("LLM {0} has an empty command")]
    EmptyCommand(String),

    #[error("LLM {0}: no argument contains {{{{PROMPT}}}} and stdin mode is off")]
    MissingPlaceholder(String),

    #[error("invalid timeout bounds: require min ({min}) <= default ({default}) <= max ({max}) and min > 0")]
    InvalidTimeoutBounds { min: u64, default: u64, max: u64 },
}

/// Timeout bounds applied to every dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeoutLimits {
    #[serde(default = "default_timeout")]
    pub default_timeout_secs: u64,
    #[serde(default = "min_timeout")]
    pub min_timeout_secs: u64,
    #[serde(default = "max_timeout")]
    pub max_timeout_secs: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn min_timeout() -> u64 {
    MIN_TIMEOUT_SECS
}

fn max_timeout() -> u64 {
    MAX_TIMEOUT_SECS
}

impl Default for TimeoutLimits {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            min_timeout_secs: MIN_TIMEOUT_SECS,
            max_timeout_secs: MAX_TIMEOUT_SECS,
        }
    }
}

impl TimeoutLimits {
    fn validate(&self) -> Result<(), ConfigError> {
        let ok = self.min_timeout_secs > 0
            && self.min_timeout_secs <= self.default_timeout_secs
            && self.default_timeout_secs <= self.max_timeout_secs;
        if ok {
            Ok(())
        } else {
            Err(ConfigError::InvalidTimeoutBounds {
                min: self.min_timeout_secs,
                default: self.default_timeout_secs,
                max: self.max_timeout_secs,
            })
        }
    }

    /// Resolve a requested timeout, falling back to the default.
    pub fn resolve(&self, requested: Option<u64>) -> Result<u64, DispatchError> {
        let secs = requested.unwrap_or(self.default_timeout_secs);
        if secs < self.min_timeout_secs || secs > self.max_timeout_secs {
            return Err(DispatchError::TimeoutOutOfRange {
                requested: secs,
                min: self.min_timeout_secs,
                max: self.max_timeout_secs,
            });
        }
        Ok(secs)
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    dispatch: TimeoutLimits,
    #[serde(default, rename = "llm")]
    llms: Vec<LlmDefinition>,
}

/// Read-only map of LLM definitions plus timeout bounds.
#[derive(Debug, Clone, Default)]
pub struct LlmRegistry {
    llms: HashMap<String, LlmDefinition>,
    order: Vec<String>,
    limits: TimeoutLimits,
}

impl LlmRegistry {
    /// Build a validated registry.
    pub fn new(llms: Vec<LlmDefinition>, limits: TimeoutLimits) -> Result<Self, ConfigError> {
        limits.validate()?;

        let mut registry = Self {
            llms: HashMap::with_capacity(llms.len()),
            order: Vec::with_capacity(llms.len()),
            limits,
        };
        for llm in llms {
            validate_definition(&llm)?;
            if registry.llms.contains_key(&llm.id) {
                return Err(ConfigError::DuplicateId(llm.id));
            }
            registry.order.push(llm.id.clone());
            registry.llms.insert(llm.id.clone(), llm);
        }
        Ok(registry)
    }

    /// Load a registry file, choosing the parser from the extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json_str(&raw)
        } else {
            Self::from_toml_str(&raw)
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: RegistryFile = toml::from_str(raw)?;
        let registry = Self::new(file.llms, file.dispatch)?;
        tracing::debug!(llms = registry.len(), "loaded LLM registry");
        Ok(registry)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let file: RegistryFile = serde_json::from_str(raw)?;
        let registry = Self::new(file.llms, file.dispatch)?;
        tracing::debug!(llms = registry.len(), "loaded LLM registry");
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&LlmDefinition> {
        self.llms.get(id)
    }

    /// Definitions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &LlmDefinition> {
        self.order.iter().filter_map(|id| self.llms.get(id))
    }

    pub fn limits(&self) -> TimeoutLimits {
        self.limits
    }

    pub fn len(&self) -> usize {
        self.llms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.llms.is_empty()
    }
}

fn validate_definition(llm: &LlmDefinition) -> Result<(), ConfigError> {
    if llm.id.trim().is_empty() {
        return Err(ConfigError::EmptyId);
    }
    if llm.command.trim().is_empty() {
        return Err(ConfigError::EmptyCommand(llm.id.clone()));
    }
    if !llm.stdin && !llm.has_placeholder() {
        return Err(ConfigError::MissingPlaceholder(llm.id.clone()));
    }
    Ok(())
}
