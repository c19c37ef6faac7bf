//! Compliance rules.
//!
//! Provides:
//! - [`Rule`]: the evaluation contract every check implements
//! - [`RuleSpec`]: declarative rule configuration (kind + parameters)
//! - [`RuleKind`]: the closed set of built-in kinds
//! - [`registry::instantiate`]: `RuleSpec` to boxed rule, rejecting unknown kinds
//!
//! Built-in checks live in [`file_exists`], [`coverage`] and [`semver`].

pub mod coverage;
pub mod file_exists;
pub mod registry;
pub mod semver;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConfigError, RuleError};
use crate::service::Service;

pub use coverage::CoverageRule;
pub use file_exists::FileExistsRule;
pub use registry::{instantiate, instantiate_all};
pub use semver::SemverRule;

/// Built-in rule kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    /// A file, directory or glob match must exist in the service.
    FileExists,

    /// Mean test coverage must reach a threshold.
    Coverage,

    /// The manifest version must be valid semver.
    Semver,
}

impl RuleKind {
    /// Every built-in kind, in registry order.
    pub const ALL: [RuleKind; 3] = [RuleKind::FileExists, RuleKind::Coverage, RuleKind::Semver];

    /// Configuration name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::FileExists => "file-exists",
            RuleKind::Coverage => "coverage",
            RuleKind::Semver => "semver",
        }
    }

    /// One-line description with accepted parameters.
    pub fn description(&self) -> &'static str {
        match self {
            RuleKind::FileExists => {
                "file or glob must exist (target: path or glob, required)"
            }
            RuleKind::Coverage => {
                "coverage/coverage-summary.json mean must reach threshold (threshold: 0-100, default 80)"
            }
            RuleKind::Semver => {
                "version field must be valid semver (file: JSON file, default package.json)"
            }
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown rule kind: {s}"))
    }
}

/// Declarative rule configuration.
///
/// `kind` stays a string until instantiation so that an unknown kind is a
/// configuration error raised by the registry, not a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSpec {
    /// Result key for this rule.
    pub name: String,

    #[serde(alias = "type")]
    pub kind: String,

    /// Whether a failure fails the owning service.
    #[serde(default)]
    pub required: bool,

    /// Kind-specific parameters.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl RuleSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            required: false,
            params: Map::new(),
        }
    }

    /// Mark the rule as required (builder pattern).
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Decode the parameter map into a kind-specific parameter struct.
    pub(crate) fn decode_params<P: DeserializeOwned>(&self) -> Result<P, ConfigError> {
        serde_json::from_value(Value::Object(self.params.clone())).map_err(|e| {
            ConfigError::InvalidRuleParams {
                rule: self.name.clone(),
                reason: e.to_string(),
            }
        })
    }
}

/// Outcome of one rule evaluated against one service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub rule_name: String,
    pub passed: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RuleResult {
    pub fn pass(rule_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.into(),
            passed: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(rule_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule_name: rule_name.into(),
            passed: false,
            message: message.into(),
            details: None,
        }
    }

    /// Synthetic result for a rule whose evaluation errored or panicked.
    pub fn execution_failed(rule_name: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::fail(rule_name, format!("Rule execution failed: {cause}"))
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Result of the rule-internal check before it is attributed to a rule name.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Pass { message: String, details: Option<Value> },
    Fail { message: String, details: Option<Value> },
}

impl Outcome {
    pub(crate) fn pass(message: impl Into<String>) -> Self {
        Outcome::Pass {
            message: message.into(),
            details: None,
        }
    }

    pub(crate) fn fail(message: impl Into<String>) -> Self {
        Outcome::Fail {
            message: message.into(),
            details: None,
        }
    }

    pub(crate) fn with_details(self, value: Value) -> Self {
        match self {
            Outcome::Pass { message, .. } => Outcome::Pass {
                message,
                details: Some(value),
            },
            Outcome::Fail { message, .. } => Outcome::Fail {
                message,
                details: Some(value),
            },
        }
    }

    pub(crate) fn into_result(self, rule_name: &str) -> RuleResult {
        let (passed, message, details) = match self {
            Outcome::Pass { message, details } => (true, message, details),
            Outcome::Fail { message, details } => (false, message, details),
        };
        RuleResult {
            rule_name: rule_name.to_string(),
            passed,
            message,
            details,
        }
    }
}

/// A single compliance check, bound to its configuration at construction.
///
/// `evaluate` returns `Ok` with a failing result for anticipated problems
/// (missing file, malformed input) and `Err` only for unexpected ones.
#[async_trait]
pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    fn is_required(&self) -> bool;

    fn kind(&self) -> RuleKind;

    async fn evaluate(&self, service: &Service) -> Result<RuleResult, RuleError>;
}
