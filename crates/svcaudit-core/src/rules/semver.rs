//! Semantic version format check.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Outcome, Rule, RuleKind, RuleResult, RuleSpec};
use crate::discovery::MANIFEST_FILE;
use crate::error::{ConfigError, RuleError};
use crate::service::Service;

/// Grammar from semver.org (2.0.0).
const SEMVER_PATTERN: &str = r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-((?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(?:\.(?:0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*))?(?:\+([0-9a-zA-Z-]+(?:\.[0-9a-zA-Z-]+)*))?$";

fn semver_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SEMVER_PATTERN).expect("semver pattern compiles"))
}

/// Components of a parsed semantic version.
///
/// Numeric components are kept as their digit strings; the grammar places no
/// upper bound on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVersion {
    pub major: String,
    pub minor: String,
    pub patch: String,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl ParsedVersion {
    /// `(major, minor, patch)` as integers, `None` if any exceeds `u64`.
    pub fn numeric(&self) -> Option<(u64, u64, u64)> {
        Some((
            self.major.parse().ok()?,
            self.minor.parse().ok()?,
            self.patch.parse().ok()?,
        ))
    }
}

/// Parse `version` against the semver grammar.
pub fn parse_semver(version: &str) -> Option<ParsedVersion> {
    let caps = semver_regex().captures(version)?;
    let part = |i: usize| caps.get(i).map(|m| m.as_str().to_string());
    Some(ParsedVersion {
        major: part(1)?,
        minor: part(2)?,
        patch: part(3)?,
        prerelease: part(4),
        build: part(5),
    })
}

/// A number when it fits in `u64`, the digit string otherwise.
fn component_value(digits: &str) -> Value {
    digits
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(digits.to_string()))
}

#[derive(Debug, Deserialize)]
struct SemverParams {
    #[serde(default = "default_file")]
    file: String,
}

fn default_file() -> String {
    MANIFEST_FILE.to_string()
}

/// Passes when the `version` field of a JSON file is valid semver.
#[derive(Debug, Clone)]
pub struct SemverRule {
    name: String,
    required: bool,
    file: String,
}

impl SemverRule {
    pub fn new(name: impl Into<String>, file: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            required,
            file: file.into(),
        }
    }

    pub fn from_spec(spec: &RuleSpec) -> Result<Self, ConfigError> {
        let params: SemverParams = spec.decode_params()?;
        if params.file.trim().is_empty() {
            return Err(ConfigError::InvalidRuleParams {
                rule: spec.name.clone(),
                reason: "file must not be empty".to_string(),
            });
        }
        Ok(Self::new(spec.name.clone(), params.file, spec.required))
    }

    fn judge(&self, manifest: &Value) -> Outcome {
        let version = match manifest.get("version") {
            None | Some(Value::Null) => {
                return Outcome::fail(format!("No version field found in {}", self.file));
            }
            Some(Value::String(v)) => v.clone(),
            Some(other) => other.to_string(),
        };

        match parse_semver(&version) {
            Some(parsed) => {
                let mut details = json!({
                    "version": version,
                    "major": component_value(&parsed.major),
                    "minor": component_value(&parsed.minor),
                    "patch": component_value(&parsed.patch),
                });
                if let Some(pre) = parsed.prerelease {
                    details["prerelease"] = Value::String(pre);
                }
                if let Some(build) = parsed.build {
                    details["build"] = Value::String(build);
                }
                Outcome::pass(format!("Valid semantic version: {version}")).with_details(details)
            }
            None => Outcome::fail(format!("Invalid semantic version: {version}"))
                .with_details(json!({ "version": version })),
        }
    }
}

#[async_trait]
impl Rule for SemverRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn kind(&self) -> RuleKind {
        RuleKind::Semver
    }

    async fn evaluate(&self, service: &Service) -> Result<RuleResult, RuleError> {
        let path = service.path.join(&self.file);
        let content = match tokio::fs::read(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(
                    Outcome::fail(format!("File not found: {}", self.file)).into_result(&self.name)
                );
            }
            Err(source) => return Err(RuleError::Io { path, source }),
        };

        let outcome = match serde_json::from_slice::<Value>(&content) {
            Ok(manifest) => self.judge(&manifest),
            Err(e) => Outcome::fail(format!("Invalid JSON in {}: {e}", self.file)),
        };
        Ok(outcome.into_result(&self.name))
    }
}
