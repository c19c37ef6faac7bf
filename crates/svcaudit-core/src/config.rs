//! Audit configuration.
//!
//! Files ending in `.toml` are parsed as TOML, everything else as JSON. Both
//! use the same camelCase keys:
//!
//! ```json
//! {
//!   "parallel": true,
//!   "concurrency": 8,
//!   "rules": [
//!     { "name": "readme", "kind": "file-exists", "target": "README.md", "required": true },
//!     { "name": "coverage", "kind": "coverage", "threshold": 85 }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::rules::RuleSpec;

/// Service audits in flight at once when running in parallel.
pub const DEFAULT_CONCURRENCY: usize = 5;

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

/// Engine configuration for one audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,

    /// Evaluate rules and services concurrently.
    #[serde(default)]
    pub parallel: bool,

    /// Reserved; not consulted by the engine yet.
    #[serde(default)]
    pub fail_fast: bool,

    /// Worker limit for parallel service evaluation.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            parallel: false,
            fail_fast: false,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl AuditConfig {
    pub fn new(rules: Vec<RuleSpec>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Baseline rules used when no config file is supplied.
    pub fn default_rules() -> Self {
        Self::new(vec![
            RuleSpec::new("readme", "file-exists")
                .with_param("target", "README.md")
                .required(),
            RuleSpec::new("version", "semver").required(),
        ])
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Load from a JSON or TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let config = if is_toml {
            Self::from_toml_str(&content)
        } else {
            Self::from_json_str(&content)
        }
        .map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;

        debug!(path = %path.display(), rules = config.rules.len(), "loaded audit config");
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Structural checks. Unknown rule kinds are left to instantiation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.rules.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one rule must be configured".to_string(),
            ));
        }
        if let Some(idx) = self.rules.iter().position(|r| r.name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "rule at index {idx} has an empty name"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::from_json_str(r#"{"rules": []}"#).expect("parse");
        assert!(!config.parallel);
        assert!(!config.fail_fast);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_load_json_with_camel_case_keys() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("audit.json");
        fs::write(
            &path,
            r#"{
                "parallel": true,
                "failFast": true,
                "concurrency": 2,
                "rules": [
                    { "name": "readme", "kind": "file-exists", "target": "README.md", "required": true }
                ]
            }"#,
        )
        .expect("write");

        let config = AuditConfig::load(&path).expect("load");
        assert!(config.parallel);
        assert!(config.fail_fast);
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.rules[0].params["target"], "README.md");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("audit.toml");
        fs::write(
            &path,
            r#"
parallel = true

[[rules]]
name = "coverage"
kind = "coverage"
threshold = 85.0
required = true

[[rules]]
name = "version"
kind = "semver"
"#,
        )
        .expect("write");

        let config = AuditConfig::load(&path).expect("load");
        assert!(config.parallel);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].params["threshold"], 85.0);
        assert!(config.rules[0].required);
        assert!(!config.rules[1].required);
    }

    #[test]
    fn test_load_missing_file() {
        let err = AuditConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("audit.json");
        fs::write(&path, "{ rules: ").expect("write");
        let err = AuditConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency_and_empty_rules() {
        let config = AuditConfig::default_rules().with_concurrency(0);
        assert!(config.validate().is_err());
        assert!(AuditConfig::default().validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_rule_name() {
        let config = AuditConfig::new(vec![RuleSpec::new(" ", "semver")]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("index 0"));
    }

    #[test]
    fn test_validate_leaves_unknown_kinds_to_instantiation() {
        let config = AuditConfig::new(vec![RuleSpec::new("lint", "eslint")]);
        assert!(config.validate().is_ok());
    }
}
