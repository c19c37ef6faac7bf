//! Error taxonomy for svcaudit.
//!
//! Only [`ScanError`] and [`ConfigError`] abort an audit. [`RuleError`] is
//! absorbed by the auditor and turned into a failing rule result.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while discovering services.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan root does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("scan root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("invalid exclude pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("failed to walk {}: {reason}", path.display())]
    Walk { path: PathBuf, reason: String },

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced while loading configuration or instantiating rules.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("unknown rule kind '{kind}' for rule '{rule}'")]
    UnknownRuleKind { rule: String, kind: String },

    #[error("invalid parameters for rule '{rule}': {reason}")]
    InvalidRuleParams { rule: String, reason: String },
}

/// Unexpected failure inside a rule evaluation.
///
/// Expected failures (missing file, malformed JSON) are reported as failing
/// [`RuleResult`](crate::rules::RuleResult)s instead.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("background task failed: {0}")]
    Task(String),

    #[error("{0}")]
    Other(String),
}

/// Top-level error for an audit invocation.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("discovery failed: {0}")]
    Scan(#[from] ScanError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;
