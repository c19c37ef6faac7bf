//! svcaudit Core Library
//!
//! Discovers services in a directory tree, evaluates compliance rules against
//! each of them and aggregates the outcome into an [`AuditReport`].

pub mod auditor;
pub mod config;
pub mod discovery;
pub mod error;
pub mod pool;
pub mod report;
pub mod rules;
pub mod service;
pub mod telemetry;

pub use auditor::{Auditor, ProgressFn};
pub use config::{AuditConfig, DEFAULT_CONCURRENCY};
pub use discovery::{ScanOptions, Scanner, DEFAULT_EXCLUDES, MANIFEST_FILE};
pub use error::{AuditError, ConfigError, Result, RuleError, ScanError};
pub use pool::map_bounded;
pub use report::{
    pass_rate, render_json, render_markdown, score, write_report, AuditReport, AuditSummary,
    ReportFormat, ServiceAuditResult,
};
pub use rules::registry::registry;
pub use rules::{
    instantiate, instantiate_all, CoverageRule, FileExistsRule, Rule, RuleKind, RuleResult,
    RuleSpec, SemverRule,
};
pub use service::Service;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
