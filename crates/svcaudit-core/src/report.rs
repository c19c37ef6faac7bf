//! Audit results, report aggregation and rendering.
//!
//! [`AuditReport`] is the value handed to outer layers; [`render_json`] and
//! [`render_markdown`] turn it into artifacts for CI and humans.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rules::RuleResult;
use crate::service::Service;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Percentage of passed results, rounded to one decimal; 0 when `total` is 0.
pub fn score(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(100.0 * passed as f64 / total as f64, 1)
}

/// Percentage of passed services, rounded to two decimals; 0 when `total` is 0.
pub fn pass_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(100.0 * passed as f64 / total as f64, 2)
}

/// Results of every configured rule against one service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAuditResult {
    pub service_name: String,
    pub service_path: PathBuf,
    /// In rule declaration order.
    pub results: Vec<RuleResult>,
    /// False iff a required rule failed.
    pub passed: bool,
    pub score: f64,
}

impl ServiceAuditResult {
    /// Build from `(required, result)` pairs in declaration order.
    ///
    /// A service with no rules passes vacuously with a score of 0.
    pub fn from_evaluations(service: &Service, evaluations: Vec<(bool, RuleResult)>) -> Self {
        let total = evaluations.len();
        let passed_count = evaluations.iter().filter(|(_, r)| r.passed).count();
        let passed = evaluations
            .iter()
            .all(|(required, r)| !*required || r.passed);

        Self {
            service_name: service.name.clone(),
            service_path: service.path.clone(),
            results: evaluations.into_iter().map(|(_, r)| r).collect(),
            passed,
            score: score(passed_count, total),
        }
    }

    pub fn failed_results(&self) -> impl Iterator<Item = &RuleResult> {
        self.results.iter().filter(|r| !r.passed)
    }
}

/// Summary statistics across all audited services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub total_services: usize,
    pub passed_services: usize,
    pub failed_services: usize,
    pub pass_rate: f64,
}

impl AuditSummary {
    pub fn from_services(services: &[ServiceAuditResult]) -> Self {
        let total_services = services.len();
        let passed_services = services.iter().filter(|s| s.passed).count();
        Self {
            total_services,
            passed_services,
            failed_services: total_services - passed_services,
            pass_rate: pass_rate(passed_services, total_services),
        }
    }
}

/// The outcome of one audit invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub timestamp: DateTime<Utc>,
    /// In discovery order.
    pub services: Vec<ServiceAuditResult>,
    pub summary: AuditSummary,
}

impl AuditReport {
    pub fn new(services: Vec<ServiceAuditResult>) -> Self {
        Self::at(Utc::now(), services)
    }

    /// Build with an explicit timestamp.
    pub fn at(timestamp: DateTime<Utc>, services: Vec<ServiceAuditResult>) -> Self {
        let summary = AuditSummary::from_services(&services);
        Self {
            timestamp,
            services,
            summary,
        }
    }

    /// Whether every audited service passed.
    pub fn all_passed(&self) -> bool {
        self.summary.failed_services == 0
    }
}

/// Output formats understood by [`write_report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Markdown => "md",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Json => f.write_str("json"),
            ReportFormat::Markdown => f.write_str("markdown"),
        }
    }
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "markdown" | "md" => Ok(ReportFormat::Markdown),
            other => Err(format!("unknown report format: {other}")),
        }
    }
}

/// Pretty JSON rendering of the report.
pub fn render_json(report: &AuditReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

/// Markdown rendering for PR comments and job summaries.
pub fn render_markdown(report: &AuditReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();
    out.push_str("# Service Audit Report\n\n");
    out.push_str(&format!(
        "Generated: {}\n\n",
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    out.push_str("| Services | Passed | Failed | Pass rate |\n");
    out.push_str("|---------:|-------:|-------:|----------:|\n");
    out.push_str(&format!(
        "| {} | {} | {} | {:.2}% |\n\n",
        summary.total_services, summary.passed_services, summary.failed_services, summary.pass_rate
    ));

    if report.services.is_empty() {
        out.push_str("_No services found._\n");
        return out;
    }

    for service in &report.services {
        let badge = if service.passed { "✅" } else { "❌" };
        out.push_str(&format!(
            "## {} {} ({:.1}%)\n\n`{}`\n\n",
            badge,
            service.service_name,
            service.score,
            service.service_path.display()
        ));

        if service.results.is_empty() {
            out.push_str("_No rules configured._\n\n");
            continue;
        }

        out.push_str("| Rule | Status | Message |\n");
        out.push_str("|------|--------|---------|\n");
        for result in &service.results {
            let status = if result.passed { "✅ pass" } else { "❌ fail" };
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                escape_cell(&result.rule_name),
                status,
                escape_cell(&result.message)
            ));
        }
        out.push('\n');
    }
    out
}

/// Render `report` in `format` and write it to `path`.
pub fn write_report(path: &Path, report: &AuditReport, format: ReportFormat) -> Result<()> {
    let content = match format {
        ReportFormat::Json => render_json(report)?,
        ReportFormat::Markdown => render_markdown(report),
    };
    std::fs::write(path, content)?;
    Ok(())
}
