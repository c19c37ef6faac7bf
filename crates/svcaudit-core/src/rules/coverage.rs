//! Coverage threshold check against an istanbul-style summary.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{Outcome, Rule, RuleKind, RuleResult, RuleSpec};
use crate::error::{ConfigError, RuleError};
use crate::service::Service;

/// Location of the coverage summary, relative to the service root.
pub const COVERAGE_SUMMARY_PATH: &str = "coverage/coverage-summary.json";

pub const DEFAULT_THRESHOLD: f64 = 80.0;

#[derive(Debug, Deserialize)]
struct CoverageParams {
    #[serde(default = "default_threshold")]
    threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Deserialize)]
struct CoverageSummary {
    total: CoverageTotals,
}

#[derive(Debug, Deserialize)]
struct CoverageTotals {
    lines: Metric,
    statements: Metric,
    functions: Metric,
    branches: Metric,
}

#[derive(Debug, Deserialize)]
struct Metric {
    pct: f64,
}

impl CoverageTotals {
    fn average(&self) -> f64 {
        (self.lines.pct + self.statements.pct + self.functions.pct + self.branches.pct) / 4.0
    }
}

/// Passes when the mean of line, statement, function and branch coverage is
/// at least the threshold.
#[derive(Debug, Clone)]
pub struct CoverageRule {
    name: String,
    required: bool,
    threshold: f64,
}

impl CoverageRule {
    pub fn new(name: impl Into<String>, threshold: f64, required: bool) -> Result<Self, ConfigError> {
        let name = name.into();
        if !(0.0..=100.0).contains(&threshold) {
            return Err(ConfigError::InvalidRuleParams {
                rule: name,
                reason: format!("threshold must be between 0 and 100, got {threshold}"),
            });
        }
        Ok(Self {
            name,
            required,
            threshold,
        })
    }

    pub fn from_spec(spec: &RuleSpec) -> Result<Self, ConfigError> {
        let params: CoverageParams = spec.decode_params()?;
        Self::new(spec.name.clone(), params.threshold, spec.required)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    fn judge(&self, totals: &CoverageTotals) -> Outcome {
        let average = totals.average();
        let details = json!({
            "lines": totals.lines.pct,
            "statements": totals.statements.pct,
            "functions": totals.functions.pct,
            "branches": totals.branches.pct,
            "average": (average * 100.0).round() / 100.0,
            "threshold": self.threshold,
        });

        let outcome = if average >= self.threshold {
            Outcome::pass(format!(
                "Coverage {average:.2}% meets threshold {}%",
                self.threshold
            ))
        } else {
            Outcome::fail(format!(
                "Coverage {average:.2}% is below threshold {}%",
                self.threshold
            ))
        };
        outcome.with_details(details)
    }
}

#[async_trait]
impl Rule for CoverageRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn kind(&self) -> RuleKind {
        RuleKind::Coverage
    }

    async fn evaluate(&self, service: &Service) -> Result<RuleResult, RuleError> {
        let path = service.path.join(COVERAGE_SUMMARY_PATH);
        let content = match tokio::fs::read(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Outcome::fail(format!(
                    "Coverage summary not found: {COVERAGE_SUMMARY_PATH}"
                ))
                .with_details(json!({ "threshold": self.threshold }))
                .into_result(&self.name));
            }
            Err(source) => return Err(RuleError::Io { path, source }),
        };

        let outcome = match serde_json::from_slice::<CoverageSummary>(&content) {
            Ok(summary) => self.judge(&summary.total),
            Err(e) => Outcome::fail(format!("Failed to parse coverage summary: {e}"))
                .with_details(json!({ "threshold": self.threshold })),
        };
        Ok(outcome.into_result(&self.name))
    }
}
