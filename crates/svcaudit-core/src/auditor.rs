//! Audit orchestration.
//!
//! [`Auditor`] drives one audit: discover services, instantiate the configured
//! rules, evaluate every rule against every service and aggregate the results
//! into an [`AuditReport`].
//!
//! Rule failures never abort an audit. An `Err` or a panic from
//! [`Rule::evaluate`] is converted into a failing [`RuleResult`] for that rule
//! and its siblings keep running. Only discovery and configuration errors are
//! fatal.

use std::any::Any;
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::config::AuditConfig;
use crate::discovery::{ScanOptions, Scanner};
use crate::error::Result;
use crate::pool::map_bounded;
use crate::report::{AuditReport, ServiceAuditResult};
use crate::rules::{instantiate_all, Rule, RuleResult};
use crate::service::Service;

/// Callback invoked after each service: `(completed, total, service_name)`.
pub type ProgressFn = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Runs configured rules across discovered services.
pub struct Auditor {
    config: AuditConfig,
    progress: Option<ProgressFn>,
    span: Span,
}

impl Auditor {
    pub fn new(config: AuditConfig) -> Self {
        Self {
            config,
            progress: None,
            span: info_span!("audit"),
        }
    }

    /// Report progress after each service completes.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize, &str) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Record all audit logs under `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Discover services below `root` and audit them.
    pub async fn audit(&self, root: &Path, options: ScanOptions) -> Result<AuditReport> {
        let scanner = Scanner::new(options)?.with_span(self.span.clone());
        let services = scanner.scan(root).await?;
        self.audit_services(services).await
    }

    /// Audit services discovered elsewhere.
    ///
    /// Rules are instantiated before anything else, so an invalid rule set is
    /// reported even when there are no services.
    pub async fn audit_services(&self, services: Vec<Service>) -> Result<AuditReport> {
        self.audit_services_inner(services)
            .instrument(self.span.clone())
            .await
    }

    async fn audit_services_inner(&self, services: Vec<Service>) -> Result<AuditReport> {
        let rules = instantiate_all(&self.config.rules)?;

        info!(
            services = services.len(),
            rules = rules.len(),
            parallel = self.config.parallel,
            "starting audit"
        );

        if services.is_empty() {
            info!("no services to audit");
            return Ok(AuditReport::new(Vec::new()));
        }

        let results = self.evaluate_services(&services, &rules).await;
        let report = AuditReport::new(results);
        info!(
            passed = report.summary.passed_services,
            failed = report.summary.failed_services,
            pass_rate = report.summary.pass_rate,
            "audit complete"
        );
        Ok(report)
    }

    /// Evaluate `rules` against every service. Results keep input order.
    pub async fn evaluate_services(
        &self,
        services: &[Service],
        rules: &[Box<dyn Rule>],
    ) -> Vec<ServiceAuditResult> {
        let total = services.len();
        let completed = AtomicUsize::new(0);
        let completed = &completed;

        if self.config.parallel {
            let limit = self.config.concurrency.max(1);
            let mapped = map_bounded(services, limit, |service| async move {
                let result = self.audit_service(service, rules).await;
                self.notify(completed.fetch_add(1, Ordering::SeqCst) + 1, total, &service.name);
                Ok::<_, Infallible>(result)
            })
            .await;
            match mapped {
                Ok(results) => results,
                Err(never) => match never {},
            }
        } else {
            let mut results = Vec::with_capacity(total);
            for service in services {
                let result = self.audit_service(service, rules).await;
                self.notify(completed.fetch_add(1, Ordering::SeqCst) + 1, total, &service.name);
                results.push(result);
            }
            results
        }
    }

    /// Evaluate `rules` against one service. Results keep declaration order.
    pub async fn audit_service(&self, service: &Service, rules: &[Box<dyn Rule>]) -> ServiceAuditResult {
        debug!(service = %service.name, path = %service.path.display(), "auditing service");

        let results: Vec<RuleResult> = if self.config.parallel {
            join_all(rules.iter().map(|rule| run_rule(rule.as_ref(), service))).await
        } else {
            let mut results = Vec::with_capacity(rules.len());
            for rule in rules {
                results.push(run_rule(rule.as_ref(), service).await);
            }
            results
        };

        let evaluations = rules
            .iter()
            .map(|rule| rule.is_required())
            .zip(results)
            .collect();
        let result = ServiceAuditResult::from_evaluations(service, evaluations);

        debug!(
            service = %service.name,
            passed = result.passed,
            score = result.score,
            "service audited"
        );
        result
    }

    fn notify(&self, completed: usize, total: usize, service_name: &str) {
        if let Some(progress) = &self.progress {
            progress(completed, total, service_name);
        }
    }
}

/// Evaluate one rule, converting errors and panics into a failing result.
async fn run_rule(rule: &dyn Rule, service: &Service) -> RuleResult {
    match AssertUnwindSafe(rule.evaluate(service)).catch_unwind().await {
        Ok(Ok(result)) => {
            debug!(rule = rule.name(), passed = result.passed, "rule evaluated");
            result
        }
        Ok(Err(e)) => {
            warn!(rule = rule.name(), service = %service.name, error = %e, "rule errored");
            RuleResult::execution_failed(rule.name(), e)
        }
        Err(payload) => {
            let cause = panic_message(payload.as_ref());
            warn!(rule = rule.name(), service = %service.name, cause = %cause, "rule panicked");
            RuleResult::execution_failed(rule.name(), cause)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
