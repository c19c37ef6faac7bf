//! Integration tests for end-to-end audits over on-disk fixtures.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use svcaudit_core::{
    AuditConfig, AuditError, Auditor, ConfigError, RuleSpec, ScanError, ScanOptions,
};
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, content).expect("write fixture");
}

fn readme_and_semver() -> AuditConfig {
    AuditConfig::new(vec![
        RuleSpec::new("readme", "file-exists")
            .with_param("target", "README.md")
            .required(),
        RuleSpec::new("version", "semver").required(),
    ])
}

/// Monorepo with three services of varying compliance.
fn monorepo() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    let root = dir.path();

    write(
        &root.join("services/api/package.json"),
        r#"{"name":"api","version":"2.0.0","dependencies":{"express":"^4.18.0"}}"#,
    );
    write(&root.join("services/api/README.md"), "# api\n");
    write(
        &root.join("services/api/coverage/coverage-summary.json"),
        r#"{"total":{"lines":{"pct":95},"statements":{"pct":90},"functions":{"pct":92},"branches":{"pct":85}}}"#,
    );

    write(
        &root.join("services/web/package.json"),
        r#"{"name":"web","version":"1.x","dependencies":{"react":"^18.0.0"}}"#,
    );
    write(&root.join("services/web/README.md"), "# web\n");

    write(
        &root.join("services/worker/package.json"),
        r#"{"name":"worker","version":"0.3.1-beta.2"}"#,
    );
    dir
}

/// Test: README + semver scenario passes with full score
#[tokio::test]
async fn test_readme_and_semver_scenario() {
    let dir = TempDir::new().expect("tempdir");
    write(
        &dir.path().join("svc/package.json"),
        r#"{"name":"svc","version":"1.2.3"}"#,
    );
    write(&dir.path().join("svc/README.md"), "# svc\n");

    let report = Auditor::new(readme_and_semver())
        .audit(dir.path(), ScanOptions::default())
        .await
        .expect("audit should succeed");

    assert_eq!(report.services.len(), 1);
    let svc = &report.services[0];
    assert_eq!(svc.service_name, "svc");
    assert!(svc.passed);
    assert_eq!(svc.score, 100.0);

    let version = &svc.results[1];
    assert_eq!(version.rule_name, "version");
    let details = version.details.as_ref().expect("semver details");
    assert_eq!(details["major"], 1);
    assert_eq!(details["minor"], 2);
    assert_eq!(details["patch"], 3);

    assert_eq!(report.summary.total_services, 1);
    assert_eq!(report.summary.pass_rate, 100.0);
    assert!(report.all_passed());
}

/// Test: mixed monorepo produces per-service verdicts and summary math
#[tokio::test]
async fn test_monorepo_verdicts_and_pass_rate() {
    let dir = monorepo();
    let mut config = readme_and_semver();
    config
        .rules
        .push(RuleSpec::new("coverage", "coverage").with_param("threshold", 85.0));

    let report = Auditor::new(config)
        .audit(dir.path(), ScanOptions::default())
        .await
        .expect("audit should succeed");

    let names: Vec<&str> = report.services.iter().map(|s| s.service_name.as_str()).collect();
    assert_eq!(names, vec!["api", "web", "worker"]);

    // api: everything passes.
    assert!(report.services[0].passed);
    assert_eq!(report.services[0].score, 100.0);

    // web: invalid version (required), no coverage (optional).
    assert!(!report.services[1].passed);
    assert_eq!(report.services[1].score, 33.3);
    assert!(report.services[1].results[1].message.contains("Invalid semantic version"));

    // worker: missing README (required).
    assert!(!report.services[2].passed);
    assert_eq!(report.services[2].results[0].message, "File not found: README.md");

    assert_eq!(report.summary.total_services, 3);
    assert_eq!(report.summary.passed_services, 1);
    assert_eq!(report.summary.failed_services, 2);
    assert_eq!(report.summary.pass_rate, 33.33);
    assert!(!report.all_passed());
}

/// Test: sequential and parallel runs produce identical results
#[tokio::test]
async fn test_sequential_and_parallel_agree() {
    let dir = monorepo();
    let mut config = readme_and_semver();
    config.rules.push(
        RuleSpec::new("tests", "file-exists").with_param("target", "tests/**/*.test.ts"),
    );

    let sequential = Auditor::new(config.clone())
        .audit(dir.path(), ScanOptions::default())
        .await
        .expect("sequential audit");
    let parallel = Auditor::new(config.with_parallel(true).with_concurrency(2))
        .audit(dir.path(), ScanOptions::default())
        .await
        .expect("parallel audit");

    assert_eq!(sequential.services, parallel.services);
    assert_eq!(sequential.summary, parallel.summary);
}

/// Test: repeated audits over an unchanged tree are identical
#[tokio::test]
async fn test_audit_is_idempotent() {
    let dir = monorepo();
    let auditor = Auditor::new(readme_and_semver().with_parallel(true));

    let first = auditor
        .audit(dir.path(), ScanOptions::default())
        .await
        .expect("first audit");
    let second = auditor
        .audit(dir.path(), ScanOptions::default())
        .await
        .expect("second audit");

    assert_eq!(first.services, second.services);
}

/// Test: an empty tree is a successful audit with a zero summary
#[tokio::test]
async fn test_empty_tree_yields_zero_summary() {
    let dir = TempDir::new().expect("tempdir");
    let report = Auditor::new(readme_and_semver())
        .audit(dir.path(), ScanOptions::default())
        .await
        .expect("audit should succeed");

    assert!(report.services.is_empty());
    assert_eq!(report.summary.total_services, 0);
    assert_eq!(report.summary.passed_services, 0);
    assert_eq!(report.summary.failed_services, 0);
    assert_eq!(report.summary.pass_rate, 0.0);
}

/// Test: unknown rule kind aborts the audit
#[tokio::test]
async fn test_unknown_rule_kind_is_fatal() {
    let dir = monorepo();
    let config = AuditConfig::new(vec![
        RuleSpec::new("readme", "file-exists").with_param("target", "README.md"),
        RuleSpec::new("lint", "eslint"),
    ]);

    let err = Auditor::new(config)
        .audit(dir.path(), ScanOptions::default())
        .await
        .unwrap_err();

    match err {
        AuditError::Config(ConfigError::UnknownRuleKind { rule, kind }) => {
            assert_eq!(rule, "lint");
            assert_eq!(kind, "eslint");
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Test: missing root is a discovery error
#[tokio::test]
async fn test_missing_root_is_scan_error() {
    let dir = TempDir::new().expect("tempdir");
    let err = Auditor::new(readme_and_semver())
        .audit(&dir.path().join("nope"), ScanOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::Scan(ScanError::NotFound(_))));
}

/// Test: coverage below threshold fails with the computed mean
#[tokio::test]
async fn test_coverage_below_threshold_scenario() {
    let dir = TempDir::new().expect("tempdir");
    write(&dir.path().join("svc/package.json"), r#"{"name":"svc","version":"1.0.0"}"#);
    write(
        &dir.path().join("svc/coverage/coverage-summary.json"),
        r#"{"total":{"lines":{"pct":90},"statements":{"pct":80},"functions":{"pct":90},"branches":{"pct":70}}}"#,
    );

    let config = AuditConfig::new(vec![RuleSpec::new("coverage", "coverage")
        .with_param("threshold", 85.0)
        .required()]);
    let report = Auditor::new(config)
        .audit(dir.path(), ScanOptions::default())
        .await
        .expect("audit should succeed");

    let result = &report.services[0].results[0];
    assert!(!result.passed);
    assert!(result.message.contains("below threshold"));
    let details = result.details.as_ref().expect("coverage details");
    assert_eq!(details["average"], 82.5);
    assert!(!report.services[0].passed);
}

/// Test: progress callback fires once per service
#[tokio::test]
async fn test_progress_callback_counts_services() {
    let dir = monorepo();
    let calls = Arc::new(AtomicUsize::new(0));
    let last_total = Arc::new(AtomicUsize::new(0));
    let (c, t) = (Arc::clone(&calls), Arc::clone(&last_total));

    let auditor = Auditor::new(readme_and_semver().with_parallel(true)).with_progress(
        move |_done, total, _name| {
            c.fetch_add(1, Ordering::SeqCst);
            t.store(total, Ordering::SeqCst);
        },
    );
    auditor
        .audit(dir.path(), ScanOptions::default())
        .await
        .expect("audit should succeed");

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(last_total.load(Ordering::SeqCst), 3);
}

/// Test: config loaded from disk drives the audit
#[tokio::test]
async fn test_audit_with_config_file() {
    let dir = monorepo();
    let config_path = dir.path().join("svcaudit.toml");
    write(
        &config_path,
        r#"
parallel = true
concurrency = 2

[[rules]]
name = "readme"
kind = "file-exists"
target = "README.md"
required = true
"#,
    );

    let config = AuditConfig::load(&config_path).expect("load config");
    config.validate().expect("valid config");

    let report = Auditor::new(config)
        .audit(dir.path(), ScanOptions::default())
        .await
        .expect("audit should succeed");

    let passed: Vec<bool> = report.services.iter().map(|s| s.passed).collect();
    assert_eq!(passed, vec![true, true, false]);
}
