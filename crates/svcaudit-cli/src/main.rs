//! svcaudit - service compliance auditing CLI
//!
//! ## Commands
//!
//! - `audit`: Run compliance rules against every service under a root
//! - `scan`: List discovered services without auditing them
//! - `rules`: Show the built-in rule kinds
//!
//! Exit status of `audit` is 0 when every service passed, 1 when any service
//! failed and 2 when the audit could not run.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{debug, error, info};

use svcaudit_core::telemetry;
use svcaudit_core::{
    render_json, render_markdown, write_report, AuditConfig, AuditReport, Auditor, ReportFormat,
    RuleKind, ScanOptions, Scanner, Service,
};

#[derive(Parser)]
#[command(name = "svcaudit")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Audit monorepo services against compliance rules", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit every service under a root directory
    Audit {
        /// Root directory to scan (default: current directory)
        #[arg(default_value = ".")]
        root: PathBuf,

        /// Rule configuration file (JSON or TOML); defaults to README + semver checks
        #[arg(short, long, env = "SVCAUDIT_CONFIG")]
        config: Option<PathBuf>,

        /// Evaluate rules and services concurrently
        #[arg(long)]
        parallel: bool,

        /// Maximum services audited at once (overrides the config file)
        #[arg(long)]
        concurrency: Option<usize>,

        #[command(flatten)]
        scan: ScanArgs,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List services discovered under a root directory as JSON
    Scan {
        /// Root directory to scan (default: current directory)
        #[arg(default_value = ".")]
        root: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// List built-in rule kinds
    Rules {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
struct ScanArgs {
    /// Maximum service depth below the root
    #[arg(long)]
    max_depth: Option<usize>,

    /// Additional exclusion glob, relative to the root (repeatable)
    #[arg(short, long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,
}

impl ScanArgs {
    fn options(&self) -> ScanOptions {
        ScanOptions {
            max_depth: self.max_depth,
            exclude: self.exclude.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    #[value(alias = "md")]
    Markdown,
}

impl From<Format> for ReportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => ReportFormat::Json,
            Format::Markdown => ReportFormat::Markdown,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    telemetry::init_tracing(cli.json_logs, telemetry::level_for(cli.verbose));

    match run(cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %format!("{e:#}"), "svcaudit failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Dispatch a command; `Ok(false)` means the audit ran and found failures.
async fn run(command: Commands) -> Result<bool> {
    match command {
        Commands::Audit {
            root,
            config,
            parallel,
            concurrency,
            scan,
            format,
            output,
        } => {
            let config = resolve_config(config.as_deref(), parallel, concurrency)?;
            let report = cmd_audit(&root, config, scan.options()).await?;
            emit_report(&report, format.into(), output.as_deref())?;
            Ok(report.all_passed())
        }
        Commands::Scan { root, scan } => {
            cmd_scan(&root, scan.options()).await?;
            Ok(true)
        }
        Commands::Rules { json } => {
            cmd_rules(json)?;
            Ok(true)
        }
    }
}

/// Load the rule configuration and apply command-line overrides.
fn resolve_config(
    path: Option<&Path>,
    parallel: bool,
    concurrency: Option<usize>,
) -> Result<AuditConfig> {
    let mut config = match path {
        Some(path) => AuditConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AuditConfig::default_rules(),
    };

    if parallel {
        config.parallel = true;
    }
    if let Some(limit) = concurrency {
        config.concurrency = limit;
    }

    config.validate().context("Invalid audit configuration")?;
    Ok(config)
}

async fn cmd_audit(root: &Path, config: AuditConfig, options: ScanOptions) -> Result<AuditReport> {
    let auditor = Auditor::new(config).with_progress(|done, total, name| {
        debug!(done, total, service = name, "service audited");
    });

    let report = auditor
        .audit(root, options)
        .await
        .with_context(|| format!("Audit of {} failed", root.display()))?;

    info!(
        services = report.summary.total_services,
        passed = report.summary.passed_services,
        failed = report.summary.failed_services,
        "audit finished"
    );
    Ok(report)
}

fn emit_report(report: &AuditReport, format: ReportFormat, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            write_report(path, report, format)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!(
                "Report written to {} ({}/{} services passed)",
                path.display(),
                report.summary.passed_services,
                report.summary.total_services
            );
        }
        None => {
            let rendered = match format {
                ReportFormat::Json => render_json(report)?,
                ReportFormat::Markdown => render_markdown(report),
            };
            println!("{rendered}");
        }
    }
    Ok(())
}

async fn cmd_scan(root: &Path, options: ScanOptions) -> Result<()> {
    let services: Vec<Service> = Scanner::new(options)?
        .scan(root)
        .await
        .with_context(|| format!("Failed to scan {}", root.display()))?;
    println!("{}", serde_json::to_string_pretty(&services)?);
    Ok(())
}

#[derive(Serialize)]
struct RuleKindInfo {
    kind: &'static str,
    description: &'static str,
}

fn rule_kinds() -> Vec<RuleKindInfo> {
    RuleKind::ALL
        .iter()
        .map(|k| RuleKindInfo {
            kind: k.name(),
            description: k.description(),
        })
        .collect()
}

fn cmd_rules(json: bool) -> Result<()> {
    let kinds = rule_kinds();
    if json {
        println!("{}", serde_json::to_string_pretty(&kinds)?);
    } else {
        for info in &kinds {
            println!("{:<12} {}", info.kind, info.description);
        }
    }
    Ok(())
}
