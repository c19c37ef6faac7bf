//! File / directory / glob existence check.

use std::path::{Component, Path};

use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use walkdir::WalkDir;

use super::{Outcome, Rule, RuleKind, RuleResult, RuleSpec};
use crate::error::{ConfigError, RuleError};
use crate::service::Service;

const GLOB_META: &[char] = &['*', '?', '[', ']', '{', '}'];

/// Directories never descended into when matching a glob target.
const GLOB_SKIP_DIRS: &[&str] = &["node_modules", ".git"];

#[derive(Debug, Deserialize)]
struct FileExistsParams {
    target: String,
}

#[derive(Debug, Clone)]
enum Target {
    Literal(String),
    Glob { pattern: String, matcher: GlobMatcher },
}

/// Passes when the target path exists, or when a glob target has a match.
#[derive(Debug, Clone)]
pub struct FileExistsRule {
    name: String,
    required: bool,
    target: Target,
}

impl FileExistsRule {
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        required: bool,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let target = target.into();
        if target.trim().is_empty() {
            return Err(ConfigError::InvalidRuleParams {
                rule: name,
                reason: "target must not be empty".to_string(),
            });
        }
        if escapes_root(&target) {
            return Err(ConfigError::InvalidRuleParams {
                rule: name,
                reason: format!("target must stay inside the service root: {target}"),
            });
        }

        let target = if is_glob(&target) {
            let matcher = GlobBuilder::new(&target)
                .literal_separator(true)
                .build()
                .map_err(|e| ConfigError::InvalidRuleParams {
                    rule: name.clone(),
                    reason: format!("invalid glob '{target}': {e}"),
                })?
                .compile_matcher();
            Target::Glob {
                pattern: target,
                matcher,
            }
        } else {
            Target::Literal(target)
        };

        Ok(Self {
            name,
            required,
            target,
        })
    }

    pub fn from_spec(spec: &RuleSpec) -> Result<Self, ConfigError> {
        let params: FileExistsParams = spec.decode_params()?;
        Self::new(spec.name.clone(), params.target, spec.required)
    }

    async fn check_literal(&self, root: &Path, target: &str) -> Result<Outcome, RuleError> {
        let path = root.join(target);
        match tokio::fs::metadata(&path).await {
            Ok(meta) => {
                let (label, kind) = if meta.is_dir() {
                    ("Directory", "directory")
                } else {
                    ("File", "file")
                };
                Ok(Outcome::pass(format!("{label} exists: {target}"))
                    .with_details(json!({ "path": target, "type": kind })))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Outcome::fail(format!("File not found: {target}"))
                    .with_details(json!({ "path": target })))
            }
            Err(source) => Err(RuleError::Io { path, source }),
        }
    }

    async fn check_glob(
        &self,
        root: &Path,
        pattern: &str,
        matcher: &GlobMatcher,
    ) -> Result<Outcome, RuleError> {
        let walk_root = root.to_path_buf();
        let matcher = matcher.clone();
        let matches = tokio::task::spawn_blocking(move || collect_matches(&walk_root, &matcher))
            .await
            .map_err(|e| RuleError::Task(e.to_string()))??;

        let count = matches.len();
        let details = json!({ "pattern": pattern, "matches": matches, "count": count });
        if count == 0 {
            Ok(Outcome::fail(format!("No files found matching pattern: {pattern}"))
                .with_details(details))
        } else {
            Ok(Outcome::pass(format!(
                "Found {count} file(s) matching pattern: {pattern}"
            ))
            .with_details(details))
        }
    }
}

fn is_glob(target: &str) -> bool {
    target.chars().any(|c| GLOB_META.contains(&c))
}

/// Absolute targets and `..` segments would resolve outside the service.
fn escapes_root(target: &str) -> bool {
    Path::new(target).components().any(|c| {
        matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
    })
}

/// Relative, `/`-separated paths of files under `root` matching `matcher`.
///
/// A directory that cannot be read aborts the scan instead of being skipped.
fn collect_matches(root: &Path, matcher: &GlobMatcher) -> Result<Vec<String>, RuleError> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !GLOB_SKIP_DIRS.iter().any(|d| entry.file_name() == *d)
        });

    let mut matches = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if matcher.is_match(&relative) {
            matches.push(relative);
        }
    }
    matches.sort();
    Ok(matches)
}

fn walk_error(root: &Path, err: walkdir::Error) -> RuleError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    let message = err.to_string();
    match err.into_io_error() {
        Some(source) => {
            warn!(path = %path.display(), error = %source, "glob walk failed");
            RuleError::Io { path, source }
        }
        None => RuleError::Other(format!("failed to walk {}: {message}", path.display())),
    }
}

#[async_trait]
impl Rule for FileExistsRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_required(&self) -> bool {
        self.required
    }

    fn kind(&self) -> RuleKind {
        RuleKind::FileExists
    }

    async fn evaluate(&self, service: &Service) -> Result<RuleResult, RuleError> {
        let outcome = match &self.target {
            Target::Literal(target) => self.check_literal(&service.path, target).await?,
            Target::Glob { pattern, matcher } => {
                self.check_glob(&service.path, pattern, matcher).await?
            }
        };
        Ok(outcome.into_result(&self.name))
    }
}
