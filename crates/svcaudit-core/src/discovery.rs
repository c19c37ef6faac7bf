//! Service discovery.
//!
//! Walks a root directory for `package.json` manifests and turns each one into
//! a [`Service`]. Build output, dependency caches, VCS metadata and coverage
//! output are always skipped; caller patterns are layered on top.

use std::convert::Infallible;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use tracing::{debug, info, warn, Instrument, Span};
use walkdir::WalkDir;

use crate::error::ScanError;
use crate::pool::map_bounded;
use crate::service::Service;

/// File that marks a directory as a service.
pub const MANIFEST_FILE: &str = "package.json";

/// Exclusions applied to every scan.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/node_modules/**",
    "**/dist/**",
    "**/build/**",
    "**/.git/**",
    "**/coverage/**",
];

/// Manifest reads in flight at once.
pub const MANIFEST_READ_CONCURRENCY: usize = 16;

const WEB_FRAMEWORKS: &[&str] = &["express", "fastify", "koa", "@nestjs/core", "@hapi/hapi"];
const FRONTEND_FRAMEWORKS: &[&str] = &["react", "vue", "@angular/core", "svelte", "next"];

/// Options controlling a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Maximum directory depth of a service below the root (root is 0).
    pub max_depth: Option<usize>,

    /// Extra exclusion globs, relative to the root.
    pub exclude: Vec<String>,
}

impl ScanOptions {
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }
}

/// Finds services beneath a root path.
pub struct Scanner {
    options: ScanOptions,
    excludes: GlobSet,
    span: Span,
}

impl Scanner {
    /// Build a scanner; fails if any exclusion pattern is not a valid glob.
    pub fn new(options: ScanOptions) -> Result<Self, ScanError> {
        let excludes = build_exclude_set(&options.exclude)?;
        Ok(Self {
            options,
            excludes,
            span: Span::current(),
        })
    }

    /// Attach the span that scan logs are recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Discover services under `root`, sorted by path.
    pub async fn scan(&self, root: &Path) -> Result<Vec<Service>, ScanError> {
        self.scan_inner(root).instrument(self.span.clone()).await
    }

    async fn scan_inner(&self, root: &Path) -> Result<Vec<Service>, ScanError> {
        let root = resolve_root(root).await?;
        info!(root = %root.display(), "scanning for services");

        let walk_root = root.clone();
        let excludes = self.excludes.clone();
        let max_depth = self.options.max_depth;
        let manifests = tokio::task::spawn_blocking(move || {
            find_manifests(&walk_root, &excludes, max_depth)
        })
        .await
        .map_err(|e| ScanError::Walk {
            path: root.clone(),
            reason: format!("walker task failed: {e}"),
        })??;

        let services = match map_bounded(&manifests, MANIFEST_READ_CONCURRENCY, |m| async move {
            Ok::<_, Infallible>(load_service(m).await)
        })
        .await
        {
            Ok(services) => services,
            Err(never) => match never {},
        };
        info!(count = services.len(), "service discovery complete");
        Ok(services)
    }
}

async fn resolve_root(root: &Path) -> Result<PathBuf, ScanError> {
    let canonical = match tokio::fs::canonicalize(root).await {
        Ok(p) => p,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScanError::NotFound(root.to_path_buf()))
        }
        Err(source) => {
            return Err(ScanError::Io {
                path: root.to_path_buf(),
                source,
            })
        }
    };

    let meta = tokio::fs::metadata(&canonical)
        .await
        .map_err(|source| ScanError::Io {
            path: canonical.clone(),
            source,
        })?;
    if !meta.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    Ok(canonical)
}

/// Build the exclusion set from defaults plus caller patterns.
///
/// A pattern ending in `/**` also matches the directory itself so the walk can
/// prune it instead of descending.
fn build_exclude_set(extra: &[String]) -> Result<GlobSet, ScanError> {
    let mut builder = GlobSetBuilder::new();
    let patterns = DEFAULT_EXCLUDES
        .iter()
        .map(|p| p.to_string())
        .chain(extra.iter().cloned());

    for pattern in patterns {
        let glob = Glob::new(&pattern).map_err(|e| ScanError::InvalidPattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);

        if let Some(dir) = pattern.strip_suffix("/**") {
            if !dir.is_empty() {
                let dir_glob = Glob::new(dir).map_err(|e| ScanError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                builder.add(dir_glob);
            }
        }
    }

    builder.build().map_err(|e| ScanError::InvalidPattern {
        pattern: extra.join(", "),
        reason: e.to_string(),
    })
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Blocking walk returning manifest paths in lexicographic order.
fn find_manifests(
    root: &Path,
    excludes: &GlobSet,
    max_depth: Option<usize>,
) -> Result<Vec<PathBuf>, ScanError> {
    let mut walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
    if let Some(depth) = max_depth {
        // The manifest sits one level below its service directory.
        walker = walker.max_depth(depth + 1);
    }

    let iter = walker.into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        !excludes.is_match(relative_slash_path(root, entry.path()))
    });

    let mut manifests = Vec::new();
    for entry in iter {
        let entry = entry.map_err(|e| ScanError::Walk {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            reason: e.to_string(),
        })?;
        if entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE {
            manifests.push(entry.into_path());
        }
    }

    manifests.sort_by(|a, b| a.parent().cmp(&b.parent()));
    Ok(manifests)
}

async fn load_service(manifest: &Path) -> Service {
    let dir = manifest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest.to_path_buf());

    let content = match tokio::fs::read_to_string(manifest).await {
        Ok(c) => c,
        Err(e) => {
            warn!(manifest = %manifest.display(), error = %e, "unreadable manifest");
            return Service::unknown(dir);
        }
    };

    match parse_manifest(&content, &dir) {
        Some(service) => {
            debug!(name = %service.name, kind = %service.service_type, "discovered service");
            service
        }
        None => {
            warn!(manifest = %manifest.display(), "malformed manifest, recording as unknown");
            Service::unknown(dir)
        }
    }
}

/// Parse manifest text; `None` when it is not a JSON object.
fn parse_manifest(content: &str, dir: &Path) -> Option<Service> {
    let value: Value = serde_json::from_str(content).ok()?;
    let obj = value.as_object()?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| crate::service::UNKNOWN.to_string())
        });

    let mut service = Service::new(name, dir, classify(&value));
    if let Some(version) = obj.get("version").and_then(Value::as_str) {
        service = service.with_version(version);
    }
    if let Some(description) = obj.get("description").and_then(Value::as_str) {
        service = service.with_description(description);
    }
    Some(service)
}

/// Classify a manifest by its dependency markers.
fn classify(manifest: &Value) -> &'static str {
    let has_any = |markers: &[&str]| {
        ["dependencies", "devDependencies"].iter().any(|section| {
            manifest
                .get(section)
                .and_then(Value::as_object)
                .map(|deps| markers.iter().any(|m| deps.contains_key(*m)))
                .unwrap_or(false)
        })
    };

    if has_any(WEB_FRAMEWORKS) {
        "backend"
    } else if has_any(FRONTEND_FRAMEWORKS) {
        "frontend"
    } else {
        "node"
    }
}
