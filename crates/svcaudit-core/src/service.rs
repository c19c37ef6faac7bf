//! Discovered service descriptors.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Type tag for services whose manifest could not be parsed.
pub const UNKNOWN: &str = "unknown";

/// A unit under audit, identified by its root directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Name from the manifest (best effort).
    pub name: String,

    /// Absolute path of the service root (the manifest's directory).
    pub path: PathBuf,

    /// Classification tag: `node`, `backend`, `frontend` or `unknown`.
    #[serde(rename = "type")]
    pub service_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Service {
    /// Create a service with no optional metadata.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, service_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            service_type: service_type.into(),
            version: None,
            description: None,
        }
    }

    /// Placeholder for a service whose manifest is unreadable or malformed.
    pub fn unknown(path: impl Into<PathBuf>) -> Self {
        Self::new(UNKNOWN, path, UNKNOWN)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
