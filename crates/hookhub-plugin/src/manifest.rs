//! Plugin manifests: one file per plugin in the plugin directory.
//!
//! ```toml
//! name = "request-id"
//! factory = "request_id"
//! priority = 10
//! hooks = ["before_request"]
//!
//! [config]
//! header = "x-request-id"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PluginError, PluginResult};

/// File extensions recognized as manifests.
pub const MANIFEST_EXTENSIONS: &[&str] = &["toml", "json", "yaml", "yml"];

/// Default priority for manifests that do not set one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Parsed plugin manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    /// Registry key.
    pub name: String,
    /// Catalog factory id.
    pub factory: String,
    /// Version; defaults to the plugin's own.
    #[serde(default)]
    pub version: Option<String>,
    /// Execution priority (lower runs first).
    #[serde(default)]
    pub priority: Option<i32>,
    /// Whether the plugin starts enabled.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Hooks the plugin must implement; defaults to all it declares.
    #[serde(default)]
    pub hooks: Option<Vec<String>>,
    /// Per-call hook timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Private plugin configuration.
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

impl PluginManifest {
    /// Reads and validates a manifest. The format follows the extension.
    pub fn from_path(path: &Path) -> PluginResult<Self> {
        let manifest_error = |reason: String| PluginError::Manifest {
            path: path.display().to_string(),
            reason,
        };

        let manifest: Self = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| manifest_error(e.to_string()))?;

        if manifest.name.trim().is_empty() {
            return Err(manifest_error("'name' must not be empty".to_string()));
        }
        if manifest.factory.trim().is_empty() {
            return Err(manifest_error("'factory' must not be empty".to_string()));
        }
        if manifest.timeout_ms == Some(0) {
            return Err(manifest_error("'timeout_ms' must be positive".to_string()));
        }

        Ok(manifest)
    }

    /// Effective priority.
    pub fn priority(&self) -> i32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }
}

/// Name to report for a manifest that could not be parsed: its file stem.
pub fn fallback_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Lists manifest files in `directory`, sorted by file name.
pub fn discover(directory: &Path) -> PluginResult<Vec<PathBuf>> {
    let io_error = |e: std::io::Error| PluginError::Io {
        path: directory.display().to_string(),
        reason: e.to_string(),
    };

    let mut manifests = Vec::new();
    for entry in std::fs::read_dir(directory).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if !path.is_file() {
            continue;
        }
        let recognized = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| MANIFEST_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if recognized {
            manifests.push(path);
        }
    }

    manifests.sort();
    Ok(manifests)
}

/// Last modification time of a manifest, if the filesystem reports one.
pub fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
