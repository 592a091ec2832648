//! Plugin system configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Plugin discovery and reload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSystemConfig {
    /// Directory containing plugin manifests.
    #[serde(default = "default_plugin_directory")]
    pub directory: String,
    /// Whether to automatically load plugins on startup.
    #[serde(default = "default_true")]
    pub auto_load: bool,
    /// Whether the host polls the plugin directory and reloads changes.
    #[serde(default)]
    pub hot_reload: bool,
    /// Interval in seconds between plugin directory polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// Per-plugin overrides keyed by plugin name.
    #[serde(default)]
    pub overrides: HashMap<String, PluginOverride>,
}

impl Default for PluginSystemConfig {
    fn default() -> Self {
        Self {
            directory: default_plugin_directory(),
            auto_load: true,
            hot_reload: false,
            poll_interval_seconds: default_poll_interval(),
            overrides: HashMap::new(),
        }
    }
}

/// Host-side override applied on top of a plugin manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginOverride {
    /// Replaces the manifest priority.
    #[serde(default)]
    pub priority: Option<i32>,
    /// Replaces the manifest enabled flag.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Replaces the per-call hook timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Merged over the manifest's `[config]` table, key by key.
    #[serde(default)]
    pub config: HashMap<String, Value>,
}

fn default_plugin_directory() -> String {
    "./plugins".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    5
}
