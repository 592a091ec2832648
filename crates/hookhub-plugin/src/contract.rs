//! The plugin contract every plugin must satisfy.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PluginError, PluginResult};
use crate::hooks::definitions::HookContext;

/// Private configuration handed to a plugin's `initialize`.
///
/// The loader builds it from the manifest's `[config]` table merged with
/// host overrides, and hands the plugin an owned copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginConfig {
    values: Map<String, Value>,
}

impl PluginConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    /// Merges `other` over `self`, key by key.
    pub fn merge(&mut self, other: impl IntoIterator<Item = (String, Value)>) {
        for (key, value) in other {
            self.values.insert(key, value);
        }
    }

    /// Gets a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Gets a string value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// Gets an unsigned integer value.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(|v| v.as_u64())
    }

    /// Gets a bool value.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(|v| v.as_bool())
    }

    /// Gets a list of strings. Non-string entries are ignored.
    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        self.values.get(key).and_then(|v| v.as_array()).map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
    }

    /// Whether the configuration is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Map<String, Value>> for PluginConfig {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}

/// Trait that all plugins must implement.
///
/// `initialize` is called exactly once, after construction and before any
/// hook call. Plugins are shared behind `Arc` while hooks run, so all
/// methods take `&self`; use interior mutability for plugin state.
#[async_trait]
pub trait Plugin: Send + Sync + std::fmt::Debug {
    /// The plugin's own name, used when a manifest does not override it.
    fn name(&self) -> &str;

    /// Plugin version string.
    fn version(&self) -> &str;

    /// Hook names this plugin implements.
    fn hooks(&self) -> Vec<String>;

    /// Validates configuration and prepares the plugin.
    async fn initialize(&self, config: PluginConfig) -> PluginResult<()>;

    /// Releases plugin resources. Called on unregister and reload.
    async fn shutdown(&self) -> PluginResult<()>;

    /// Runs one hook, returning the (possibly modified) context.
    async fn call_hook(&self, hook: &str, context: HookContext) -> PluginResult<HookContext>;
}

/// Checks an instance against the hooks its manifest requires.
///
/// Returns the hook list to record on the descriptor: the required hooks
/// when given, otherwise everything the plugin implements.
pub fn validate_contract(
    plugin_name: &str,
    instance: &dyn Plugin,
    required_hooks: Option<&[String]>,
) -> PluginResult<Vec<String>> {
    let implemented = instance.hooks();
    let mut seen = HashSet::new();

    for hook in &implemented {
        if hook.trim().is_empty() {
            return Err(PluginError::ContractViolation {
                plugin: plugin_name.to_string(),
                missing: "a non-empty hook name".to_string(),
            });
        }
        if !seen.insert(hook.as_str()) {
            return Err(PluginError::ContractViolation {
                plugin: plugin_name.to_string(),
                missing: format!("unique hook names (duplicate '{hook}')"),
            });
        }
    }

    match required_hooks {
        Some(required) => {
            if let Some(missing) = required.iter().find(|hook| !seen.contains(hook.as_str())) {
                return Err(PluginError::ContractViolation {
                    plugin: plugin_name.to_string(),
                    missing: format!("hook method '{missing}'"),
                });
            }
            Ok(required.to_vec())
        }
        None => Ok(implemented),
    }
}
