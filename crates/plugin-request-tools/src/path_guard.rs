//! Path guard plugin: flags requests whose `path` starts with a blocked
//! prefix. Requires a non-empty `blocked_prefixes` list.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use hookhub_plugin::prelude::*;

/// Factory id used in manifests.
pub const FACTORY_ID: &str = "path_guard";

#[derive(Debug, Default)]
pub struct PathGuardPlugin {
    prefixes: RwLock<Vec<String>>,
}

impl PathGuardPlugin {
    /// Creates an uninitialized plugin.
    pub fn new() -> Self {
        Self::default()
    }

    fn matching_prefix(&self, path: &str) -> Option<String> {
        self.prefixes
            .read()
            .iter()
            .find(|prefix| path.starts_with(prefix.as_str()))
            .cloned()
    }
}

#[async_trait]
impl Plugin for PathGuardPlugin {
    fn name(&self) -> &str {
        FACTORY_ID
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn hooks(&self) -> Vec<String> {
        hook_names![HookPoint::BeforeRequest]
    }

    async fn initialize(&self, config: PluginConfig) -> PluginResult<()> {
        let prefixes: Vec<String> = config
            .get_string_list("blocked_prefixes")
            .unwrap_or_default()
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();

        if prefixes.is_empty() {
            return Err(PluginError::init(
                FACTORY_ID,
                "'blocked_prefixes' must list at least one prefix",
            ));
        }

        tracing::info!(prefixes = ?prefixes, "Path guard armed");
        *self.prefixes.write() = prefixes;
        Ok(())
    }

    async fn shutdown(&self) -> PluginResult<()> {
        self.prefixes.write().clear();
        Ok(())
    }

    async fn call_hook(&self, hook: &str, mut context: HookContext) -> PluginResult<HookContext> {
        if hook != HookPoint::BeforeRequest.as_str() {
            return Ok(context);
        }
        let Some(path) = context.get_str("path").map(str::to_string) else {
            return Ok(context);
        };

        if let Some(prefix) = self.matching_prefix(&path) {
            let reason = format!("path '{path}' matches blocked prefix '{prefix}'");
            tracing::info!(path = %path, prefix = %prefix, "Request blocked");
            context.insert("blocked", Value::Bool(true));
            context.insert("block_reason", Value::String(reason));
        }
        Ok(context)
    }
}
