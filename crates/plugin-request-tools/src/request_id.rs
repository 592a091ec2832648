//! Request id plugin.
//!
//! On `before_request`, makes sure the context carries a `request_id`:
//! an existing value is kept, a value from the configured request header
//! is adopted, otherwise a UUID v4 is generated.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use hookhub_plugin::prelude::*;

/// Factory id used in manifests.
pub const FACTORY_ID: &str = "request_id";

/// Header consulted when the context has no `request_id`.
const DEFAULT_HEADER: &str = "x-request-id";

/// Assigns a request id to every request.
#[derive(Debug)]
pub struct RequestIdPlugin {
    /// Lowercased header name.
    header: RwLock<String>,
}

impl RequestIdPlugin {
    /// Creates an uninitialized plugin.
    pub fn new() -> Self {
        Self {
            header: RwLock::new(DEFAULT_HEADER.to_string()),
        }
    }

    fn from_headers(&self, context: &HookContext) -> Option<String> {
        let header = self.header.read();
        context
            .get("headers")
            .and_then(Value::as_object)?
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&header))
            .and_then(|(_, value)| value.as_str())
            .filter(|value| !value.trim().is_empty())
            .map(str::to_string)
    }
}

impl Default for RequestIdPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for RequestIdPlugin {
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
        if let Some(header) = config.get("header") {
            let header = header
                .as_str()
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .ok_or_else(|| {
                    PluginError::init(FACTORY_ID, "'header' must be a non-empty string")
                })?;
            *self.header.write() = header.to_ascii_lowercase();
        }
        tracing::debug!(header = %self.header.read(), "Request id plugin initialized");
        Ok(())
    }

    async fn shutdown(&self) -> PluginResult<()> {
        Ok(())
    }

    async fn call_hook(&self, hook: &str, mut context: HookContext) -> PluginResult<HookContext> {
        if hook != HookPoint::BeforeRequest.as_str() {
            return Ok(context);
        }
        if context.get_str("request_id").is_some() {
            return Ok(context);
        }

        let id = self
            .from_headers(&context)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        context.insert("request_id", Value::String(id));
        Ok(context)
    }
}
