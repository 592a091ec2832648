//! Latency plugin: stamps `started_at` before a request and reports
//! `duration_ms` after it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use hookhub_plugin::prelude::*;

/// Factory id used in manifests.
pub const FACTORY_ID: &str = "latency";

/// Measures request latency across `before_request` and `after_request`.
#[derive(Debug, Default)]
pub struct LatencyPlugin {
    /// Requests slower than this are logged at warn.
    slow_threshold_ms: RwLock<Option<i64>>,
}

impl LatencyPlugin {
    /// Creates an uninitialized plugin.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Plugin for LatencyPlugin {
    fn name(&self) -> &str {
        FACTORY_ID
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn hooks(&self) -> Vec<String> {
        hook_names![HookPoint::BeforeRequest, HookPoint::AfterRequest]
    }

    async fn initialize(&self, config: PluginConfig) -> PluginResult<()> {
        if let Some(value) = config.get("slow_threshold_ms") {
            let threshold = value.as_u64().ok_or_else(|| {
                PluginError::init(FACTORY_ID, "'slow_threshold_ms' must be a non-negative integer")
            })?;
            *self.slow_threshold_ms.write() = Some(threshold as i64);
        }
        Ok(())
    }

    async fn shutdown(&self) -> PluginResult<()> {
        Ok(())
    }

    async fn call_hook(&self, hook: &str, mut context: HookContext) -> PluginResult<HookContext> {
        match HookPoint::from_name(hook) {
            Some(HookPoint::BeforeRequest) => {
                context.insert("started_at", Value::String(Utc::now().to_rfc3339()));
            }
            Some(HookPoint::AfterRequest) => {
                let Some(started) = context.get_str("started_at") else {
                    return Ok(context);
                };
                let started = DateTime::parse_from_rfc3339(started).map_err(|e| {
                    PluginError::hook(FACTORY_ID, hook, format!("invalid 'started_at': {e}"))
                })?;
                let duration_ms = (Utc::now() - started.with_timezone(&Utc))
                    .num_milliseconds()
                    .max(0);

                if let Some(threshold) = *self.slow_threshold_ms.read() {
                    if duration_ms > threshold {
                        tracing::warn!(
                            duration_ms,
                            threshold_ms = threshold,
                            path = context.get_str("path").unwrap_or("-"),
                            "Slow request"
                        );
                    }
                }
                context.insert("duration_ms", Value::from(duration_ms));
            }
            _ => {}
        }
        Ok(context)
    }
}
