//! Shared test plugins and helpers for hookhub-plugin integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::json;

use hookhub_core::config::AppConfig;
use hookhub_plugin::prelude::*;
use hookhub_plugin::PluginHost;

/// Counters shared between a factory and every instance it builds.
#[derive(Debug, Default)]
pub struct Counters {
    pub created: AtomicUsize,
    pub initialized: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub calls: AtomicUsize,
    pub fail_hooks: AtomicBool,
}

/// Appends its `tag` config value to the context's `trail` array.
#[derive(Debug)]
pub struct Tagger {
    counters: Arc<Counters>,
    generation: usize,
    tag: parking_lot::Mutex<String>,
}

#[async_trait]
impl Plugin for Tagger {
    fn name(&self) -> &str {
        "tagger"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn hooks(&self) -> Vec<String> {
        hook_names![HookPoint::BeforeRequest, HookPoint::AfterRequest]
    }

    async fn initialize(&self, config: PluginConfig) -> PluginResult<()> {
        self.counters.initialized.fetch_add(1, Ordering::SeqCst);
        if config.get_bool("fail_init").unwrap_or(false) {
            return Err(PluginError::init("tagger", "fail_init requested"));
        }
        *self.tag.lock() = config.get_str("tag").unwrap_or("tagger").to_string();
        Ok(())
    }

    async fn shutdown(&self) -> PluginResult<()> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn call_hook(&self, hook: &str, mut context: HookContext) -> PluginResult<HookContext> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_hooks.load(Ordering::SeqCst) {
            return Err(PluginError::hook("tagger", hook, "asked to fail"));
        }
        let mut trail = context
            .get("trail")
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default();
        trail.push(json!(format!("{}#{}", self.tag.lock(), self.generation)));
        context.insert("trail", json!(trail));
        Ok(context)
    }
}

/// Builds a catalog with a `tagger` factory reporting into `counters`.
pub fn catalog(counters: Arc<Counters>) -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    catalog.register("tagger", move || -> Arc<dyn Plugin> {
        let generation = counters.created.fetch_add(1, Ordering::SeqCst);
        Arc::new(Tagger {
            counters: counters.clone(),
            generation,
            tag: parking_lot::Mutex::new(String::new()),
        })
    });
    catalog
}

pub fn host(config: &AppConfig, counters: Arc<Counters>) -> PluginHost {
    PluginHost::new(config, catalog(counters))
}

pub fn write_manifest(dir: &Path, file: &str, body: &str) -> PathBuf {
    let path = dir.join(file);
    std::fs::write(&path, body).expect("write manifest");
    path
}

pub fn tagger_manifest(name: &str, priority: i32, tag: &str) -> String {
    format!(
        "name = \"{name}\"\nfactory = \"tagger\"\npriority = {priority}\n\n\
         [config]\ntag = \"{tag}\"\n"
    )
}

pub fn trail(context: &HookContext) -> Vec<String> {
    context
        .get("trail")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
