//! Plugin factory catalog.
//!
//! Plugins are compiled into the host and looked up by a stable factory id
//! named in each manifest. The loader asks the catalog for a fresh instance
//! on every load and reload.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::contract::Plugin;
use crate::error::{PluginError, PluginResult};

/// Builds fresh plugin instances.
pub trait PluginFactory: Send + Sync {
    /// Creates a new, uninitialized instance.
    fn create(&self) -> Arc<dyn Plugin>;
}

impl<F> PluginFactory for F
where
    F: Fn() -> Arc<dyn Plugin> + Send + Sync,
{
    fn create(&self) -> Arc<dyn Plugin> {
        self()
    }
}

/// Factory lookup keyed by factory id.
#[derive(Default)]
pub struct PluginCatalog {
    factories: BTreeMap<String, Arc<dyn PluginFactory>>,
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory. Re-registering an id replaces the factory.
    pub fn register(&mut self, id: &str, factory: impl PluginFactory + 'static) -> &mut Self {
        debug!(factory = %id, "Plugin factory registered");
        self.factories.insert(id.to_string(), Arc::new(factory));
        self
    }

    /// Builds a fresh instance from the factory registered under `id`.
    pub fn create(&self, id: &str) -> PluginResult<Arc<dyn Plugin>> {
        self.factories
            .get(id)
            .map(|factory| factory.create())
            .ok_or_else(|| PluginError::UnknownFactory(id.to_string()))
    }

    /// Whether a factory id is known.
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Known factory ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}
