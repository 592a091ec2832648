//! Plugin host: the single entry point wiring registry, loader and
//! dispatcher together for the CLI and the host daemon.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use hookhub_core::config::AppConfig;

use crate::catalog::PluginCatalog;
use crate::contract::{Plugin, PluginConfig};
use crate::error::{PluginError, PluginResult};
use crate::hooks::definitions::{HookContext, HookPoint};
use crate::hooks::dispatcher::{DispatchOutcome, HookDispatcher};
use crate::loader::{LoadReport, PluginLoader};
use crate::registry::{PluginDescriptor, PluginRegistry, PluginStatus};

/// Manages the full lifecycle of plugins: load, dispatch, reload, unload.
#[derive(Debug)]
pub struct PluginHost {
    /// Plugin registry.
    registry: Arc<PluginRegistry>,
    /// Manifest loader.
    loader: PluginLoader,
    /// Hook dispatcher.
    dispatcher: HookDispatcher,
    /// Set once anything has been loaded or installed.
    ready: AtomicBool,
}

impl PluginHost {
    /// Creates a host with the given factory catalog.
    pub fn new(config: &AppConfig, catalog: PluginCatalog) -> Self {
        let registry = Arc::new(PluginRegistry::new(&config.circuit, &config.dispatch));
        let loader = PluginLoader::new(
            registry.clone(),
            Arc::new(catalog),
            config.plugins.overrides.clone(),
        );
        let dispatcher = HookDispatcher::new(registry.clone(), &config.dispatch);

        Self {
            registry,
            loader,
            dispatcher,
            ready: AtomicBool::new(false),
        }
    }

    /// Loads every manifest in `directory`.
    pub async fn load_plugins(&self, directory: &Path) -> PluginResult<LoadReport> {
        let report = self.loader.load_plugins(directory).await?;
        self.ready.store(true, Ordering::Release);
        Ok(report)
    }

    /// Reconciles the registry with `directory` (hot reload).
    pub async fn sync_directory(&self, directory: &Path) -> PluginResult<LoadReport> {
        let report = self.loader.sync_directory(directory).await?;
        self.ready.store(true, Ordering::Release);
        Ok(report)
    }

    /// Validates manifests without loading anything.
    pub fn validate_directory(&self, directory: &Path) -> PluginResult<LoadReport> {
        self.loader.validate_directory(directory)
    }

    /// Atomically replaces a plugin with a freshly built instance.
    pub async fn reload_plugin(&self, name: &str) -> PluginResult<LoadReport> {
        self.loader.reload_plugin(name).await
    }

    /// Installs a plugin instance built by the embedding application.
    pub async fn install(
        &self,
        name: &str,
        instance: Arc<dyn Plugin>,
        priority: i32,
        config: PluginConfig,
    ) -> PluginResult<()> {
        let result = self.loader.install(name, instance, priority, config).await;
        let rejected = matches!(
            result,
            Err(PluginError::DuplicateName(_) | PluginError::ContractViolation { .. })
        );
        if !rejected {
            self.ready.store(true, Ordering::Release);
        }
        result
    }

    /// Runs `hook` through the plugin chain.
    ///
    /// Fails only when nothing has been loaded yet; plugin failures are
    /// reported inside the outcome.
    pub async fn execute_hook(
        &self,
        hook: &str,
        context: HookContext,
    ) -> PluginResult<DispatchOutcome> {
        self.ensure_ready()?;
        Ok(self.dispatcher.execute_hook(hook, context).await)
    }

    /// Runs `hook`, stopping early when `cancel` fires.
    pub async fn execute_hook_with_cancel(
        &self,
        hook: &str,
        context: HookContext,
        cancel: &CancellationToken,
    ) -> PluginResult<DispatchOutcome> {
        self.ensure_ready()?;
        Ok(self
            .dispatcher
            .execute_hook_with_cancel(hook, context, cancel)
            .await)
    }

    /// Runs a well-known hook point.
    pub async fn fire(
        &self,
        point: HookPoint,
        context: HookContext,
    ) -> PluginResult<DispatchOutcome> {
        self.execute_hook(point.as_str(), context).await
    }

    fn ensure_ready(&self) -> PluginResult<()> {
        if self.ready.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(PluginError::NotInitialized)
        }
    }

    /// Enables a plugin.
    pub async fn enable(&self, name: &str) -> PluginResult<()> {
        self.registry.enable(name).await
    }

    /// Disables a plugin without unloading it.
    pub async fn disable(&self, name: &str) -> PluginResult<()> {
        self.registry.disable(name).await
    }

    /// Overrides a plugin's priority.
    pub async fn set_priority(&self, name: &str, priority: i32) -> PluginResult<()> {
        self.registry.set_priority(name, priority).await
    }

    /// Lists every plugin with its circuit state, in chain order.
    pub async fn list_plugins(&self) -> Vec<PluginStatus> {
        self.registry.list().await
    }

    /// Gets a plugin descriptor.
    pub async fn descriptor(&self, name: &str) -> Option<PluginDescriptor> {
        self.registry.descriptor(name).await
    }

    /// Unregisters a plugin, calling its `shutdown`.
    pub async fn unload_plugin(&self, name: &str) -> PluginResult<PluginDescriptor> {
        self.registry.unregister(name).await
    }

    /// Unregisters every plugin, shutting them down concurrently.
    /// Shutdown failures are logged and returned.
    pub async fn unload_all(&self) -> Vec<PluginError> {
        let names = self.registry.names().await;
        let results = join_all(names.iter().map(|name| self.registry.unregister(name))).await;

        let mut errors = Vec::new();
        for (name, result) in names.iter().zip(results) {
            if let Err(e) = result {
                error!(plugin = %name, error = %e, "Error unloading plugin");
                errors.push(e);
            }
        }

        info!("All plugins unloaded");
        errors
    }

    /// Returns the plugin registry.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Returns the hook dispatcher.
    pub fn dispatcher(&self) -> &HookDispatcher {
        &self.dispatcher
    }
}
