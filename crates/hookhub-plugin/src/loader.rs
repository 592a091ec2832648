//! Manifest-driven plugin loader.
//!
//! Each manifest is turned into a live plugin by looking its factory up in
//! the [`PluginCatalog`], validating the contract, merging host overrides,
//! running `initialize` and registering the result. Failures are per plugin
//! and land in the [`LoadReport`]; only an unreadable directory is fatal.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use hookhub_core::config::PluginOverride;

use crate::catalog::PluginCatalog;
use crate::contract::{Plugin, PluginConfig, validate_contract};
use crate::error::{PluginError, PluginResult};
use crate::manifest::{self, PluginManifest};
use crate::registry::{PluginDescriptor, PluginRegistry, shutdown_instance};

/// A plugin that could not be loaded (or loaded disabled).
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    /// Plugin name, or the manifest file stem when the manifest is unreadable.
    pub name: String,
    /// What went wrong.
    pub reason: PluginError,
}

/// Overall classification of a load operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Nothing to do: no manifests found or changed.
    Empty,
    /// Every plugin loaded.
    Succeeded,
    /// Some plugins loaded, some failed.
    Partial,
    /// Every plugin failed.
    Failed,
}

/// Structured result of a load, reload or directory sync.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    /// Plugins newly registered and initialized.
    pub loaded: Vec<String>,
    /// Plugins whose instance was replaced.
    pub reloaded: Vec<String>,
    /// Plugins unregistered because their manifest disappeared.
    pub removed: Vec<String>,
    /// Plugins that failed to load or initialize.
    pub failed: Vec<LoadFailure>,
    /// Non-fatal problems, such as a failed `shutdown` during reload.
    pub warnings: Vec<LoadFailure>,
    /// When the operation finished.
    pub completed_at: DateTime<Utc>,
}

impl LoadReport {
    fn new() -> Self {
        Self {
            loaded: Vec::new(),
            reloaded: Vec::new(),
            removed: Vec::new(),
            failed: Vec::new(),
            warnings: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    fn finish(mut self) -> Self {
        self.completed_at = Utc::now();
        self
    }

    /// Classifies the report.
    pub fn outcome(&self) -> LoadOutcome {
        let succeeded = self.loaded.len() + self.reloaded.len() + self.removed.len();
        match (succeeded, self.failed.len()) {
            (0, 0) => LoadOutcome::Empty,
            (_, 0) => LoadOutcome::Succeeded,
            (0, _) => LoadOutcome::Failed,
            _ => LoadOutcome::Partial,
        }
    }

    /// Names of failed plugins.
    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.name.as_str()).collect()
    }

    fn fail(&mut self, name: String, reason: PluginError) {
        self.failed.push(LoadFailure { name, reason });
    }
}

/// What the loader last saw of a manifest file.
#[derive(Debug, Clone)]
struct ManifestStamp {
    /// Plugin registered from this file; `None` when the file failed to parse.
    name: Option<String>,
    modified: Option<SystemTime>,
}

/// Loads, reloads and reconciles plugins from manifest directories.
#[derive(Debug)]
pub struct PluginLoader {
    registry: Arc<PluginRegistry>,
    catalog: Arc<PluginCatalog>,
    overrides: HashMap<String, PluginOverride>,
    stamps: Mutex<HashMap<PathBuf, ManifestStamp>>,
}

impl PluginLoader {
    /// Creates a loader registering into `registry`.
    pub fn new(
        registry: Arc<PluginRegistry>,
        catalog: Arc<PluginCatalog>,
        overrides: HashMap<String, PluginOverride>,
    ) -> Self {
        Self {
            registry,
            catalog,
            overrides,
            stamps: Mutex::new(HashMap::new()),
        }
    }

    /// Loads every manifest in `directory`.
    ///
    /// Returns `Err` only if the directory cannot be read.
    pub async fn load_plugins(&self, directory: &Path) -> PluginResult<LoadReport> {
        let paths = manifest::discover(directory)?;
        info!(
            directory = %directory.display(),
            manifests = paths.len(),
            "Loading plugins"
        );

        let mut report = LoadReport::new();
        for path in paths {
            self.load_path(&path, &mut report).await;
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Plugin load complete"
        );
        Ok(report.finish())
    }

    /// Replaces a plugin with a fresh instance built from its manifest.
    ///
    /// Runs under the registry write lock: the old instance is shut down,
    /// the manifest is re-read, and the new instance takes the old slot.
    pub async fn reload_plugin(&self, name: &str) -> PluginResult<LoadReport> {
        let descriptor = self
            .registry
            .descriptor(name)
            .await
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        let path = descriptor.source.clone().ok_or_else(|| PluginError::Manifest {
            path: "<none>".to_string(),
            reason: format!("plugin '{name}' was not loaded from a manifest"),
        })?;

        let mut report = LoadReport::new();
        let rebuild_path = path.clone();
        let swap = self
            .registry
            .swap(name, |_previous| async move {
                let manifest = PluginManifest::from_path(&rebuild_path)?;
                self.build(&manifest, &rebuild_path).await
            })
            .await;

        match swap {
            Ok(swap) => {
                if let Some(shutdown_error) = swap.shutdown_error {
                    report.warnings.push(LoadFailure {
                        name: name.to_string(),
                        reason: shutdown_error,
                    });
                }
                self.stamp(&path, Some(name.to_string()));
                report.reloaded.push(name.to_string());
                self.report_init_failure(name, &mut report).await;
                info!(plugin = %name, "Plugin reloaded");
                Ok(report.finish())
            }
            Err(e) => {
                self.stamp(&path, None);
                error!(plugin = %name, error = %e, "Plugin reload failed");
                Err(e)
            }
        }
    }

    /// Reconciles the registry with `directory`: loads new manifests,
    /// reloads changed ones and unregisters plugins whose manifest is gone.
    pub async fn sync_directory(&self, directory: &Path) -> PluginResult<LoadReport> {
        let paths = manifest::discover(directory)?;
        let present: HashSet<PathBuf> = paths.iter().cloned().collect();
        let mut report = LoadReport::new();

        for path in &paths {
            let seen = self.stamps.lock().get(path).cloned();
            let Some(seen) = seen else {
                self.load_path(path, &mut report).await;
                continue;
            };

            if seen.modified == manifest::modified(path) {
                continue;
            }

            let current_name = PluginManifest::from_path(path).ok().map(|m| m.name);
            let reloadable = match &seen.name {
                Some(name) if current_name.as_deref() == Some(name.as_str()) => {
                    self.registry.contains(name).await
                }
                _ => false,
            };

            match seen.name {
                Some(name) if reloadable => {
                    match self.reload_plugin(&name).await {
                        Ok(reloaded) => report.merge(reloaded),
                        Err(e) => report.fail(name, e),
                    }
                }
                Some(name) => {
                    self.remove_plugin(&name, &mut report).await;
                    self.load_path(path, &mut report).await;
                }
                None => self.load_path(path, &mut report).await,
            }
        }

        let vanished: Vec<(PathBuf, Option<String>)> = self
            .stamps
            .lock()
            .iter()
            .filter(|(path, _)| path.starts_with(directory) && !present.contains(*path))
            .map(|(path, stamp)| (path.clone(), stamp.name.clone()))
            .collect();

        for (path, name) in vanished {
            self.stamps.lock().remove(&path);
            if let Some(name) = name {
                self.remove_plugin(&name, &mut report).await;
            }
        }

        Ok(report.finish())
    }

    /// Validates every manifest in `directory` without initializing or
    /// registering anything.
    pub fn validate_directory(&self, directory: &Path) -> PluginResult<LoadReport> {
        let mut report = LoadReport::new();
        for path in manifest::discover(directory)? {
            let checked = PluginManifest::from_path(&path).and_then(|m| {
                let instance = self.catalog.create(&m.factory)?;
                validate_contract(&m.name, instance.as_ref(), m.hooks.as_deref())?;
                Ok(m.name)
            });
            match checked {
                Ok(name) => report.loaded.push(name),
                Err(e) => report.fail(manifest::fallback_name(&path), e),
            }
        }
        Ok(report.finish())
    }

    /// Validates, initializes and registers an instance built outside the
    /// catalog. An `initialize` failure registers it permanently disabled.
    pub async fn install(
        &self,
        name: &str,
        instance: Arc<dyn Plugin>,
        priority: i32,
        config: PluginConfig,
    ) -> PluginResult<()> {
        let hooks = validate_contract(name, instance.as_ref(), None)?;
        let mut descriptor = PluginDescriptor::new(name, instance.version(), hooks);
        descriptor.priority = priority;

        let init = self.initialize(name, instance.as_ref(), config).await;
        if let Err(e) = &init {
            descriptor.enabled = false;
            descriptor.init_error = Some(e.to_string());
        }

        if let Err(e) = self.registry.register(descriptor, instance.clone()).await {
            self.discard(name, instance.as_ref()).await;
            return Err(e);
        }
        init
    }

    /// Shuts down an instance that never made it into the registry.
    async fn discard(&self, name: &str, instance: &dyn Plugin) {
        let timeout = self.registry.lifecycle_timeout();
        match shutdown_instance(name, instance, timeout).await {
            Ok(()) => debug!(plugin = %name, "Unregistered instance shut down"),
            Err(e) => warn!(plugin = %name, error = %e, "Unregistered instance left running"),
        }
    }

    async fn load_path(&self, path: &Path, report: &mut LoadReport) {
        let manifest = match PluginManifest::from_path(path) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(manifest = %path.display(), error = %e, "Skipping invalid manifest");
                self.stamp(path, None);
                report.fail(manifest::fallback_name(path), e);
                return;
            }
        };
        let name = manifest.name.clone();

        if self.registry.contains(&name).await {
            warn!(plugin = %name, manifest = %path.display(), "Duplicate plugin name");
            self.stamp(path, None);
            report.fail(name.clone(), PluginError::DuplicateName(name));
            return;
        }

        let (descriptor, instance) = match self.build(&manifest, path).await {
            Ok(built) => built,
            Err(e) => {
                warn!(plugin = %name, error = %e, "Plugin failed to load");
                self.stamp(path, None);
                report.fail(name, e);
                return;
            }
        };

        let init_error = descriptor.init_error.clone();
        if let Err(e) = self.registry.register(descriptor, instance.clone()).await {
            // Lost a race against a concurrent registration of the same name.
            self.discard(&name, instance.as_ref()).await;
            self.stamp(path, None);
            report.fail(name, e);
            return;
        }

        self.stamp(path, Some(name.clone()));
        match init_error {
            Some(reason) => report.fail(
                name.clone(),
                PluginError::Init {
                    plugin: name,
                    reason,
                },
            ),
            None => report.loaded.push(name),
        }
    }

    /// Builds a descriptor and initialized instance from a manifest.
    ///
    /// `initialize` failures do not fail the build: the descriptor comes back
    /// disabled with `init_error` set.
    async fn build(
        &self,
        manifest: &PluginManifest,
        path: &Path,
    ) -> PluginResult<(PluginDescriptor, Arc<dyn Plugin>)> {
        let instance = self.catalog.create(&manifest.factory)?;
        let hooks = validate_contract(
            &manifest.name,
            instance.as_ref(),
            manifest.hooks.as_deref(),
        )?;
        let overrides = self.overrides.get(&manifest.name);

        let mut config = PluginConfig::default();
        config.merge(manifest.config.clone());
        if let Some(over) = overrides {
            config.merge(over.config.clone());
        }

        let mut descriptor = PluginDescriptor {
            name: manifest.name.clone(),
            version: manifest
                .version
                .clone()
                .unwrap_or_else(|| instance.version().to_string()),
            factory: manifest.factory.clone(),
            hooks,
            priority: overrides
                .and_then(|o| o.priority)
                .unwrap_or_else(|| manifest.priority()),
            enabled: overrides
                .and_then(|o| o.enabled)
                .or(manifest.enabled)
                .unwrap_or(true),
            timeout_ms: overrides.and_then(|o| o.timeout_ms).or(manifest.timeout_ms),
            init_error: None,
            source: Some(path.to_path_buf()),
            sequence: 0,
        };

        if let Err(e) = self
            .initialize(&manifest.name, instance.as_ref(), config)
            .await
        {
            descriptor.enabled = false;
            descriptor.init_error = Some(e.to_string());
        }

        Ok((descriptor, instance))
    }

    async fn initialize(
        &self,
        name: &str,
        instance: &dyn Plugin,
        config: PluginConfig,
    ) -> PluginResult<()> {
        let timeout = self.registry.lifecycle_timeout();
        let result = match tokio::time::timeout(timeout, instance.initialize(config)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(PluginError::Init { reason, .. })) => Err(PluginError::init(name, reason)),
            Ok(Err(other)) => Err(PluginError::init(name, other.to_string())),
            Err(_) => Err(PluginError::init(
                name,
                format!("initialize timed out after {}ms", timeout.as_millis()),
            )),
        };

        if let Err(e) = &result {
            error!(plugin = %name, error = %e, "Plugin initialization failed, disabling");
        }
        result
    }

    async fn remove_plugin(&self, name: &str, report: &mut LoadReport) {
        match self.registry.unregister(name).await {
            Ok(_) => report.removed.push(name.to_string()),
            Err(PluginError::NotFound(_)) => {}
            Err(e) => {
                report.removed.push(name.to_string());
                report.warnings.push(LoadFailure {
                    name: name.to_string(),
                    reason: e,
                });
            }
        }
    }

    async fn report_init_failure(&self, name: &str, report: &mut LoadReport) {
        if let Some(reason) = self
            .registry
            .descriptor(name)
            .await
            .and_then(|d| d.init_error)
        {
            report.fail(
                name.to_string(),
                PluginError::Init {
                    plugin: name.to_string(),
                    reason,
                },
            );
        }
    }

    fn stamp(&self, path: &Path, name: Option<String>) {
        self.stamps.lock().insert(
            path.to_path_buf(),
            ManifestStamp {
                name,
                modified: manifest::modified(path),
            },
        );
    }
}

impl LoadReport {
    fn merge(&mut self, other: LoadReport) {
        self.loaded.extend(other.loaded);
        self.reloaded.extend(other.reloaded);
        self.removed.extend(other.removed);
        self.failed.extend(other.failed);
        self.warnings.extend(other.warnings);
    }
}
