//! Plugin registry: owns loaded plugin instances and their descriptors.
//!
//! A single `RwLock` guards the name → entry map. Structural changes
//! (register, unregister, replace, reload swap) take the write lock;
//! dispatchers take the read lock only long enough to snapshot a chain.
//!
//! Each instance also carries a [`CallGate`]. Dispatchers hold it shared
//! while calling the plugin; unregister, replace and swap take it
//! exclusively and mark it retired before the old instance is shut down,
//! so `shutdown` never overlaps a call and no chain calls a retired
//! instance afterwards.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use hookhub_core::config::{CircuitConfig, DispatchConfig, TieBreak};

use crate::circuit::{CircuitBreaker, CircuitSnapshot, SharedCircuit};
use crate::contract::Plugin;
use crate::error::{PluginError, PluginResult};

/// Registry metadata for a plugin, distinct from its live instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginDescriptor {
    /// Unique registry key.
    pub name: String,
    /// Plugin version string.
    pub version: String,
    /// Catalog factory the instance was built from.
    pub factory: String,
    /// Hooks the dispatcher may invoke on this plugin.
    pub hooks: Vec<String>,
    /// Execution priority (lower runs first).
    pub priority: i32,
    /// Whether the plugin takes part in dispatch.
    pub enabled: bool,
    /// Per-call timeout override in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Set when `initialize` failed; such plugins stay disabled.
    pub init_error: Option<String>,
    /// Manifest the plugin was loaded from, if any.
    pub source: Option<PathBuf>,
    /// Registration order, assigned by the registry.
    pub sequence: u64,
}

impl PluginDescriptor {
    /// Creates a descriptor with default priority (100), enabled.
    pub fn new(name: &str, version: &str, hooks: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            factory: name.to_string(),
            hooks,
            priority: 100,
            enabled: true,
            timeout_ms: None,
            init_error: None,
            source: None,
            sequence: 0,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Whether the plugin is eligible for dispatch of `hook`.
    pub fn is_dispatchable(&self, hook: &str) -> bool {
        self.enabled && self.init_error.is_none() && self.hooks.iter().any(|h| h == hook)
    }
}

/// Descriptor plus circuit view, as returned by [`PluginRegistry::list`].
#[derive(Debug, Clone, Serialize)]
pub struct PluginStatus {
    /// Registry metadata.
    pub descriptor: PluginDescriptor,
    /// Circuit breaker state.
    pub circuit: CircuitSnapshot,
}

/// Shared while an instance is being called; `true` once it is retired.
pub type CallGate = Arc<RwLock<bool>>;

/// A plugin snapshotted for one hook dispatch.
#[derive(Debug, Clone)]
pub struct HookTarget {
    /// Plugin name.
    pub name: String,
    /// Live instance, held only for the duration of the call.
    pub instance: Arc<dyn Plugin>,
    /// Circuit record for this plugin.
    pub circuit: SharedCircuit,
    /// Call gate of this instance.
    pub gate: CallGate,
    /// Per-call timeout override.
    pub timeout: Option<Duration>,
}

/// Outcome of a reload swap.
#[derive(Debug, Default)]
pub struct SwapReport {
    /// Error from shutting down the previous instance, if any.
    pub shutdown_error: Option<PluginError>,
}

#[derive(Debug)]
struct PluginEntry {
    descriptor: PluginDescriptor,
    instance: Arc<dyn Plugin>,
    circuit: SharedCircuit,
    gate: CallGate,
}

impl PluginEntry {
    fn new(
        descriptor: PluginDescriptor,
        instance: Arc<dyn Plugin>,
        circuit: SharedCircuit,
    ) -> Self {
        Self {
            descriptor,
            instance,
            circuit,
            gate: Arc::new(RwLock::new(false)),
        }
    }

    fn target(&self) -> HookTarget {
        HookTarget {
            name: self.descriptor.name.clone(),
            instance: self.instance.clone(),
            circuit: self.circuit.clone(),
            gate: self.gate.clone(),
            timeout: self.descriptor.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Waits for in-flight calls on the instance, then marks it retired.
async fn retire(gate: &CallGate) {
    *gate.write().await = true;
}

/// Registry of all loaded plugins.
#[derive(Debug)]
pub struct PluginRegistry {
    /// Plugin name → entry.
    entries: RwLock<HashMap<String, PluginEntry>>,
    /// Next registration sequence number.
    next_sequence: AtomicU64,
    failure_threshold: u32,
    cooldown: Duration,
    lifecycle_timeout: Duration,
    tie_break: TieBreak,
}

impl PluginRegistry {
    /// Creates a new empty plugin registry.
    pub fn new(circuit: &CircuitConfig, dispatch: &DispatchConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
            failure_threshold: circuit.failure_threshold,
            cooldown: Duration::from_secs(circuit.cooldown_seconds),
            lifecycle_timeout: Duration::from_millis(dispatch.lifecycle_timeout_ms),
            tie_break: dispatch.tie_break,
        }
    }

    fn fresh_circuit(&self) -> SharedCircuit {
        CircuitBreaker::shared(self.failure_threshold, self.cooldown)
    }

    fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, AtomicOrdering::Relaxed)
    }

    fn compare(&self, a: &PluginDescriptor, b: &PluginDescriptor) -> Ordering {
        let by_priority = a.priority.cmp(&b.priority);
        let by_name = match self.tie_break {
            TieBreak::RegistrationOrder => Ordering::Equal,
            TieBreak::Name => a.name.cmp(&b.name),
        };
        by_priority
            .then(by_name)
            .then(a.sequence.cmp(&b.sequence))
    }

    /// Registers a plugin. Fails if the name is taken.
    pub async fn register(
        &self,
        mut descriptor: PluginDescriptor,
        instance: Arc<dyn Plugin>,
    ) -> PluginResult<()> {
        let mut entries = self.entries.write().await;

        if entries.contains_key(&descriptor.name) {
            return Err(PluginError::DuplicateName(descriptor.name));
        }

        descriptor.sequence = self.next_sequence();

        info!(
            plugin = %descriptor.name,
            version = %descriptor.version,
            priority = descriptor.priority,
            hooks = ?descriptor.hooks,
            "Registering plugin"
        );

        entries.insert(
            descriptor.name.clone(),
            PluginEntry::new(descriptor, instance, self.fresh_circuit()),
        );

        Ok(())
    }

    /// Registers a plugin, explicitly replacing any entry with the same name.
    ///
    /// The replacement keeps the previous registration order and starts with
    /// a closed circuit. The previous instance is retired once its in-flight
    /// calls finish, then returned so the caller can shut it down.
    pub async fn replace(
        &self,
        mut descriptor: PluginDescriptor,
        instance: Arc<dyn Plugin>,
    ) -> Option<Arc<dyn Plugin>> {
        let mut entries = self.entries.write().await;

        descriptor.sequence = match entries.get(&descriptor.name) {
            Some(existing) => existing.descriptor.sequence,
            None => self.next_sequence(),
        };

        info!(plugin = %descriptor.name, "Replacing plugin instance");

        let previous = entries.insert(
            descriptor.name.clone(),
            PluginEntry::new(descriptor, instance, self.fresh_circuit()),
        );
        drop(entries);

        match previous {
            Some(old) => {
                retire(&old.gate).await;
                Some(old.instance)
            }
            None => None,
        }
    }

    /// Removes a plugin and calls its `shutdown`.
    ///
    /// The entry is removed even if `shutdown` fails; the failure is returned
    /// as [`PluginError::Unregister`] and not retried.
    pub async fn unregister(&self, name: &str) -> PluginResult<PluginDescriptor> {
        let entry = {
            let mut entries = self.entries.write().await;
            entries
                .remove(name)
                .ok_or_else(|| PluginError::NotFound(name.to_string()))?
        };

        info!(plugin = %name, "Plugin unregistered");

        retire(&entry.gate).await;
        shutdown_instance(name, entry.instance.as_ref(), self.lifecycle_timeout).await?;
        Ok(entry.descriptor)
    }

    /// Rebuilds a plugin under the write lock.
    ///
    /// In-flight calls on the old instance are waited for, the instance is
    /// retired and shut down, then `rebuild` produces the new
    /// descriptor and instance, which take the old registration slot. No
    /// lookup can observe the name missing or doubly registered while this
    /// runs. If `rebuild` fails, the (already shut down) entry is removed and
    /// the error returned.
    pub async fn swap<F, Fut>(&self, name: &str, rebuild: F) -> PluginResult<SwapReport>
    where
        F: FnOnce(PluginDescriptor) -> Fut,
        Fut: Future<Output = PluginResult<(PluginDescriptor, Arc<dyn Plugin>)>>,
    {
        let mut entries = self.entries.write().await;

        let (old_descriptor, old_instance, old_gate) = match entries.get(name) {
            Some(entry) => (
                entry.descriptor.clone(),
                entry.instance.clone(),
                entry.gate.clone(),
            ),
            None => return Err(PluginError::NotFound(name.to_string())),
        };

        retire(&old_gate).await;
        let mut report = SwapReport::default();
        if let Err(e) =
            shutdown_instance(name, old_instance.as_ref(), self.lifecycle_timeout).await
        {
            report.shutdown_error = Some(e);
        }

        let sequence = old_descriptor.sequence;
        match rebuild(old_descriptor).await {
            Ok((mut descriptor, instance)) => {
                if descriptor.name != name {
                    entries.remove(name);
                    return Err(PluginError::ContractViolation {
                        plugin: name.to_string(),
                        missing: format!("a stable name (reloaded as '{}')", descriptor.name),
                    });
                }
                descriptor.sequence = sequence;
                entries.insert(
                    name.to_string(),
                    PluginEntry::new(descriptor, instance, self.fresh_circuit()),
                );
                info!(plugin = %name, "Plugin instance swapped");
                Ok(report)
            }
            Err(e) => {
                entries.remove(name);
                warn!(plugin = %name, error = %e, "Reload failed, plugin removed");
                Err(e)
            }
        }
    }

    /// Returns dispatchable plugins declaring `hook`, in chain order:
    /// ascending priority, ties by the configured policy.
    pub async fn list_by_hook(&self, hook: &str) -> Vec<HookTarget> {
        let entries = self.entries.read().await;

        let mut matching: Vec<&PluginEntry> = entries
            .values()
            .filter(|entry| entry.descriptor.is_dispatchable(hook))
            .collect();
        matching.sort_by(|a, b| self.compare(&a.descriptor, &b.descriptor));

        matching.into_iter().map(PluginEntry::target).collect()
    }

    /// Returns the current instance of `name` if it is dispatchable for `hook`.
    pub async fn target(&self, name: &str, hook: &str) -> Option<HookTarget> {
        let entries = self.entries.read().await;
        entries
            .get(name)
            .filter(|entry| entry.descriptor.is_dispatchable(hook))
            .map(PluginEntry::target)
    }

    /// Gets a plugin instance by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        let entries = self.entries.read().await;
        entries.get(name).map(|entry| entry.instance.clone())
    }

    /// Gets a plugin descriptor by name.
    pub async fn descriptor(&self, name: &str) -> Option<PluginDescriptor> {
        let entries = self.entries.read().await;
        entries.get(name).map(|entry| entry.descriptor.clone())
    }

    /// Lists every plugin with its circuit state, in chain order.
    pub async fn list(&self) -> Vec<PluginStatus> {
        let entries = self.entries.read().await;
        let mut all: Vec<&PluginEntry> = entries.values().collect();
        all.sort_by(|a, b| self.compare(&a.descriptor, &b.descriptor));

        all.into_iter()
            .map(|entry| PluginStatus {
                descriptor: entry.descriptor.clone(),
                circuit: entry.circuit.lock().snapshot(),
            })
            .collect()
    }

    /// Returns registered names in chain order.
    pub async fn names(&self) -> Vec<String> {
        self.list()
            .await
            .into_iter()
            .map(|status| status.descriptor.name)
            .collect()
    }

    /// Returns plugin count.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether no plugins are registered.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Checks whether a plugin is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Enables a plugin. Plugins whose `initialize` failed cannot be enabled.
    pub async fn enable(&self, name: &str) -> PluginResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;

        if let Some(reason) = &entry.descriptor.init_error {
            return Err(PluginError::Init {
                plugin: name.to_string(),
                reason: reason.clone(),
            });
        }

        entry.descriptor.enabled = true;
        info!(plugin = %name, "Plugin enabled");
        Ok(())
    }

    /// Disables a plugin without unregistering it.
    pub async fn disable(&self, name: &str) -> PluginResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        entry.descriptor.enabled = false;
        info!(plugin = %name, "Plugin disabled");
        Ok(())
    }

    /// Overrides a plugin's priority.
    pub async fn set_priority(&self, name: &str, priority: i32) -> PluginResult<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        entry.descriptor.priority = priority;
        Ok(())
    }

    /// Returns the circuit snapshot for a plugin.
    pub async fn circuit(&self, name: &str) -> Option<CircuitSnapshot> {
        let entries = self.entries.read().await;
        entries.get(name).map(|entry| entry.circuit.lock().snapshot())
    }

    /// Timeout applied to `initialize` and `shutdown` calls.
    pub fn lifecycle_timeout(&self) -> Duration {
        self.lifecycle_timeout
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new(&CircuitConfig::default(), &DispatchConfig::default())
    }
}

/// Calls `shutdown` bounded by `timeout`, mapping failures to
/// [`PluginError::Unregister`].
pub(crate) async fn shutdown_instance(
    name: &str,
    instance: &dyn Plugin,
    timeout: Duration,
) -> PluginResult<()> {
    let reason = match tokio::time::timeout(timeout, instance.shutdown()).await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e.to_string(),
        Err(_) => format!("shutdown timed out after {}ms", timeout.as_millis()),
    };

    warn!(plugin = %name, error = %reason, "Plugin shutdown returned error");
    Err(PluginError::Unregister {
        plugin: name.to_string(),
        reason,
    })
}
