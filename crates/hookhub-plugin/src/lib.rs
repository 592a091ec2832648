//! # hookhub-plugin
//!
//! Plugin execution core for HookHub. Provides:
//!
//! - The [`Plugin`] contract (lifecycle plus named hook methods)
//! - A registry with unique names, enable/disable and priority ordering
//! - A per-plugin circuit breaker
//! - A hook dispatcher threading a [`HookContext`] through the chain,
//!   bounded by per-call timeouts and cancellable
//! - A manifest loader backed by a factory catalog, with atomic reload
//! - A polling watcher for hot reload

pub mod catalog;
pub mod circuit;
pub mod contract;
pub mod error;
pub mod hooks;
pub mod loader;
pub mod macros;
pub mod manager;
pub mod manifest;
pub mod prelude;
pub mod registry;
pub mod watcher;

pub use catalog::{PluginCatalog, PluginFactory};
pub use circuit::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use contract::{Plugin, PluginConfig};
pub use error::{PluginError, PluginResult};
pub use hooks::definitions::{HookContext, HookPoint};
pub use hooks::dispatcher::{DispatchOutcome, HookDispatcher};
pub use loader::{LoadOutcome, LoadReport, PluginLoader};
pub use manager::PluginHost;
pub use registry::{PluginDescriptor, PluginRegistry};
pub use watcher::DirectoryWatcher;
