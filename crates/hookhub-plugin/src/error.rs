//! Plugin error taxonomy.
//!
//! Per-plugin errors are captured in load reports and dispatch outcomes;
//! only [`PluginError::NotInitialized`] and fatal directory errors ever
//! reach the caller of a whole-chain operation.

use hookhub_core::error::{AppError, ErrorKind};
use serde::Serialize;
use thiserror::Error;

/// Result alias for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors raised by the plugin core.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginError {
    /// The plugin does not implement a method its manifest requires.
    #[error("plugin '{plugin}' violates the plugin contract: missing {missing}")]
    ContractViolation {
        /// Plugin name.
        plugin: String,
        /// The missing hook or method.
        missing: String,
    },

    /// `initialize` failed; the plugin is permanently disabled.
    #[error("plugin '{plugin}' failed to initialize: {reason}")]
    Init {
        /// Plugin name.
        plugin: String,
        /// Failure description.
        reason: String,
    },

    /// A hook call returned an error.
    #[error("plugin '{plugin}' failed on hook '{hook}': {reason}")]
    HookInvocation {
        /// Plugin name.
        plugin: String,
        /// Hook name.
        hook: String,
        /// Failure description.
        reason: String,
    },

    /// A hook call exceeded its deadline.
    #[error("plugin '{plugin}' timed out on hook '{hook}' after {timeout_ms}ms")]
    Timeout {
        /// Plugin name.
        plugin: String,
        /// Hook name.
        hook: String,
        /// Deadline that elapsed.
        timeout_ms: u64,
    },

    /// A plugin returned a context whose documented keys have the wrong type.
    #[error("plugin '{plugin}' broke the '{hook}' context contract: {reason}")]
    ContextContract {
        /// Plugin name.
        plugin: String,
        /// Hook name.
        hook: String,
        /// Which key was wrong.
        reason: String,
    },

    /// A plugin with this name is already registered.
    #[error("plugin '{0}' is already registered")]
    DuplicateName(String),

    /// `shutdown` failed during unregister or reload; the entry was removed.
    #[error("plugin '{plugin}' failed to shut down cleanly: {reason}")]
    Unregister {
        /// Plugin name.
        plugin: String,
        /// Failure description.
        reason: String,
    },

    /// No plugin with this name is registered.
    #[error("plugin '{0}' not found")]
    NotFound(String),

    /// The manifest names a factory the catalog does not know.
    #[error("unknown plugin factory '{0}'")]
    UnknownFactory(String),

    /// The manifest could not be read or parsed.
    #[error("invalid plugin manifest '{path}': {reason}")]
    Manifest {
        /// Manifest path.
        path: String,
        /// Failure description.
        reason: String,
    },

    /// A hook was dispatched before anything was loaded into the host.
    #[error("plugin host is not initialized: load plugins before dispatching hooks")]
    NotInitialized,

    /// Filesystem error while scanning a plugin directory.
    #[error("I/O error on '{path}': {reason}")]
    Io {
        /// Path being accessed.
        path: String,
        /// Failure description.
        reason: String,
    },
}

impl PluginError {
    /// Convenience constructor for hook implementations.
    pub fn hook(plugin: &str, hook: &str, reason: impl Into<String>) -> Self {
        Self::HookInvocation {
            plugin: plugin.to_string(),
            hook: hook.to_string(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for `initialize` implementations.
    pub fn init(plugin: &str, reason: impl Into<String>) -> Self {
        Self::Init {
            plugin: plugin.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        let kind = match &err {
            PluginError::NotFound(_) => ErrorKind::NotFound,
            PluginError::DuplicateName(_) => ErrorKind::Conflict,
            PluginError::Timeout { .. } => ErrorKind::Timeout,
            PluginError::Manifest { .. } => ErrorKind::Configuration,
            PluginError::Io { .. } => ErrorKind::Io,
            PluginError::NotInitialized => ErrorKind::ServiceUnavailable,
            _ => ErrorKind::Plugin,
        };
        let message = err.to_string();
        AppError::with_source(kind, message, err)
    }
}
