//! Prelude for plugin authors: `use hookhub_plugin::prelude::*;`

pub use async_trait::async_trait;

pub use crate::catalog::{PluginCatalog, PluginFactory};
pub use crate::contract::{Plugin, PluginConfig};
pub use crate::error::{PluginError, PluginResult};
pub use crate::hooks::definitions::{HookContext, HookPoint};
pub use crate::{hook_context, hook_names};
