//! Built-in request plugins for HookHub.
//!
//! Each plugin is compiled into the host and exposed through a factory id
//! that manifests refer to:
//!
//! | Factory id   | Hooks                              |
//! |--------------|------------------------------------|
//! | `request_id` | `before_request`                   |
//! | `latency`    | `before_request`, `after_request`  |
//! | `path_guard` | `before_request`                   |

pub mod latency;
pub mod path_guard;
pub mod request_id;

use std::sync::Arc;

use hookhub_plugin::{Plugin, PluginCatalog};

pub use latency::LatencyPlugin;
pub use path_guard::PathGuardPlugin;
pub use request_id::RequestIdPlugin;

/// Registers every built-in factory with `catalog`.
pub fn register_all(catalog: &mut PluginCatalog) -> &mut PluginCatalog {
    catalog
        .register(request_id::FACTORY_ID, || -> Arc<dyn Plugin> {
            Arc::new(RequestIdPlugin::new())
        })
        .register(latency::FACTORY_ID, || -> Arc<dyn Plugin> {
            Arc::new(LatencyPlugin::new())
        })
        .register(path_guard::FACTORY_ID, || -> Arc<dyn Plugin> {
            Arc::new(PathGuardPlugin::new())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all_exposes_factories() {
        let mut catalog = PluginCatalog::new();
        register_all(&mut catalog);
        assert_eq!(catalog.ids(), vec!["latency", "path_guard", "request_id"]);
        assert_eq!(catalog.create("latency").expect("factory").name(), "latency");
    }
}
