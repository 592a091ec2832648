//! `list` command.

use serde::Serialize;
use tabled::Tabled;

use hookhub_core::error::AppResult;
use hookhub_plugin::registry::PluginStatus;

use super::Session;
use crate::output;

#[derive(Debug, Serialize, Tabled)]
pub struct PluginRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Version")]
    pub version: String,
    #[tabled(rename = "Factory")]
    pub factory: String,
    #[tabled(rename = "Priority")]
    pub priority: i32,
    #[tabled(rename = "Enabled")]
    pub enabled: bool,
    #[tabled(rename = "Hooks")]
    pub hooks: String,
    #[tabled(rename = "Circuit")]
    pub circuit: String,
    #[tabled(rename = "Failures")]
    pub failures: u32,
}

impl From<&PluginStatus> for PluginRow {
    fn from(status: &PluginStatus) -> Self {
        let d = &status.descriptor;
        Self {
            name: d.name.clone(),
            version: d.version.clone(),
            factory: d.factory.clone(),
            priority: d.priority,
            enabled: d.enabled,
            hooks: d.hooks.join(", "),
            circuit: status.circuit.state.to_string(),
            failures: status.circuit.consecutive_failures,
        }
    }
}

/// Execute the list command
pub async fn execute(session: &Session) -> AppResult<()> {
    let (host, _) = session.loaded_host().await?;
    let rows: Vec<PluginRow> = host.list_plugins().await.iter().map(PluginRow::from).collect();
    output::print_list(&rows, session.format);
    host.unload_all().await;
    Ok(())
}
