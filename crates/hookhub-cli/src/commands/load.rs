//! `load` command and the shared load-report printer.

use serde::Serialize;
use tabled::Tabled;

use hookhub_core::error::AppResult;
use hookhub_plugin::{LoadOutcome, LoadReport};

use super::Session;
use crate::output::{self, OutputFormat};

#[derive(Debug, Serialize, Tabled)]
struct ReportRow {
    #[tabled(rename = "Plugin")]
    plugin: String,
    #[tabled(rename = "Status")]
    status: &'static str,
    #[tabled(rename = "Detail")]
    detail: String,
}

fn rows(report: &LoadReport) -> Vec<ReportRow> {
    let ok = |names: &[String], status: &'static str| {
        names
            .iter()
            .map(|name| ReportRow {
                plugin: name.clone(),
                status,
                detail: String::new(),
            })
            .collect::<Vec<_>>()
    };

    let mut rows = ok(&report.loaded, "loaded");
    rows.extend(ok(&report.reloaded, "reloaded"));
    rows.extend(ok(&report.removed, "removed"));
    for (failures, status) in [(&report.failed, "failed"), (&report.warnings, "warning")] {
        rows.extend(failures.iter().map(|f| ReportRow {
            plugin: f.name.clone(),
            status,
            detail: f.reason.to_string(),
        }));
    }
    rows
}

/// Prints a load report in the selected format.
pub fn print_report(report: &LoadReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => output::print_json(report),
        OutputFormat::Table => {
            output::print_table(&rows(report), "No plugin manifests found.");
            let summary = format!(
                "{} loaded, {} reloaded, {} removed, {} failed",
                report.loaded.len(),
                report.reloaded.len(),
                report.removed.len(),
                report.failed.len()
            );
            match report.outcome() {
                LoadOutcome::Succeeded | LoadOutcome::Empty => output::print_success(&summary),
                LoadOutcome::Partial | LoadOutcome::Failed => output::print_warning(&summary),
            }
        }
    }
}

/// Execute the load command
pub async fn execute(session: &Session) -> AppResult<()> {
    let (host, report) = session.loaded_host().await?;
    print_report(&report, session.format);
    host.unload_all().await;
    Ok(())
}
