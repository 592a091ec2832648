//! `dispatch` command: runs a hook through the loaded chain.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use hookhub_core::error::{AppError, AppResult};
use hookhub_plugin::hooks::dispatcher::DispatchOutcome;
use hookhub_plugin::HookContext;

use super::Session;
use crate::output::{self, OutputFormat};

/// Arguments for the dispatch command
#[derive(Debug, Args)]
pub struct DispatchArgs {
    /// Hook name, e.g. `before_request`
    #[arg(long)]
    pub hook: String,

    /// Initial context as a JSON object
    #[arg(long, default_value = "{}")]
    pub context: String,

    /// Dispatch the hook this many times, feeding each result into the next
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,

    /// Plugins to disable before dispatching
    #[arg(long, value_delimiter = ',')]
    pub disable: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct StepRow {
    #[tabled(rename = "Run")]
    run: u32,
    #[tabled(rename = "Plugin")]
    plugin: String,
    #[tabled(rename = "Result")]
    result: String,
}

fn steps(run: u32, outcome: &DispatchOutcome) -> Vec<StepRow> {
    let mut rows: Vec<StepRow> = outcome
        .invoked
        .iter()
        .map(|plugin| {
            let result = outcome
                .failures
                .iter()
                .find(|f| &f.plugin == plugin)
                .map(|f| format!("failed: {}", f.error))
                .unwrap_or_else(|| "ok".to_string());
            StepRow {
                run,
                plugin: plugin.clone(),
                result,
            }
        })
        .collect();
    rows.extend(outcome.skipped.iter().map(|s| StepRow {
        run,
        plugin: s.plugin.clone(),
        result: format!("skipped ({:?})", s.reason),
    }));
    rows
}

/// Execute the dispatch command
pub async fn execute(args: &DispatchArgs, session: &Session) -> AppResult<()> {
    let value: serde_json::Value = serde_json::from_str(&args.context)?;
    let mut context = HookContext::from_value(value)
        .ok_or_else(|| AppError::validation("--context must be a JSON object"))?;

    let (host, _) = session.loaded_host().await?;
    for name in &args.disable {
        host.disable(name).await?;
    }

    let mut outcomes = Vec::new();
    for _ in 0..args.repeat.max(1) {
        let outcome = host.execute_hook(&args.hook, context.clone()).await?;
        context = outcome.context.clone();
        outcomes.push(outcome);
    }
    host.unload_all().await;

    match session.format {
        OutputFormat::Json => output::print_json(&outcomes),
        OutputFormat::Table => {
            let rows: Vec<StepRow> = outcomes
                .iter()
                .zip(1..)
                .flat_map(|(outcome, run)| steps(run, outcome))
                .collect();
            output::print_table(&rows, "No plugin subscribes to this hook.");
            println!("Final context:");
            output::print_json(&context);
        }
    }
    Ok(())
}
