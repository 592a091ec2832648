//! `validate` command: checks config and manifests without initializing
//! any plugin.

use hookhub_core::error::{AppError, AppResult};

use super::{Session, load};
use crate::output::{self, OutputFormat};

/// Execute the validate command
pub fn execute(session: &Session, config_path: &str) -> AppResult<()> {
    let config = &session.config;
    if session.format == OutputFormat::Table {
        output::print_success(&format!("Configuration '{config_path}' is valid"));
        output::print_kv("Plugin directory", &session.directory.display().to_string());
        output::print_kv("Hot reload", &config.plugins.hot_reload.to_string());
        output::print_kv("Hook timeout", &format!("{}ms", config.dispatch.timeout_ms));
        output::print_kv(
            "Circuit",
            &format!(
                "{} failures, {}s cooldown",
                config.circuit.failure_threshold, config.circuit.cooldown_seconds
            ),
        );
    }

    let report = session.host().validate_directory(&session.directory)?;
    load::print_report(&report, session.format);

    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "{} invalid plugin manifest(s)",
            report.failed.len()
        )))
    }
}
