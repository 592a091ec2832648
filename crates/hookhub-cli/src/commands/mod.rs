//! CLI command definitions and dispatch.

pub mod dispatch;
pub mod list;
pub mod load;
pub mod reload;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hookhub_core::config::AppConfig;
use hookhub_core::error::{AppError, AppResult};
use hookhub_plugin::{LoadOutcome, LoadReport, PluginCatalog, PluginHost};

use crate::output::OutputFormat;

/// HookHub: hook-driven plugin host
#[derive(Debug, Parser)]
#[command(name = "hookhub", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Plugin manifest directory (overrides `plugins.directory`)
    #[arg(short, long, global = true)]
    pub plugins: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate the configuration and every plugin manifest
    Validate,
    /// Load every plugin and print the load report
    Load,
    /// List loaded plugins in chain order
    List,
    /// Run a hook through the plugin chain
    Dispatch(dispatch::DispatchArgs),
    /// Load plugins, then reload one of them
    Reload(reload::ReloadArgs),
}

/// Everything a command needs: parsed config and the resolved plugin dir.
#[derive(Debug)]
pub struct Session {
    pub config: AppConfig,
    pub directory: PathBuf,
    pub format: OutputFormat,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> AppResult<()> {
        let session = self.session()?;
        match &self.command {
            Commands::Validate => validate::execute(&session, &self.config),
            Commands::Load => load::execute(&session).await,
            Commands::List => list::execute(&session).await,
            Commands::Dispatch(args) => dispatch::execute(args, &session).await,
            Commands::Reload(args) => reload::execute(args, &session).await,
        }
    }

    fn session(&self) -> AppResult<Session> {
        let config = AppConfig::load(&self.config)?;
        let directory = self
            .plugins
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.plugins.directory));
        Ok(Session {
            config,
            directory,
            format: self.format,
        })
    }
}

impl Session {
    /// Builds a host with every built-in plugin factory.
    pub fn host(&self) -> PluginHost {
        let mut catalog = PluginCatalog::new();
        plugin_request_tools::register_all(&mut catalog);
        PluginHost::new(&self.config, catalog)
    }

    /// Builds a host and loads the plugin directory into it.
    pub async fn loaded_host(&self) -> AppResult<(PluginHost, LoadReport)> {
        let host = self.host();
        let report = host.load_plugins(&self.directory).await?;
        if report.outcome() == LoadOutcome::Failed {
            load::print_report(&report, self.format);
            return Err(AppError::plugin(format!(
                "no plugin in '{}' could be loaded",
                self.directory.display()
            )));
        }
        Ok((host, report))
    }
}
