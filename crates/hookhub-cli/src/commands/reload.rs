//! `reload` command: loads the directory, then swaps one plugin in place.

use clap::Args;

use hookhub_core::error::AppResult;

use super::{Session, load};

/// Arguments for the reload command
#[derive(Debug, Args)]
pub struct ReloadArgs {
    /// Plugin to reload
    pub name: String,
}

/// Execute the reload command
pub async fn execute(args: &ReloadArgs, session: &Session) -> AppResult<()> {
    let (host, _) = session.loaded_host().await?;
    let result = host.reload_plugin(&args.name).await;
    host.unload_all().await;

    let report = result?;
    load::print_report(&report, session.format);
    Ok(())
}
