//! sitesync CLI - operator front-end for site-to-site synchronization
//!
//! Pulls summaries, visits and master data from configured remote sites and
//! pushes this site's master data to them.

mod cli;
mod commands;
mod error;
mod remotes;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::{resolve_data_dir, SiteContext};
use crate::commands::history::run_history;
use crate::commands::info::run_info;
use crate::commands::master::{run_pull_master, run_push_master};
use crate::commands::remote::run_remote;
use crate::commands::visits::{run_full_visits, run_visits};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "sitesync=info"
        .parse()
        .map_err(|error| CliError::Config(format!("Invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = SiteContext::new(resolve_data_dir(cli.data_dir)?);
    tracing::debug!(data_dir = %context.data_dir.display(), "Resolved site data directory");

    match cli.command {
        Commands::Remote { command } => run_remote(command, &context)?,
        Commands::Info { site, json } => run_info(&site, json, &context).await?,
        Commands::Visits {
            site,
            from,
            to,
            json,
            full,
            output,
        } => {
            if full {
                run_full_visits(&site, output.as_deref(), &context).await?;
            } else {
                run_visits(&site, from.as_deref(), to.as_deref(), json, &context).await?;
            }
        }
        Commands::PullMaster { site, mode } => run_pull_master(&site, mode, &context).await?,
        Commands::PushMaster { site, photos } => run_push_master(&site, photos, &context).await?,
        Commands::History { limit, json } => run_history(limit, json, &context)?,
    }

    Ok(())
}
