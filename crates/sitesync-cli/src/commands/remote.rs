use serde::Serialize;
use sitesync_core::RemoteSiteConfig;

use crate::cli::RemoteCommands;
use crate::commands::common::SiteContext;
use crate::error::CliError;

/// What `remote list --json` prints: everything except the API key
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteListItem {
    pub site_code: String,
    pub display_name: String,
    pub url: String,
}

impl From<&RemoteSiteConfig> for RemoteListItem {
    fn from(remote: &RemoteSiteConfig) -> Self {
        Self {
            site_code: remote.site_code.clone(),
            display_name: remote.display_name.clone(),
            url: remote.base_url(),
        }
    }
}

pub fn run_remote(command: RemoteCommands, context: &SiteContext) -> Result<(), CliError> {
    match command {
        RemoteCommands::Add {
            site_code,
            host,
            port,
            api_key,
            name,
        } => {
            let remote = RemoteSiteConfig {
                host,
                port,
                api_key,
                site_code,
                display_name: name.unwrap_or_default(),
            };
            let added = add_remote(context, remote)?;
            println!("Saved remote {} ({})", added.site_code, added.base_url());
            Ok(())
        }
        RemoteCommands::List { json } => {
            let items = list_remotes(context)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else if items.is_empty() {
                println!("No remote sites configured.");
            } else {
                for line in format_remote_lines(&items) {
                    println!("{line}");
                }
            }
            Ok(())
        }
        RemoteCommands::Remove { site_code } => {
            let removed = remove_remote(context, &site_code)?;
            println!("Removed remote {}", removed.site_code);
            Ok(())
        }
    }
}

pub fn add_remote(
    context: &SiteContext,
    remote: RemoteSiteConfig,
) -> Result<RemoteSiteConfig, CliError> {
    let mut registry = context.load_remotes()?;
    let code = remote.site_code.clone();
    if registry.upsert(remote)?.is_some() {
        tracing::info!(remote = %code.trim(), "Replaced existing remote");
    }
    registry.save_to_path(&context.remotes_path())?;
    Ok(registry.get(&code)?.clone())
}

pub fn list_remotes(context: &SiteContext) -> Result<Vec<RemoteListItem>, CliError> {
    let registry = context.load_remotes()?;
    Ok(registry.remotes.values().map(RemoteListItem::from).collect())
}

pub fn remove_remote(context: &SiteContext, site_code: &str) -> Result<RemoteSiteConfig, CliError> {
    let mut registry = context.load_remotes()?;
    let removed = registry.remove(site_code)?;
    registry.save_to_path(&context.remotes_path())?;
    Ok(removed)
}

pub fn format_remote_lines(items: &[RemoteListItem]) -> Vec<String> {
    let code_width = items
        .iter()
        .map(|item| item.site_code.len())
        .max()
        .unwrap_or(0);
    items
        .iter()
        .map(|item| {
            format!(
                "{:<code_width$}  {}  {}",
                item.site_code, item.url, item.display_name
            )
        })
        .collect()
}
