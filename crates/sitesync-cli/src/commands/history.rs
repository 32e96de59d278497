use sitesync_core::audit::AuditEntry;

use crate::commands::common::{format_timestamp, SiteContext};
use crate::error::CliError;

pub fn run_history(limit: usize, as_json: bool, context: &SiteContext) -> Result<(), CliError> {
    let entries = recent_entries(limit, context)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No sync activity recorded.");
        return Ok(());
    }

    for line in format_history_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

/// The newest `limit` audit entries, oldest first
pub fn recent_entries(limit: usize, context: &SiteContext) -> Result<Vec<AuditEntry>, CliError> {
    let mut entries = context.audit().entries()?;
    let skip = entries.len().saturating_sub(limit);
    entries.drain(..skip);
    Ok(entries)
}

pub fn format_history_lines(entries: &[AuditEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            format!(
                "{}  {:<22} {}",
                format_timestamp(entry.recorded_at_utc),
                entry.action,
                entry.details
            )
        })
        .collect()
}
