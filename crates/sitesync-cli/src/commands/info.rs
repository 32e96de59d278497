use sitesync_core::SyncInfoResponse;

use crate::commands::common::{format_timestamp, sync_client, SiteContext};
use crate::error::CliError;

pub async fn run_info(site: &str, as_json: bool, context: &SiteContext) -> Result<(), CliError> {
    let remote = context.remote(site)?;
    let info = sync_client()?
        .get_info(&remote)
        .await
        .ok_or_else(|| CliError::RemoteUnavailable(remote.site_code.clone()))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        for line in format_info_lines(&info) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_info_lines(info: &SyncInfoResponse) -> Vec<String> {
    let last_visit = info
        .last_visit_timestamp_utc
        .map_or_else(|| "never".to_string(), format_timestamp);
    vec![
        format!("Site:       {} ({})", info.site_display_name, info.site_code),
        format!("Members:    {}", info.member_count),
        format!("Visits:     {}", info.visits_count),
        format!("Last visit: {last_visit}"),
    ]
}
