use std::path::Path;

use sitesync_core::db::{VisitsStore, SQLITE_HEADER};
use sitesync_core::util::write_atomic;
use sitesync_core::Visit;

use crate::commands::common::{format_timestamp, parse_time_bound, sync_client, SiteContext};
use crate::error::CliError;

pub async fn run_visits(
    site: &str,
    from: Option<&str>,
    to: Option<&str>,
    as_json: bool,
    context: &SiteContext,
) -> Result<(), CliError> {
    let from = parse_time_bound(from)?;
    let to = parse_time_bound(to)?;
    let remote = context.remote(site)?;

    let visits = sync_client()?.get_visits(&remote, from, to).await;
    context.record(
        "visits.pulled",
        &format!("{}: {} visits", remote.site_code, visits.len()),
    );

    if as_json {
        println!("{}", serde_json::to_string_pretty(&visits)?);
    } else if visits.is_empty() {
        println!("No visits returned by {}.", remote.site_code);
    } else {
        for line in format_visit_lines(&visits) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_full_visits(
    site: &str,
    output: Option<&Path>,
    context: &SiteContext,
) -> Result<(), CliError> {
    let remote = context.remote(site)?;
    let Some(bytes) = sync_client()?.get_full_visits_database(&remote).await else {
        context.record("visits.full_pull_failed", &remote.site_code);
        return Err(CliError::RemoteUnavailable(remote.site_code));
    };

    let destination = output.map_or_else(
        || context.remote_visits_path(&remote.site_code),
        Path::to_path_buf,
    );
    let count = save_visits_store(&remote.site_code, &bytes, &destination)?;

    context.record(
        "visits.full_pulled",
        &format!(
            "{}: {count} visits saved to {}",
            remote.site_code,
            destination.display()
        ),
    );
    println!(
        "Saved {count} visits from {} to {}",
        remote.site_code,
        destination.display()
    );
    Ok(())
}

/// Atomically write a downloaded visits store and report how many visits it holds.
///
/// Payloads without a SQLite header are rejected before anything is written.
pub fn save_visits_store(
    site_code: &str,
    bytes: &[u8],
    destination: &Path,
) -> Result<i64, CliError> {
    if !bytes.starts_with(SQLITE_HEADER) {
        return Err(CliError::InvalidVisitsStore(site_code.to_string()));
    }
    write_atomic(destination, bytes)?;
    Ok(VisitsStore::open_snapshot(destination)?.count()?)
}

pub fn format_visit_lines(visits: &[Visit]) -> Vec<String> {
    visits
        .iter()
        .map(|visit| {
            let office = visit
                .office_id
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            let purpose = visit.purpose.as_deref().unwrap_or("");
            format!(
                "{}  member {:<6} office {:<4} {}",
                format_timestamp(visit.visited_at_utc),
                visit.member_id,
                office,
                purpose
            )
            .trim_end()
            .to_string()
        })
        .collect()
}
