use sitesync_core::sync::{apply_master_merge, apply_master_overwrite, build_master_package, AppliedPackage};
use sitesync_core::{MergeCounts, MergeResult};

use crate::cli::PullMode;
use crate::commands::common::{sync_client, SiteContext};
use crate::error::CliError;

pub async fn run_pull_master(
    site: &str,
    mode: PullMode,
    context: &SiteContext,
) -> Result<(), CliError> {
    let remote = context.remote(site)?;
    let Some(package) = sync_client()?.get_master_package(&remote).await else {
        context.record("master.pull_failed", &remote.site_code);
        return Err(CliError::RemoteUnavailable(remote.site_code));
    };
    if !package.site_code.eq_ignore_ascii_case(&remote.site_code) {
        tracing::warn!(
            expected = %remote.site_code,
            reported = %package.site_code,
            "Remote reported a different site code"
        );
    }

    let paths = context.paths.clone();
    let applied = tokio::task::spawn_blocking(move || match mode {
        PullMode::Merge => apply_master_merge(&paths, &package),
        PullMode::Overwrite => apply_master_overwrite(&paths, &package),
    })
    .await
    .map_err(|error| CliError::Config(format!("Pull task failed: {error}")))?;

    let applied = match applied {
        Ok(applied) => applied,
        Err(error) => {
            context.record(
                "master.pull_failed",
                &format!("{} ({}): {error}", remote.site_code, mode.label()),
            );
            return Err(error.into());
        }
    };

    let action = match mode {
        PullMode::Merge => "master.merged",
        PullMode::Overwrite => "master.overwritten",
    };
    context.record(
        action,
        &format!("from {}: {}", remote.site_code, applied.summary()),
    );
    for line in format_applied_lines(&remote.site_code, &applied) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_push_master(
    site: &str,
    include_photos: bool,
    context: &SiteContext,
) -> Result<(), CliError> {
    let remote = context.remote(site)?;
    let site_code = context.local_site_code();
    let paths = context.paths.clone();
    let package = tokio::task::spawn_blocking(move || {
        build_master_package(&paths, &site_code, include_photos)
    })
    .await
    .map_err(|error| CliError::Config(format!("Packaging task failed: {error}")))??;

    let master_bytes = package.master_database.len();
    if !sync_client()?.upload_master_package(&remote, &package).await {
        context.record("master.push_failed", &remote.site_code);
        return Err(CliError::PushRejected(remote.site_code));
    }

    let photos = if include_photos {
        "with photos"
    } else {
        "without photos"
    };
    context.record(
        "master.pushed",
        &format!("to {}: {master_bytes} bytes {photos}", remote.site_code),
    );
    println!(
        "Pushed master data ({master_bytes} bytes, {photos}) to {}",
        remote.site_code
    );
    Ok(())
}

pub fn format_applied_lines(site_code: &str, applied: &AppliedPackage) -> Vec<String> {
    let mut lines = Vec::new();
    match &applied.merge {
        Some(merge) => {
            lines.push(format!("Merged master data from {site_code}"));
            lines.extend(format_merge_lines(merge));
        }
        None => lines.push(format!("Replaced local master data with {site_code}'s copy")),
    }
    if let Some(photos) = &applied.photos {
        lines.push(format!(
            "  photos: {} written, {} removed",
            photos.written, photos.removed
        ));
    }
    lines
}

pub fn format_merge_lines(merge: &MergeResult) -> Vec<String> {
    let mut lines = Vec::new();
    for (label, counts) in [
        ("offices", &merge.offices),
        ("member types", &merge.member_types),
        ("members", &merge.members),
    ] {
        lines.push(format!("  {label}: {counts}"));
        lines.extend(format_skipped(counts));
    }
    lines.push(format!("  settings applied: {}", merge.settings_applied));
    lines
}

fn format_skipped(counts: &MergeCounts) -> impl Iterator<Item = String> + '_ {
    counts
        .skipped_items
        .iter()
        .map(|item| format!("    skipped {item} (local copy is as new or newer)"))
}
