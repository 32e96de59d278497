use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use sitesync_core::audit::AuditSink;
use sitesync_core::db::{MasterStore, VisitsStore};
use sitesync_core::site::SITE_CODE_KEY;
use sitesync_core::sync::AppliedPackage;
use sitesync_core::{MergeCounts, MergeResult, RemoteSiteConfig, SyncInfoResponse, Visit};

use crate::cli::PullMode;
use crate::commands::common::{parse_time_bound, resolve_data_dir, SiteContext};
use crate::commands::history::{format_history_lines, recent_entries};
use crate::commands::info::format_info_lines;
use crate::commands::master::{format_applied_lines, run_pull_master, run_push_master};
use crate::commands::remote::{add_remote, format_remote_lines, list_remotes, remove_remote};
use crate::commands::visits::{format_visit_lines, save_visits_store};
use crate::error::CliError;

fn context() -> (tempfile::TempDir, SiteContext) {
    let dir = tempfile::tempdir().unwrap();
    let context = SiteContext::new(dir.path().to_path_buf());
    (dir, context)
}

fn unreachable_remote(code: &str) -> RemoteSiteConfig {
    RemoteSiteConfig {
        host: "127.0.0.1".to_string(),
        port: 9,
        api_key: "unreachable-pair-key".to_string(),
        site_code: code.to_string(),
        display_name: format!("{} site", code.to_uppercase()),
    }
}

#[test]
fn explicit_data_dir_wins() {
    let resolved = resolve_data_dir(Some(PathBuf::from("/srv/site"))).unwrap();
    assert_eq!(resolved, PathBuf::from("/srv/site"));
}

#[test]
fn time_bounds_are_strict() {
    assert_eq!(parse_time_bound(None).unwrap(), None);
    assert_eq!(parse_time_bound(Some("  ")).unwrap(), None);
    assert_eq!(
        parse_time_bound(Some("2024-02-01")).unwrap(),
        Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
    );
    assert!(matches!(
        parse_time_bound(Some("last tuesday")),
        Err(CliError::InvalidTime(_))
    ));
}

#[test]
fn remote_registry_commands_round_trip() {
    let (_dir, context) = context();
    let added = add_remote(&context, unreachable_remote("north")).unwrap();
    assert_eq!(added.site_code, "NORTH");
    add_remote(&context, unreachable_remote("SOUTH")).unwrap();

    let items = list_remotes(&context).unwrap();
    let codes: Vec<&str> = items.iter().map(|item| item.site_code.as_str()).collect();
    assert_eq!(codes, vec!["NORTH", "SOUTH"]);

    let json = serde_json::to_string(&items).unwrap();
    assert!(!json.contains("unreachable-pair-key"));
    let lines = format_remote_lines(&items);
    assert_eq!(lines[0], "NORTH  http://127.0.0.1:9  NORTH site");

    remove_remote(&context, "north").unwrap();
    assert_eq!(list_remotes(&context).unwrap().len(), 1);
    assert!(matches!(
        context.remote("NORTH"),
        Err(CliError::UnknownRemote(_))
    ));
}

#[test]
fn info_lines_show_never_without_visits() {
    let info = SyncInfoResponse {
        site_code: "NORTH".to_string(),
        site_display_name: "North Site".to_string(),
        member_count: 12,
        visits_count: 0,
        last_visit_timestamp_utc: None,
    };
    let lines = format_info_lines(&info);
    assert_eq!(lines[0], "Site:       North Site (NORTH)");
    assert_eq!(lines[3], "Last visit: never");
}

#[test]
fn visit_lines_are_compact() {
    let mut visit = Visit::new(42, Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap());
    visit.office_id = Some(3);
    let lines = format_visit_lines(&[visit]);
    assert_eq!(lines, vec!["2024-03-05 14:00:00 UTC  member 42     office 3"]);
}

#[test]
fn full_visits_store_is_validated_and_counted() {
    let (_dir, context) = context();
    let destination = context.remote_visits_path("SOUTH");
    assert!(destination.ends_with("remote-visits/SOUTH.db"));

    let err = save_visits_store("SOUTH", b"<html>oops</html>", &destination).unwrap_err();
    assert!(matches!(err, CliError::InvalidVisitsStore(_)));
    assert!(!destination.exists());

    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("visits.db");
    {
        let store = VisitsStore::open(&source).unwrap();
        for day in 1..=3 {
            let at = Utc.with_ymd_and_hms(2024, 4, day, 9, 0, 0).unwrap();
            store.append(&mut Visit::new(1, at)).unwrap();
        }
    }
    let bytes = std::fs::read(&source).unwrap();
    assert_eq!(save_visits_store("SOUTH", &bytes, &destination).unwrap(), 3);
}

#[test]
fn merge_report_lists_skipped_rows() {
    let applied = AppliedPackage {
        merge: Some(MergeResult {
            offices: MergeCounts {
                added: 1,
                updated: 0,
                skipped: 1,
                skipped_items: vec!["HQ".to_string()],
            },
            member_types: MergeCounts::default(),
            members: MergeCounts::default(),
            settings_applied: 2,
        }),
        photos: None,
    };
    let lines = format_applied_lines("SOUTH", &applied);
    assert_eq!(lines[0], "Merged master data from SOUTH");
    assert_eq!(lines[1], "  offices: added 1, updated 0, skipped 1");
    assert_eq!(lines[2], "    skipped HQ (local copy is as new or newer)");
    assert_eq!(lines.last().unwrap(), "  settings applied: 2");
}

#[test]
fn history_keeps_newest_entries() {
    let (_dir, context) = context();
    for index in 0..5 {
        context.audit().record("master.pushed", &format!("push {index}"));
    }
    let entries = recent_entries(2, &context).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].details, "push 3");
    assert_eq!(entries[1].details, "push 4");
    assert!(format_history_lines(&entries)[1].contains("master.pushed"));
}

#[tokio::test]
async fn pull_from_unreachable_remote_is_reported_and_audited() {
    let (_dir, context) = context();
    add_remote(&context, unreachable_remote("SOUTH")).unwrap();

    let err = run_pull_master("south", PullMode::Merge, &context)
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::RemoteUnavailable(code) if code == "SOUTH"));
    assert!(!context.paths.master.exists());

    let entries = context.audit().entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "master.pull_failed");
}

#[tokio::test]
async fn push_requires_local_master_store() {
    let (_dir, context) = context();
    add_remote(&context, unreachable_remote("SOUTH")).unwrap();

    let err = run_push_master("SOUTH", false, &context).await.unwrap_err();
    assert!(matches!(
        err,
        CliError::Core(sitesync_core::Error::NotFound(_))
    ));

    MasterStore::open(&context.paths.master)
        .unwrap()
        .set_setting(SITE_CODE_KEY, "NORTH")
        .unwrap();
    assert_eq!(context.local_site_code(), "NORTH");
    let err = run_push_master("SOUTH", false, &context).await.unwrap_err();
    assert!(matches!(err, CliError::PushRejected(_)));
}
