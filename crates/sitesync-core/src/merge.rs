//! Master merge engine.
//!
//! Reconciles a downloaded master snapshot into the local master store, one
//! entity type at a time, using last-writer-wins on `updated_at_utc`:
//!
//! - remote row with no local counterpart: inserted verbatim (*added*)
//! - remote row strictly newer than the local one: mutable fields copied
//!   onto the local row (*updated*)
//! - otherwise the local row is left alone (*skipped*)
//!
//! Local rows absent from the snapshot are never deleted. Settings carry no
//! timestamp and are overwritten unconditionally by the remote values. All
//! writes of one pass share a single transaction; any failure rolls the whole
//! pass back.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{list_settings, upsert_setting, MasterRow, MasterStore};
use crate::error::Result;
use crate::models::{Member, MemberType, Office};

/// Outcome of merging one entity type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeCounts {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Human-readable identifiers of the skipped rows
    pub skipped_items: Vec<String>,
}

impl MergeCounts {
    /// Number of rows written to the local store
    pub const fn changed(&self) -> usize {
        self.added + self.updated
    }
}

impl fmt::Display for MergeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added {}, updated {}, skipped {}",
            self.added, self.updated, self.skipped
        )
    }
}

/// Aggregate outcome of one master-pull merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub offices: MergeCounts,
    pub member_types: MergeCounts,
    pub members: MergeCounts,
    /// Settings written from the remote snapshot
    pub settings_applied: usize,
}

impl MergeResult {
    /// One-line summary suitable for an audit entry
    pub fn summary(&self) -> String {
        format!(
            "offices: {}; member types: {}; members: {}; settings applied: {}",
            self.offices, self.member_types, self.members, self.settings_applied
        )
    }
}

/// Merge a raw master store file downloaded from another site.
///
/// The bytes are spilled to a private temporary file so they can be opened as
/// a read-only database; the file is removed when the merge returns.
pub fn merge_master_snapshot(local: &mut MasterStore, remote_database: &[u8]) -> Result<MergeResult> {
    let mut snapshot_file = tempfile::NamedTempFile::new()?;
    snapshot_file.write_all(remote_database)?;
    snapshot_file.flush()?;

    let remote = MasterStore::open_snapshot(snapshot_file.path())?;
    merge_master_stores(local, &remote)
}

/// Merge every entity type and the settings of `remote` into `local`
pub fn merge_master_stores(local: &mut MasterStore, remote: &MasterStore) -> Result<MergeResult> {
    let tx = local.connection_mut().transaction()?;

    let offices = merge_rows::<Office>(&tx, remote.connection())?;
    let member_types = merge_rows::<MemberType>(&tx, remote.connection())?;
    let members = merge_rows::<Member>(&tx, remote.connection())?;
    let settings_applied = merge_settings(&tx, remote.connection())?;

    tx.commit()?;

    let result = MergeResult {
        offices,
        member_types,
        members,
        settings_applied,
    };
    tracing::info!(summary = %result.summary(), "Merged master snapshot");
    Ok(result)
}

fn merge_rows<T: MasterRow>(local: &Connection, remote: &Connection) -> Result<MergeCounts> {
    let local_rows: HashMap<i64, T> = T::load_all(local)?
        .into_iter()
        .map(|row| (row.id(), row))
        .collect();

    let mut counts = MergeCounts::default();
    for remote_row in T::load_all(remote)? {
        match local_rows.get(&remote_row.id()) {
            None => {
                remote_row.insert(local)?;
                counts.added += 1;
            }
            Some(local_row) if remote_row.updated_at() > local_row.updated_at() => {
                remote_row.overwrite(local)?;
                counts.updated += 1;
            }
            Some(_) => {
                counts.skipped += 1;
                counts.skipped_items.push(remote_row.label());
            }
        }
    }

    tracing::debug!(table = T::TABLE, %counts, "Merged table");
    Ok(counts)
}

fn merge_settings(local: &Connection, remote: &Connection) -> Result<usize> {
    let remote_settings = list_settings(remote)?;
    for (key, value) in &remote_settings {
        upsert_setting(local, key, value)?;
    }
    Ok(remote_settings.len())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    fn day(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn office(id: i64, code: &str, updated: DateTime<Utc>) -> Office {
        let mut office = Office::new(id, code, format!("{code} office"));
        office.updated_at_utc = updated;
        office
    }

    fn member(id: i64, number: &str, last_name: &str, updated: DateTime<Utc>) -> Member {
        let mut member = Member::new(id, number, "First", last_name);
        member.created_at_utc = day(1);
        member.updated_at_utc = updated;
        member
    }

    /// Insert rows exactly as given, bypassing the save-time re-stamping
    fn seed<T: MasterRow>(store: &MasterStore, rows: &[T]) {
        for row in rows {
            row.insert(store.connection()).unwrap();
        }
    }

    #[test]
    fn newer_remote_row_overwrites_local() {
        let mut local = MasterStore::open_in_memory().unwrap();
        let remote = MasterStore::open_in_memory().unwrap();
        seed(&local, &[office(5, "OLD", day(5))]);
        seed(&remote, &[office(5, "HQ", day(10))]);

        let result = merge_master_stores(&mut local, &remote).unwrap();

        assert_eq!(result.offices.updated, 1);
        let merged: Office = local.get(5).unwrap().unwrap();
        assert_eq!(merged.code, "HQ");
        assert_eq!(merged.updated_at_utc, day(10));
    }

    #[test]
    fn older_or_equal_remote_row_is_skipped() {
        let mut local = MasterStore::open_in_memory().unwrap();
        let remote = MasterStore::open_in_memory().unwrap();
        seed(
            &local,
            &[office(1, "LOCAL-NEW", day(10)), office(2, "LOCAL-SAME", day(7))],
        );
        seed(
            &remote,
            &[office(1, "REMOTE-OLD", day(5)), office(2, "REMOTE-SAME", day(7))],
        );

        let result = merge_master_stores(&mut local, &remote).unwrap();

        assert_eq!(
            result.offices,
            MergeCounts {
                added: 0,
                updated: 0,
                skipped: 2,
                skipped_items: vec!["REMOTE-OLD".to_string(), "REMOTE-SAME".to_string()],
            }
        );
        let kept: Office = local.get(1).unwrap().unwrap();
        assert_eq!(kept.code, "LOCAL-NEW");
        let kept: Office = local.get(2).unwrap().unwrap();
        assert_eq!(kept.code, "LOCAL-SAME");
    }

    #[test]
    fn missing_rows_are_added_verbatim() {
        let mut local = MasterStore::open_in_memory().unwrap();
        let remote = MasterStore::open_in_memory().unwrap();
        let mut remote_type = MemberType::new(3, "VOL", "Volunteer");
        remote_type.badge_color = Some("#00ff00".to_string());
        remote_type.updated_at_utc = day(2);
        seed(&remote, &[remote_type.clone()]);

        let result = merge_master_stores(&mut local, &remote).unwrap();

        assert_eq!(result.member_types.added, 1);
        let added: MemberType = local.get(3).unwrap().unwrap();
        assert_eq!(added, remote_type);
    }

    #[test]
    fn member_update_preserves_member_number() {
        let mut local = MasterStore::open_in_memory().unwrap();
        let remote = MasterStore::open_in_memory().unwrap();
        seed(&local, &[member(1, "M-001", "Smith", day(3))]);
        let mut newer = member(1, "M-999", "Smythe", day(4));
        newer.email = Some("smythe@example.com".to_string());
        seed(&remote, &[newer]);

        let result = merge_master_stores(&mut local, &remote).unwrap();

        assert_eq!(result.members.updated, 1);
        let merged: Member = local.get(1).unwrap().unwrap();
        assert_eq!(merged.member_number, "M-001");
        assert_eq!(merged.last_name, "Smythe");
        assert_eq!(merged.email.as_deref(), Some("smythe@example.com"));
    }

    #[test]
    fn skipped_members_are_reported_by_number_and_name() {
        let mut local = MasterStore::open_in_memory().unwrap();
        let remote = MasterStore::open_in_memory().unwrap();
        seed(&local, &[member(1, "M-001", "Smith", day(9))]);
        seed(&remote, &[member(1, "M-001", "Smith", day(3))]);

        let result = merge_master_stores(&mut local, &remote).unwrap();
        assert_eq!(result.members.skipped_items, vec!["M-001 Smith".to_string()]);
    }

    #[test]
    fn merge_never_deletes_local_only_rows() {
        let mut local = MasterStore::open_in_memory().unwrap();
        let remote = MasterStore::open_in_memory().unwrap();
        seed(&local, &[office(1, "LOCAL", day(1)), office(2, "SHARED", day(1))]);
        seed(&remote, &[office(2, "SHARED", day(2))]);

        merge_master_stores(&mut local, &remote).unwrap();

        let offices: Vec<Office> = local.list().unwrap();
        assert_eq!(offices.len(), 2);
        assert_eq!(offices[0].code, "LOCAL");
    }

    #[test]
    fn second_merge_of_same_snapshot_changes_nothing() {
        let mut local = MasterStore::open_in_memory().unwrap();
        let remote = MasterStore::open_in_memory().unwrap();
        seed(&local, &[office(1, "A", day(1))]);
        seed(&remote, &[office(1, "A2", day(2)), office(2, "B", day(2))]);
        seed(&remote, &[member(1, "M-1", "One", day(2))]);

        let first = merge_master_stores(&mut local, &remote).unwrap();
        assert_eq!(first.offices.changed(), 2);

        let second = merge_master_stores(&mut local, &remote).unwrap();
        assert_eq!(second.offices.changed(), 0);
        assert_eq!(second.members.changed(), 0);
        assert_eq!(second.offices.skipped, 2);
        assert_eq!(second.members.skipped, 1);
    }

    #[test]
    fn settings_are_overwritten_unconditionally() {
        let mut local = MasterStore::open_in_memory().unwrap();
        let remote = MasterStore::open_in_memory().unwrap();
        local.set_setting("BadgeFooter", "local footer").unwrap();
        local.set_setting("LocalOnly", "kept").unwrap();
        remote.set_setting("BadgeFooter", "remote footer").unwrap();
        remote.set_setting("Theme", "dark").unwrap();

        let result = merge_master_stores(&mut local, &remote).unwrap();

        assert_eq!(result.settings_applied, 2);
        assert_eq!(
            local.setting("BadgeFooter").unwrap().as_deref(),
            Some("remote footer")
        );
        assert_eq!(local.setting("Theme").unwrap().as_deref(), Some("dark"));
        assert_eq!(local.setting("LocalOnly").unwrap().as_deref(), Some("kept"));
    }

    #[test]
    fn snapshot_bytes_are_merged_from_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let remote_path = dir.path().join("remote.db");
        {
            let remote = MasterStore::open(&remote_path).unwrap();
            seed(&remote, &[office(5, "HQ", day(10))]);
        }
        let bytes = std::fs::read(&remote_path).unwrap();

        let mut local = MasterStore::open_in_memory().unwrap();
        seed(&local, &[office(5, "OLD", day(5))]);

        let result = merge_master_snapshot(&mut local, &bytes).unwrap();
        assert_eq!(result.offices.updated, 1);
        assert!(result.summary().contains("offices: added 0, updated 1, skipped 0"));
    }

    #[test]
    fn garbage_snapshot_aborts_without_changes() {
        let mut local = MasterStore::open_in_memory().unwrap();
        seed(&local, &[office(1, "KEEP", day(1))]);

        assert!(merge_master_snapshot(&mut local, b"not a database").is_err());

        let offices: Vec<Office> = local.list().unwrap();
        assert_eq!(offices.len(), 1);
        assert_eq!(offices[0].code, "KEEP");
    }

    #[test]
    fn failure_mid_merge_rolls_back_earlier_tables() {
        let mut local = MasterStore::open_in_memory().unwrap();
        let remote = MasterStore::open_in_memory().unwrap();
        seed(&remote, &[office(1, "NEW", day(2))]);
        remote
            .connection()
            .execute("DROP TABLE members", [])
            .unwrap();

        assert!(merge_master_stores(&mut local, &remote).is_err());

        let offices: Vec<Office> = local.list().unwrap();
        assert!(offices.is_empty());
    }
}
