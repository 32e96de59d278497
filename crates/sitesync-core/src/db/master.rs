//! Master store: offices, member categories, members and settings

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::connection::{open_read_only, open_read_write};
use super::migrations;
use crate::error::Result;
use crate::models::{Member, MemberType, Office};
use crate::util::{from_unix_millis, utc_now};

/// A master store row that participates in timestamp-based merging.
///
/// `overwrite` copies every mutable column onto the stored row with the same
/// id; it never touches the id itself (nor, for members, the member number).
pub trait MasterRow: Sized + Clone {
    /// Table the rows live in
    const TABLE: &'static str;

    fn id(&self) -> i64;
    fn updated_at(&self) -> DateTime<Utc>;
    fn set_updated_at(&mut self, at: DateTime<Utc>);
    /// Identifier shown to operators when a row is skipped
    fn label(&self) -> String;

    fn load_all(conn: &Connection) -> Result<Vec<Self>>;
    fn find(conn: &Connection, id: i64) -> Result<Option<Self>>;
    fn insert(&self, conn: &Connection) -> Result<()>;
    fn overwrite(&self, conn: &Connection) -> Result<()>;
}

const OFFICE_COLUMNS: &str = "id, code, name, address, is_active, updated_at_utc";

impl Office {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            address: row.get(3)?,
            is_active: row.get(4)?,
            updated_at_utc: from_unix_millis(row.get(5)?),
        })
    }
}

impl MasterRow for Office {
    const TABLE: &'static str = "offices";

    fn id(&self) -> i64 {
        self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at_utc
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at_utc = at;
    }

    fn label(&self) -> String {
        Self::label(self)
    }

    fn load_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!("SELECT {OFFICE_COLUMNS} FROM offices ORDER BY id"))?;
        let rows = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn find(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let row = conn
            .query_row(
                &format!("SELECT {OFFICE_COLUMNS} FROM offices WHERE id = ?1"),
                [id],
                Self::from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            &format!("INSERT INTO offices ({OFFICE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                self.id,
                self.code,
                self.name,
                self.address,
                self.is_active,
                self.updated_at_utc.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    fn overwrite(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "UPDATE offices SET code = ?2, name = ?3, address = ?4, is_active = ?5, updated_at_utc = ?6
             WHERE id = ?1",
            params![
                self.id,
                self.code,
                self.name,
                self.address,
                self.is_active,
                self.updated_at_utc.timestamp_millis()
            ],
        )?;
        Ok(())
    }
}

const MEMBER_TYPE_COLUMNS: &str = "id, code, name, description, badge_color, updated_at_utc";

impl MemberType {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            code: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            badge_color: row.get(4)?,
            updated_at_utc: from_unix_millis(row.get(5)?),
        })
    }
}

impl MasterRow for MemberType {
    const TABLE: &'static str = "member_types";

    fn id(&self) -> i64 {
        self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at_utc
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at_utc = at;
    }

    fn label(&self) -> String {
        Self::label(self)
    }

    fn load_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {MEMBER_TYPE_COLUMNS} FROM member_types ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn find(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let row = conn
            .query_row(
                &format!("SELECT {MEMBER_TYPE_COLUMNS} FROM member_types WHERE id = ?1"),
                [id],
                Self::from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO member_types ({MEMBER_TYPE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            params![
                self.id,
                self.code,
                self.name,
                self.description,
                self.badge_color,
                self.updated_at_utc.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    fn overwrite(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "UPDATE member_types SET code = ?2, name = ?3, description = ?4, badge_color = ?5,
                updated_at_utc = ?6
             WHERE id = ?1",
            params![
                self.id,
                self.code,
                self.name,
                self.description,
                self.badge_color,
                self.updated_at_utc.timestamp_millis()
            ],
        )?;
        Ok(())
    }
}

const MEMBER_COLUMNS: &str = "id, member_number, first_name, last_name, member_type_id, office_id, \
     email, phone, photo_file_name, is_active, created_at_utc, updated_at_utc";

impl Member {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            member_number: row.get(1)?,
            first_name: row.get(2)?,
            last_name: row.get(3)?,
            member_type_id: row.get(4)?,
            office_id: row.get(5)?,
            email: row.get(6)?,
            phone: row.get(7)?,
            photo_file_name: row.get(8)?,
            is_active: row.get(9)?,
            created_at_utc: from_unix_millis(row.get(10)?),
            updated_at_utc: from_unix_millis(row.get(11)?),
        })
    }
}

impl MasterRow for Member {
    const TABLE: &'static str = "members";

    fn id(&self) -> i64 {
        self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at_utc
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at_utc = at;
    }

    fn label(&self) -> String {
        Self::label(self)
    }

    fn load_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!("SELECT {MEMBER_COLUMNS} FROM members ORDER BY id"))?;
        let rows = stmt
            .query_map([], Self::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn find(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let row = conn
            .query_row(
                &format!("SELECT {MEMBER_COLUMNS} FROM members WHERE id = ?1"),
                [id],
                Self::from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn insert(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            &format!(
                "INSERT INTO members ({MEMBER_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                self.id,
                self.member_number,
                self.first_name,
                self.last_name,
                self.member_type_id,
                self.office_id,
                self.email,
                self.phone,
                self.photo_file_name,
                self.is_active,
                self.created_at_utc.timestamp_millis(),
                self.updated_at_utc.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    fn overwrite(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "UPDATE members SET first_name = ?2, last_name = ?3, member_type_id = ?4,
                office_id = ?5, email = ?6, phone = ?7, photo_file_name = ?8, is_active = ?9,
                created_at_utc = ?10, updated_at_utc = ?11
             WHERE id = ?1",
            params![
                self.id,
                self.first_name,
                self.last_name,
                self.member_type_id,
                self.office_id,
                self.email,
                self.phone,
                self.photo_file_name,
                self.is_active,
                self.created_at_utc.timestamp_millis(),
                self.updated_at_utc.timestamp_millis()
            ],
        )?;
        Ok(())
    }
}

/// All settings as `(key, value)` pairs, ordered by key
pub fn list_settings(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
    let settings = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(settings)
}

/// Insert or replace a single setting
pub fn upsert_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Handle to a site's master store file
pub struct MasterStore {
    conn: Connection,
}

impl MasterStore {
    /// Open the master store at `path`, creating and migrating it if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = open_read_write(path.as_ref())?;
        migrations::run_master(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory master store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_master(&conn)?;
        Ok(Self { conn })
    }

    /// Open an existing master file read-only, without migrating it.
    ///
    /// Used for live counts on the server and for reading downloaded
    /// snapshots; fails with `NotFound` when the file is absent.
    pub fn open_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let conn = open_read_only(path.as_ref())?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    pub fn list<T: MasterRow>(&self) -> Result<Vec<T>> {
        T::load_all(&self.conn)
    }

    pub fn get<T: MasterRow>(&self, id: i64) -> Result<Option<T>> {
        T::find(&self.conn, id)
    }

    /// Insert or update a row as a local edit.
    ///
    /// The row's `updated_at_utc` is re-stamped so it is strictly greater than
    /// the stored value, even when the wall clock has not advanced.
    pub fn save<T: MasterRow>(&self, row: &mut T) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let existing = T::find(&tx, row.id())?;
        let now = utc_now();
        let stamp = existing
            .as_ref()
            .map_or(now, |stored| now.max(stored.updated_at() + Duration::milliseconds(1)));
        row.set_updated_at(stamp);

        if existing.is_some() {
            row.overwrite(&tx)?;
        } else {
            row.insert(&tx)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn member_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM members", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        upsert_setting(&self.conn, key, value)
    }

    pub fn settings(&self) -> Result<Vec<(String, String)>> {
        list_settings(&self.conn)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn setup() -> MasterStore {
        MasterStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_save_and_get_office() {
        let store = setup();
        let mut office = Office::new(1, "HQ", "Headquarters");
        office.address = Some("1 Main St".to_string());
        store.save(&mut office).unwrap();

        let fetched: Office = store.get(1).unwrap().unwrap();
        assert_eq!(fetched, office);
    }

    #[test]
    fn test_save_strictly_advances_timestamp() {
        let store = setup();
        let future = Utc.with_ymd_and_hms(2999, 1, 1, 0, 0, 0).unwrap();
        let mut office = Office::new(1, "HQ", "Headquarters");
        office.updated_at_utc = future;
        office.insert(store.connection()).unwrap();

        office.name = "Head Office".to_string();
        store.save(&mut office).unwrap();
        assert!(office.updated_at_utc > future);

        let before = office.updated_at_utc;
        store.save(&mut office).unwrap();
        assert!(office.updated_at_utc > before);
    }

    #[test]
    fn test_member_overwrite_keeps_member_number() {
        let store = setup();
        let mut member = Member::new(3, "M-0003", "Grace", "Hopper");
        store.save(&mut member).unwrap();

        let mut edited = member.clone();
        edited.member_number = "CHANGED".to_string();
        edited.email = Some("grace@example.com".to_string());
        store.save(&mut edited).unwrap();

        let fetched: Member = store.get(3).unwrap().unwrap();
        assert_eq!(fetched.member_number, "M-0003");
        assert_eq!(fetched.email.as_deref(), Some("grace@example.com"));
    }

    #[test]
    fn test_member_count() {
        let store = setup();
        assert_eq!(store.member_count().unwrap(), 0);
        store
            .save(&mut Member::new(5, "M-5", "A", "B"))
            .unwrap();
        assert_eq!(store.member_count().unwrap(), 1);
    }

    #[test]
    fn test_settings_round_trip() {
        let store = setup();
        assert_eq!(store.setting("SiteCode").unwrap(), None);
        store.set_setting("SiteCode", "NORTH").unwrap();
        store.set_setting("SiteCode", "SOUTH").unwrap();
        store.set_setting("SiteDisplayName", "South Site").unwrap();
        assert_eq!(store.setting("SiteCode").unwrap().as_deref(), Some("SOUTH"));
        assert_eq!(
            store.settings().unwrap(),
            vec![
                ("SiteCode".to_string(), "SOUTH".to_string()),
                ("SiteDisplayName".to_string(), "South Site".to_string()),
            ]
        );
    }

    #[test]
    fn test_open_snapshot_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.db");
        {
            let store = MasterStore::open(&path).unwrap();
            store
                .save(&mut MemberType::new(1, "STAFF", "Staff"))
                .unwrap();
        }

        let snapshot = MasterStore::open_snapshot(&path).unwrap();
        let types: Vec<MemberType> = snapshot.list().unwrap();
        assert_eq!(types.len(), 1);
        assert!(snapshot.set_setting("k", "v").is_err());
    }
}
