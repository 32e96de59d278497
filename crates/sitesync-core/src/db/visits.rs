//! Visits store: the append-only visit log

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::connection::{open_read_only, open_read_write};
use super::migrations;
use crate::error::Result;
use crate::models::Visit;
use crate::util::from_unix_millis;

/// Handle to a site's visits store file
pub struct VisitsStore {
    conn: Connection,
}

impl VisitsStore {
    /// Open the visits store at `path`, creating and migrating it if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = open_read_write(path.as_ref())?;
        migrations::run_visits(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_visits(&conn)?;
        Ok(Self { conn })
    }

    /// Open an existing visits file read-only; `NotFound` when absent
    pub fn open_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let conn = open_read_only(path.as_ref())?;
        Ok(Self { conn })
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Append a visit, filling in the id assigned by the store
    pub fn append(&self, visit: &mut Visit) -> Result<()> {
        self.conn.execute(
            "INSERT INTO visits (member_id, office_id, visited_at_utc, purpose)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                visit.member_id,
                visit.office_id,
                visit.visited_at_utc.timestamp_millis(),
                visit.purpose
            ],
        )?;
        visit.id = self.conn.last_insert_rowid();
        Ok(())
    }

    pub fn count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM visits", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Timestamp of the most recent visit, if any
    pub fn latest_visit_at(&self) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<i64> = self.conn.query_row(
            "SELECT MAX(visited_at_utc) FROM visits",
            [],
            |row| row.get(0),
        )?;
        Ok(latest.map(from_unix_millis))
    }

    /// Visits whose timestamp falls in the inclusive range, oldest first.
    ///
    /// A `None` bound leaves that side of the range open.
    pub fn list_range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Visit>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, member_id, office_id, visited_at_utc, purpose
             FROM visits
             WHERE (?1 IS NULL OR visited_at_utc >= ?1)
               AND (?2 IS NULL OR visited_at_utc <= ?2)
             ORDER BY visited_at_utc ASC, id ASC",
        )?;

        let visits = stmt
            .query_map(
                params![
                    from.map(|at| at.timestamp_millis()),
                    to.map(|at| at.timestamp_millis())
                ],
                Self::parse_visit,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(visits)
    }

    fn parse_visit(row: &Row<'_>) -> rusqlite::Result<Visit> {
        Ok(Visit {
            id: row.get(0)?,
            member_id: row.get(1)?,
            office_id: row.get(2)?,
            visited_at_utc: from_unix_millis(row.get(3)?),
            purpose: row.get(4)?,
        })
    }
}
