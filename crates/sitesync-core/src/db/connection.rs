//! `SQLite` connection management

use std::io::Write;
use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::error::{Error, Result};

/// Open (creating if needed) a store file for reading and writing.
///
/// The rollback journal is kept in `DELETE` mode so the whole store lives in a
/// single file that can be shipped to another site verbatim.
pub fn open_read_write(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

/// Open an existing store file without write access.
///
/// Fails with [`Error::NotFound`] when the file does not exist instead of
/// creating an empty database.
pub fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Confirm that `path` is a readable `SQLite` file.
///
/// Only the schema catalogue is touched, so the probe is cheap enough for a
/// health endpoint.
pub fn probe_store(path: &Path) -> Result<()> {
    let conn = open_read_only(path)?;
    let _tables: i64 = conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))?;
    Ok(())
}

/// Leading bytes of every `SQLite` database file
pub const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

/// Confirm that an in-memory payload is a readable `SQLite` file.
///
/// Used before a received store replaces a local one. Any failure is reported
/// as [`Error::InvalidInput`].
pub fn probe_store_bytes(bytes: &[u8]) -> Result<()> {
    if !bytes.starts_with(SQLITE_HEADER) {
        return Err(Error::InvalidInput(
            "payload is not a SQLite database".to_string(),
        ));
    }
    let mut spill = tempfile::NamedTempFile::new()?;
    spill.write_all(bytes)?;
    spill.flush()?;
    probe_store(spill.path())
        .map_err(|error| Error::InvalidInput(format!("payload is not a readable database: {error}")))
}

fn configure(conn: &Connection) -> Result<()> {
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "DELETE", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "FULL")?;
    Ok(())
}
