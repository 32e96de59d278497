//! Schema migrations for the master and visits stores

use rusqlite::Connection;

use crate::error::Result;

/// Current master store schema version
const MASTER_VERSION: i32 = 1;

/// Current visits store schema version
const VISITS_VERSION: i32 = 1;

const MASTER_V1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS offices (
        id INTEGER PRIMARY KEY,
        code TEXT NOT NULL,
        name TEXT NOT NULL,
        address TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        updated_at_utc INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_offices_code ON offices(code)",
    "CREATE TABLE IF NOT EXISTS member_types (
        id INTEGER PRIMARY KEY,
        code TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT,
        badge_color TEXT,
        updated_at_utc INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS members (
        id INTEGER PRIMARY KEY,
        member_number TEXT NOT NULL,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        member_type_id INTEGER,
        office_id INTEGER,
        email TEXT,
        phone TEXT,
        photo_file_name TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at_utc INTEGER NOT NULL,
        updated_at_utc INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_members_number ON members(member_number)",
    "CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
];

const VISITS_V1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS visits (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        member_id INTEGER NOT NULL,
        office_id INTEGER,
        visited_at_utc INTEGER NOT NULL,
        purpose TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_visits_visited_at ON visits(visited_at_utc)",
    "CREATE INDEX IF NOT EXISTS idx_visits_member ON visits(member_id)",
];

/// Bring a master store up to the current schema
pub fn run_master(conn: &Connection) -> Result<()> {
    if get_version(conn)? < MASTER_VERSION {
        apply(conn, "master", 1, MASTER_V1)?;
    }
    Ok(())
}

/// Bring a visits store up to the current schema
pub fn run_visits(conn: &Connection) -> Result<()> {
    if get_version(conn)? < VISITS_VERSION {
        apply(conn, "visits", 1, VISITS_V1)?;
    }
    Ok(())
}

fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn apply(conn: &Connection, store: &str, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;
    for statement in statements {
        tx.execute(statement, [])?;
    }
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!(store, version, "Migrated store schema");
    Ok(())
}
