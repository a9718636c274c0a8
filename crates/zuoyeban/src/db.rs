//! SQLite storage for board preferences
//!
//! This module handles:
//! - Database initialization and migrations
//! - Preference rows with cookie-style expiry

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

/// Migrations compiled into the binary, applied in order
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_preferences",
    include_str!("../db/migrations/001_preferences.sql"),
)];

/// Open the database at the given path, running any pending migrations
pub fn init_db(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    prepare(conn)
}

/// In-memory database with the schema applied
pub fn init_memory_db() -> Result<Connection> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> Result<Connection> {
    let count = run_migrations(&conn)?;
    if count > 0 {
        info!(count = count, "Applied migrations");
    }
    Ok(conn)
}

/// Run pending migrations, returning how many were applied
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let mut applied = 0;

    for (version, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
            [version],
            |row| row.get(0),
        )?;

        if already_applied {
            continue;
        }

        conn.execute_batch(sql)
            .with_context(|| format!("Failed to apply migration: {}", version))?;

        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            [version],
        )?;

        debug!(version = %version, "Applied migration");
        applied += 1;
    }

    Ok(applied)
}

/// Get a preference value unless it has expired at `now` (unix seconds)
pub fn get_preference(conn: &Connection, name: &str, now: i64) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM preferences WHERE name = ?1 AND expires_at > ?2",
            params![name, now],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

/// Insert or replace a preference value
pub fn set_preference(conn: &Connection, name: &str, value: &str, expires_at: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO preferences (name, value, expires_at, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(name) DO UPDATE SET
            value = excluded.value,
            expires_at = excluded.expires_at,
            updated_at = excluded.updated_at",
        params![name, value, expires_at],
    )?;
    Ok(())
}

/// Delete a preference, returning whether it existed
pub fn delete_preference(conn: &Connection, name: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM preferences WHERE name = ?1", [name])?;
    Ok(affected > 0)
}

/// Delete every preference expired at `now`
pub fn purge_expired(conn: &Connection, now: i64) -> Result<usize> {
    let affected = conn.execute("DELETE FROM preferences WHERE expires_at <= ?1", [now])?;
    Ok(affected)
}

/// Count stored preferences, expired or not
pub fn count_preferences(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM preferences", [], |row| row.get(0))?;
    Ok(count as usize)
}
