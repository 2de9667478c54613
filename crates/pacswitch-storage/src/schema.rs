//! Database schema and migrations.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < SCHEMA_VERSION {
        info!(
            "Running migrations from version {} to {}",
            current_version, SCHEMA_VERSION
        );

        if current_version < 1 {
            migrate_v1(conn)?;
        }

        if current_version < 2 {
            migrate_v2(conn)?;
        }

        set_schema_version(conn, SCHEMA_VERSION)?;
        info!("Migrations complete");
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    // Create schema_version table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration to version 1: Initial schema.
fn migrate_v1(conn: &Connection) -> Result<()> {
    info!("Applying migration v1: Initial schema");

    // Config table - key-value configuration (settings, options)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // Domain rules - ordered per-domain proxy overrides
    conn.execute(
        "CREATE TABLE IF NOT EXISTS domain_rules (
            id TEXT PRIMARY KEY,
            position INTEGER NOT NULL,
            pattern TEXT NOT NULL,
            proxy_type TEXT NOT NULL,
            server TEXT NOT NULL DEFAULT '',
            port INTEGER NOT NULL DEFAULT 0,
            username TEXT NOT NULL DEFAULT '',
            password TEXT NOT NULL DEFAULT '',
            mtproto_secret TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Index for ordered evaluation
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_domain_rules_position ON domain_rules (position)",
        [],
    )?;

    // Tab rules - per-tab proxy assignments
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tab_rules (
            tab_id INTEGER PRIMARY KEY,
            assignment TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    // Tab patterns - transient snapshots regenerated on every tab or
    // rule change; wiped and rewritten wholesale
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tab_patterns (
            position INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern TEXT NOT NULL,
            proxy_type TEXT NOT NULL,
            server TEXT NOT NULL DEFAULT '',
            port INTEGER NOT NULL DEFAULT 0,
            username TEXT NOT NULL DEFAULT '',
            password TEXT NOT NULL DEFAULT '',
            mtproto_secret TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;

    Ok(())
}

/// Migration to version 2: MTProto activity record.
fn migrate_v2(conn: &Connection) -> Result<()> {
    info!("Applying migration v2: MTProto activity record");

    // Single-row diagnostics record for the last applied MTProto config
    conn.execute(
        "CREATE TABLE IF NOT EXISTS mtproto_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            server TEXT NOT NULL,
            port INTEGER NOT NULL,
            secret_provided INTEGER NOT NULL DEFAULT 0,
            activated_at TEXT NOT NULL,
            source TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}
