//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::StoreResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    info!(
        current_version,
        target_version = CURRENT_VERSION,
        "Running migrations"
    );

    if current_version < 1 {
        migrate_v1_content(conn)?;
    }
    if current_version < 2 {
        migrate_v2_federation_mappings(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: canonical content table.
fn migrate_v1_content(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v1: content");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS content (
            id TEXT PRIMARY KEY,
            author_id TEXT NOT NULL,
            body TEXT NOT NULL,
            embeds TEXT NOT NULL DEFAULT '[]',
            reply_to_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_content_author
            ON content(author_id);
        CREATE INDEX IF NOT EXISTS idx_content_reply_to
            ON content(reply_to_id);
        ",
    )?;

    record_migration(conn, 1, "content")
}

/// V2: federation mappings, one row per (content, protocol) pair.
fn migrate_v2_federation_mappings(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v2: federation mappings");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS federation_mappings (
            content_id TEXT NOT NULL,
            protocol TEXT NOT NULL,
            remote_id TEXT,
            remote_digest TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            attempt_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            last_attempt_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (content_id, protocol)
        );

        CREATE INDEX IF NOT EXISTS idx_federation_mappings_status
            ON federation_mappings(status);
        CREATE INDEX IF NOT EXISTS idx_federation_mappings_remote
            ON federation_mappings(protocol, remote_id);
        ",
    )?;

    record_migration(conn, 2, "federation_mappings")
}
