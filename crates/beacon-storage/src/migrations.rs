//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use beacon_core::error::BeaconError;

/// Latest schema version known to this build.
pub const CURRENT_VERSION: i64 = 1;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), BeaconError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| BeaconError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version = schema_version(conn)?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: conversation_messages");
    }

    Ok(())
}

/// Highest applied migration version, or 0 on a fresh database.
pub fn schema_version(conn: &Connection) -> Result<i64, BeaconError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| BeaconError::Storage(format!("Failed to query migration version: {}", e)))
}

/// Version 1: conversation messages, append-only, scoped per profile.
fn apply_v1(conn: &Connection) -> Result<(), BeaconError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL,
            profile         TEXT NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            created_at_ms   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_profile
            ON messages (profile, seq ASC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'conversation_messages');
        ",
    )
    .map_err(|e| BeaconError::Storage(format!("Migration v1 failed: {}", e)))
}
