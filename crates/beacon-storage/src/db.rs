//! The conversation database file.
//!
//! Beacon writes from one place only: the session engine appends each
//! message while holding its state lock. One connection is enough, so every
//! store shares it. Callers take turns through [`Database::with_conn`].

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use beacon_core::error::BeaconError;

use crate::migrations;

/// Shared handle to the conversation database. Profiles are rows in the same
/// file, so one `Database` serves every [`SqliteMessageStore`](crate::SqliteMessageStore).
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the conversation file at `path`, creating it and its directory
    /// on first run, and bring the `messages` schema up to date.
    ///
    /// WAL with `synchronous = NORMAL` makes each append a cheap commit
    /// that survives a crash of the process.
    pub fn new(path: &Path) -> Result<Self, BeaconError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| BeaconError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| BeaconError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        Self::with_migrations(conn)
    }

    /// A conversation that disappears when the handle is dropped.
    pub fn in_memory() -> Result<Self, BeaconError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BeaconError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        Self::with_migrations(conn)
    }

    fn with_migrations(conn: Connection) -> Result<Self, BeaconError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Run `f` with exclusive use of the connection. Keep it to one load or
    /// one append so the engine is never held up behind a slow reader.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, BeaconError>
    where
        F: FnOnce(&Connection) -> Result<T, BeaconError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| BeaconError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_messages(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
                .map_err(|e| BeaconError::Storage(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        assert_eq!(count_messages(&db), 0);
    }

    #[test]
    fn test_file_database_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("beacon.db");
        let db = Database::new(&path).unwrap();
        assert_eq!(count_messages(&db), 0);
        assert!(path.exists());
    }

    #[test]
    fn test_wal_mode_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("wal.db")).unwrap();
        db.with_conn(|conn| {
            let mode: String = conn
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .map_err(|e| BeaconError::Storage(e.to_string()))?;
            assert_eq!(mode, "wal");
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beacon.db");
        drop(Database::new(&path).unwrap());
        let db = Database::new(&path).unwrap();
        assert_eq!(count_messages(&db), 0);
    }
}
