//! Message persistence for the conversation session.
//!
//! The session engine only ever loads the whole conversation once and then
//! appends. Implementations must keep append order as the load order.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use beacon_core::error::BeaconError;
use beacon_core::types::{Message, Role};

use crate::db::Database;

/// Load/append contract for a conversation scoped to one local profile.
pub trait MessageStore: Send + Sync {
    /// Return every stored message in append order. An empty store is an
    /// empty vector, not an error.
    fn load(&self) -> Result<Vec<Message>, BeaconError>;

    /// Durably record one message after all previously recorded ones.
    fn append(&self, message: &Message) -> Result<(), BeaconError>;
}

fn reject_system(message: &Message) -> Result<(), BeaconError> {
    if message.role == Role::System {
        return Err(BeaconError::Storage(
            "system messages are never persisted".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// SQLite
// =============================================================================

/// SQLite-backed store; one table shared by all profiles.
#[derive(Debug, Clone)]
pub struct SqliteMessageStore {
    db: Arc<Database>,
    profile: String,
}

impl SqliteMessageStore {
    pub fn new(db: Arc<Database>, profile: impl Into<String>) -> Self {
        Self {
            db,
            profile: profile.into(),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

/// Raw row before normalization.
struct MessageRow {
    seq: i64,
    id: String,
    role: String,
    content: String,
    created_at_ms: i64,
}

impl MessageRow {
    /// Turn a stored row into a session message. Rows that can never be part
    /// of the visible conversation are dropped.
    fn normalize(self) -> Option<Message> {
        let role = match self.role.parse::<Role>() {
            Ok(Role::System) => {
                warn!(seq = self.seq, "Skipping persisted system message");
                return None;
            }
            Ok(role) => role,
            Err(e) => {
                warn!(seq = self.seq, error = %e, "Skipping message with unknown role");
                return None;
            }
        };

        let id = Uuid::parse_str(&self.id).unwrap_or_else(|_| {
            debug!(seq = self.seq, "Regenerating unparsable message id");
            Uuid::new_v4()
        });

        let created_at =
            DateTime::<Utc>::from_timestamp_millis(self.created_at_ms).unwrap_or_default();

        Some(Message {
            id,
            role,
            content: self.content,
            created_at,
        })
    }
}

impl MessageStore for SqliteMessageStore {
    fn load(&self) -> Result<Vec<Message>, BeaconError> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT seq, id, role, content, created_at_ms
                     FROM messages WHERE profile = ?1 ORDER BY seq ASC",
                )
                .map_err(|e| BeaconError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![self.profile], |row| {
                    Ok(MessageRow {
                        seq: row.get(0)?,
                        id: row.get(1)?,
                        role: row.get(2)?,
                        content: row.get(3)?,
                        created_at_ms: row.get(4)?,
                    })
                })
                .map_err(|e| BeaconError::Storage(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| BeaconError::Storage(e.to_string()))?;
            Ok(rows)
        })?;

        let messages: Vec<Message> = rows.into_iter().filter_map(MessageRow::normalize).collect();
        debug!(
            profile = %self.profile,
            count = messages.len(),
            "Loaded conversation"
        );
        Ok(messages)
    }

    fn append(&self, message: &Message) -> Result<(), BeaconError> {
        reject_system(message)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, profile, role, content, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    message.id.to_string(),
                    self.profile,
                    message.role.as_str(),
                    message.content,
                    message.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| BeaconError::Storage(format!("Failed to append message: {}", e)))?;
            Ok(())
        })
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Volatile store for tests and sessions that should not outlive the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryMessageStore {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing conversation.
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Arc::new(Mutex::new(messages)),
        }
    }

    /// Snapshot of everything appended so far.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl MessageStore for MemoryMessageStore {
    fn load(&self) -> Result<Vec<Message>, BeaconError> {
        let messages = self
            .messages
            .lock()
            .map_err(|e| BeaconError::Storage(format!("store lock poisoned: {}", e)))?;
        Ok(messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect())
    }

    fn append(&self, message: &Message) -> Result<(), BeaconError> {
        reject_system(message)?;
        self.messages
            .lock()
            .map_err(|e| BeaconError::Storage(format!("store lock poisoned: {}", e)))?
            .push(message.clone());
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sqlite_store(profile: &str) -> SqliteMessageStore {
        SqliteMessageStore::new(Arc::new(Database::in_memory().unwrap()), profile)
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).single().unwrap()
    }

    #[test]
    fn test_empty_store_loads_empty() {
        assert!(sqlite_store("default").load().unwrap().is_empty());
        assert!(MemoryMessageStore::new().load().unwrap().is_empty());
    }

    #[test]
    fn test_append_then_load_preserves_order_and_fields() {
        let store = sqlite_store("default");
        let first = Message::assistant("Hello", at(1_000));
        let second = Message::user("help, fire nearby", at(2_000));
        let third = Message::assistant("Stay calm, evacuate now.", at(2_000));
        store.append(&first).unwrap();
        store.append(&second).unwrap();
        store.append(&third).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec![first, second, third]);
    }

    #[test]
    fn test_profiles_are_isolated() {
        let db = Arc::new(Database::in_memory().unwrap());
        let alice = SqliteMessageStore::new(Arc::clone(&db), "alice");
        let bob = SqliteMessageStore::new(db, "bob");
        alice.append(&Message::user("hi", at(1))).unwrap();

        assert_eq!(alice.load().unwrap().len(), 1);
        assert!(bob.load().unwrap().is_empty());
        assert_eq!(bob.profile(), "bob");
    }

    #[test]
    fn test_append_rejects_system_message() {
        let system = Message::new(Role::System, "instruction", at(0));
        let store = sqlite_store("default");
        assert!(matches!(
            store.append(&system),
            Err(BeaconError::Storage(_))
        ));
        assert!(store.load().unwrap().is_empty());

        let memory = MemoryMessageStore::new();
        assert!(memory.append(&system).is_err());
        assert!(memory.snapshot().is_empty());
    }

    #[test]
    fn test_load_skips_foreign_rows() {
        let db = Arc::new(Database::in_memory().unwrap());
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO messages (id, profile, role, content, created_at_ms) VALUES
                   ('not-a-uuid', 'default', 'user', 'first', 10),
                   ('a', 'default', 'system', 'hidden', 20),
                   ('b', 'default', 'tool', 'weird', 30),
                   ('c', 'default', 'assistant', 'last', 40);",
            )
            .map_err(|e| BeaconError::Storage(e.to_string()))
        })
        .unwrap();

        let loaded = SqliteMessageStore::new(db, "default").load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content, "first");
        assert_eq!(loaded[0].role, Role::User);
        assert_eq!(loaded[1].content, "last");
        assert_eq!(loaded[1].created_at, at(40));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beacon.db");
        let msg = Message::user("still here?", at(5_000));
        {
            let store = SqliteMessageStore::new(Arc::new(Database::new(&path).unwrap()), "p");
            store.append(&msg).unwrap();
        }
        let store = SqliteMessageStore::new(Arc::new(Database::new(&path).unwrap()), "p");
        assert_eq!(store.load().unwrap(), vec![msg]);
    }

    #[test]
    fn test_memory_store_with_messages() {
        let seeded = vec![Message::assistant("Hi", at(1)), Message::user("Hey", at(2))];
        let store = MemoryMessageStore::with_messages(seeded.clone());
        assert_eq!(store.load().unwrap(), seeded);
        store.append(&Message::assistant("Yes?", at(3))).unwrap();
        assert_eq!(store.snapshot().len(), 3);
    }
}
