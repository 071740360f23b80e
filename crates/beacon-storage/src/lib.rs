//! Beacon Storage crate - conversation persistence.
//!
//! Provides a WAL-mode SQLite database with versioned migrations and the
//! `MessageStore` contract the session engine persists through, with a
//! SQLite-backed and an in-memory implementation.

pub mod db;
pub mod migrations;
pub mod store;

pub use db::Database;
pub use store::{MemoryMessageStore, MessageStore, SqliteMessageStore};
