//! Durable storage contracts and the SQLite implementation.
//!
//! # Responsibility
//! - Define the record-level persistence API consumed by the sync layer.
//! - Keep encoding details (SQL columns, JSON payloads) behind the trait.
//!
//! # Invariants
//! - Read paths reject invalid persisted state instead of masking it.
//! - The store never sees this layer directly; all calls go through the
//!   sync manager.

use crate::db::DbError;
use crate::model::note::{Note, NoteId, Preferences};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod sqlite;

pub use sqlite::SqliteStorage;

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-layer error for persistence and decode operations.
#[derive(Debug)]
pub enum StorageError {
    Db(DbError),
    /// Persisted payload failed to encode or decode.
    Encoding(serde_json::Error),
    /// Persisted row violates the record contract (e.g. malformed id).
    InvalidData(String),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Encoding(err) => write!(f, "invalid record payload: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted record: {message}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Encoding(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StorageError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encoding(value)
    }
}

/// Everything the store holds, as read back from durable storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
    /// Notes sorted by persisted position.
    pub notes: Vec<Note>,
    pub preferences: Preferences,
}

/// Record-level persistence interface.
///
/// Implementations are synchronous; the sync manager owns scheduling,
/// coalescing and retry on top of this trait.
pub trait StorageBackend: Send + Sync {
    /// Loads all note records and the preferences record.
    fn load(&self) -> StorageResult<PersistedState>;
    /// Inserts or fully replaces one note record at the given position.
    fn upsert_note(&self, note: &Note, position: u32) -> StorageResult<()>;
    /// Removes one note record. Removing an absent id is a no-op.
    fn delete_note(&self, id: NoteId) -> StorageResult<()>;
    /// Rewrites every note's position to match the given order.
    fn write_order(&self, ordered_ids: &[NoteId]) -> StorageResult<()>;
    /// Replaces the preferences record.
    fn write_preferences(&self, preferences: &Preferences) -> StorageResult<()>;
}
