//! SQLite-backed storage for note records and preferences.
//!
//! # Invariants
//! - Note fields live in columns; preferences are one JSON payload row.
//! - Loaded rows with a malformed uuid fail the load instead of being
//!   silently skipped.

use super::{PersistedState, StorageBackend, StorageError, StorageResult};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::note::{Note, NoteId, Preferences};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// SQLite storage backend over a migrated connection.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Wraps an already-bootstrapped connection (see [`crate::db::open_db`]).
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens a database file, migrates it and wraps it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        Ok(Self::new(open_db(path)?))
    }

    /// Opens an in-memory database; used by tests and the smoke CLI.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self::new(open_db_in_memory()?))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageBackend for SqliteStorage {
    fn load(&self) -> StorageResult<PersistedState> {
        let conn = self.conn();

        let mut stmt = conn.prepare(
            "SELECT id, title, content, created_at, updated_at
             FROM notes
             ORDER BY position ASC, updated_at DESC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get("id")?;
            notes.push(Note {
                id: parse_note_id(&id_text)?,
                title: row.get("title")?,
                content: row.get("content")?,
                created_at: row.get("created_at")?,
                updated_at: row.get("updated_at")?,
            });
        }

        let payload: Option<String> = conn
            .query_row("SELECT payload FROM preferences WHERE id = 1;", [], |row| {
                row.get(0)
            })
            .optional()?;
        let preferences = match payload {
            Some(text) => serde_json::from_str(&text)?,
            None => Preferences::default(),
        };

        Ok(PersistedState { notes, preferences })
    }

    fn upsert_note(&self, note: &Note, position: u32) -> StorageResult<()> {
        self.conn().execute(
            "INSERT INTO notes (id, title, content, created_at, updated_at, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                updated_at = excluded.updated_at,
                position = excluded.position;",
            params![
                note.id.to_string(),
                note.title.as_str(),
                note.content.as_str(),
                note.created_at,
                note.updated_at,
                i64::from(position),
            ],
        )?;
        Ok(())
    }

    fn delete_note(&self, id: NoteId) -> StorageResult<()> {
        self.conn()
            .execute("DELETE FROM notes WHERE id = ?1;", [id.to_string()])?;
        Ok(())
    }

    fn write_order(&self, ordered_ids: &[NoteId]) -> StorageResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for (index, id) in ordered_ids.iter().enumerate() {
            tx.execute(
                "UPDATE notes SET position = ?1 WHERE id = ?2;",
                params![index as i64, id.to_string()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn write_preferences(&self, preferences: &Preferences) -> StorageResult<()> {
        let payload = serde_json::to_string(preferences)?;
        self.conn().execute(
            "INSERT INTO preferences (id, payload) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload;",
            [payload],
        )?;
        Ok(())
    }
}

fn parse_note_id(value: &str) -> StorageResult<NoteId> {
    Uuid::parse_str(value)
        .map_err(|_| StorageError::InvalidData(format!("invalid uuid value `{value}` in notes.id")))
}

#[cfg(test)]
mod tests {
    use super::SqliteStorage;
    use crate::model::note::{Note, NotePatch, Preferences};
    use crate::storage::StorageBackend;

    #[test]
    fn load_returns_notes_in_position_order() {
        let storage = SqliteStorage::open_in_memory().unwrap();

        let mut first = Note::new();
        first.apply(&NotePatch::title("first"));
        let mut second = Note::new();
        second.apply(&NotePatch::title("second"));

        storage.upsert_note(&first, 1).unwrap();
        storage.upsert_note(&second, 0).unwrap();

        let state = storage.load().unwrap();
        assert_eq!(state.notes.len(), 2);
        assert_eq!(state.notes[0].title, "second");
        assert_eq!(state.notes[1].title, "first");
    }

    #[test]
    fn upsert_replaces_existing_record() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut note = Note::new();
        storage.upsert_note(&note, 0).unwrap();

        note.apply(&NotePatch::content("revised"));
        storage.upsert_note(&note, 0).unwrap();

        let state = storage.load().unwrap();
        assert_eq!(state.notes.len(), 1);
        assert_eq!(state.notes[0].content, "revised");
    }

    #[test]
    fn delete_is_idempotent_for_absent_ids() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let note = Note::new();
        storage.upsert_note(&note, 0).unwrap();

        storage.delete_note(note.id).unwrap();
        storage.delete_note(note.id).unwrap();

        assert!(storage.load().unwrap().notes.is_empty());
    }

    #[test]
    fn write_order_rewrites_positions() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut a = Note::new();
        a.apply(&NotePatch::title("a"));
        let mut b = Note::new();
        b.apply(&NotePatch::title("b"));
        storage.upsert_note(&a, 0).unwrap();
        storage.upsert_note(&b, 1).unwrap();

        storage.write_order(&[b.id, a.id]).unwrap();

        let state = storage.load().unwrap();
        assert_eq!(state.notes[0].title, "b");
        assert_eq!(state.notes[1].title, "a");
    }

    #[test]
    fn preferences_default_when_record_is_missing() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let state = storage.load().unwrap();
        assert_eq!(state.preferences, Preferences::default());
    }

    #[test]
    fn preferences_roundtrip() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let note = Note::new();
        storage.upsert_note(&note, 0).unwrap();

        let prefs = Preferences {
            sidebar_collapsed: true,
            active_note_id: Some(note.id),
        };
        storage.write_preferences(&prefs).unwrap();
        storage.write_preferences(&prefs).unwrap();

        assert_eq!(storage.load().unwrap().preferences, prefs);
    }
}
