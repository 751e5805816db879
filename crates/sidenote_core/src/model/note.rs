//! Note record, field-level patch and session preferences.
//!
//! # Responsibility
//! - Define the canonical note shape shared by store, sync and storage.
//! - Provide the patch merge/apply helpers used by the debounced write
//!   path.
//!
//! # Invariants
//! - `id` is stable and never reused for another note.
//! - `created_at` is set once; `updated_at` never decreases.
//! - Applying a patch touches only the fields the patch carries.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Stable identifier for a note.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type NoteId = Uuid;

/// Returns the current wall clock in unix epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// A user-authored text record.
///
/// Serialized field names follow the persisted record layout
/// (`{title, content, createdAt, updatedAt}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Stable global ID, immutable after creation.
    pub id: NoteId,
    /// May be empty; edited independently from `content`.
    pub title: String,
    /// May be empty; edited independently from `title`.
    pub content: String,
    /// Unix epoch milliseconds, set once at creation.
    pub created_at: i64,
    /// Unix epoch milliseconds, bumped on every title/content mutation.
    pub updated_at: i64,
}

impl Note {
    /// Creates an empty note with a generated stable ID.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4())
    }

    /// Creates an empty note with a caller-provided stable ID.
    ///
    /// Used by load/import paths where identity already exists.
    pub fn with_id(id: NoteId) -> Self {
        let now = now_ms();
        Self {
            id,
            title: String::new(),
            content: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Merges the provided fields into this note and bumps `updated_at`.
    ///
    /// Only fields present in the patch are written; title and content
    /// are flushed independently by the editor, so a patch rarely
    /// carries both. The bump uses `max` so the timestamp stays
    /// non-decreasing even when the clock has not advanced.
    pub fn apply(&mut self, patch: &NotePatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        self.updated_at = now_ms().max(self.updated_at);
    }
}

impl Default for Note {
    fn default() -> Self {
        Self::new()
    }
}

/// Field-level delta buffered by the editor between flushes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NotePatch {
    /// Patch carrying only a title change.
    pub fn title(value: impl Into<String>) -> Self {
        Self {
            title: Some(value.into()),
            content: None,
        }
    }

    /// Patch carrying only a content change.
    pub fn content(value: impl Into<String>) -> Self {
        Self {
            title: None,
            content: Some(value.into()),
        }
    }

    /// Folds a newer patch over this one; newer fields win per field.
    pub fn merge(&mut self, newer: NotePatch) {
        if newer.title.is_some() {
            self.title = newer.title;
        }
        if newer.content.is_some() {
            self.content = newer.content;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

/// Session UI preferences, persisted as one record.
///
/// Serialized keys mirror the persisted layout
/// (`{sidebarCollapsed, activeNoteId}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub sidebar_collapsed: bool,
    /// Must resolve to an existing note; repaired to `None` at load
    /// when it does not.
    pub active_note_id: Option<NoteId>,
}
