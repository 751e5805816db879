//! Domain model for the side panel core.
//!
//! # Responsibility
//! - Define the canonical note record and its field-level patch shape.
//! - Define the session preference record persisted next to notes.
//!
//! # Invariants
//! - Every note is identified by a stable `NoteId` that is never reused.
//! - `updated_at` is non-decreasing across the lifetime of a note.

pub mod note;
