//! Note list filtering driven by the search bar.

use crate::model::note::Note;

/// Case-insensitive substring filter over title and content.
///
/// A blank query returns the full list unchanged. Returns owned
/// clones: callers hold a snapshot, never references into the store's
/// sequence.
pub fn filter_notes(notes: &[Note], query: &str) -> Vec<Note> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return notes.to_vec();
    }
    notes
        .iter()
        .filter(|note| {
            note.title.to_lowercase().contains(&needle)
                || note.content.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}
