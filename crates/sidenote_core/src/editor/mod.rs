//! Pending-edit buffer and debounce protocol for the editing surface.
//!
//! # Responsibility
//! - Coalesce keystroke-level field deltas into one store update per
//!   idle window.
//! - Guarantee flush-before-switch: navigation never discards edits.
//!
//! # Invariants
//! - The buffer is taken optimistically at dispatch, so edits arriving
//!   during an in-flight flush start a fresh dirty cycle instead of
//!   being lost or merged into the in-flight write.
//! - The debounce timer is an owned, abortable handle; a superseded
//!   timer that already woke is fenced off by a generation counter.
//! - Flushing a buffer whose note was deleted is a benign no-op in the
//!   store; nothing is resurrected.

use crate::bus::{Event, EventBus};
use crate::model::note::{NoteId, NotePatch};
use crate::store::Store;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Idle window after the last edit before a buffered change commits.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Default)]
struct EditorState {
    note_id: Option<NoteId>,
    pending: NotePatch,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every buffered edit and explicit flush; a timer task
    /// whose generation no longer matches was superseded and must not
    /// flush.
    generation: u64,
}

struct EditorInner {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    window: Duration,
    state: Mutex<EditorState>,
}

/// Editing-surface session owning the pending buffer and its timer.
///
/// Cheap to clone; clones share the same buffer.
#[derive(Clone)]
pub struct EditorSession {
    inner: Arc<EditorInner>,
}

impl EditorSession {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>) -> Self {
        Self::with_window(store, bus, DEBOUNCE_WINDOW)
    }

    pub fn with_window(store: Arc<Store>, bus: Arc<EventBus>, window: Duration) -> Self {
        Self {
            inner: Arc::new(EditorInner {
                store,
                bus,
                window,
                state: Mutex::new(EditorState::default()),
            }),
        }
    }

    /// Note currently bound to the editing surface.
    pub fn note_id(&self) -> Option<NoteId> {
        self.lock().note_id
    }

    /// Whether unflushed field deltas are buffered.
    pub fn has_pending(&self) -> bool {
        !self.lock().pending.is_empty()
    }

    /// Buffers a title delta and restarts the idle window.
    pub fn edit_title(&self, text: impl Into<String>) {
        self.buffer(NotePatch::title(text));
    }

    /// Buffers a content delta and restarts the idle window.
    pub fn edit_content(&self, text: impl Into<String>) {
        self.buffer(NotePatch::content(text));
    }

    /// Switches the editing surface to another note.
    ///
    /// No-op when the note is already current. Otherwise the pending
    /// buffer is flushed first — the previous note's durable record
    /// reflects its edits before the new note becomes active anywhere —
    /// and the selection is persisted through the store.
    pub async fn select_note(&self, id: NoteId) {
        if self.lock().note_id == Some(id) {
            return;
        }
        self.flush_pending().await;
        {
            let mut state = self.lock();
            state.note_id = Some(id);
            state.pending = NotePatch::default();
        }
        self.inner.store.set_active_note(Some(id)).await;
    }

    /// Immediately commits the pending buffer, bypassing the timer.
    ///
    /// Publishes `save:complete` when something was written.
    pub async fn flush_pending(&self) {
        let taken = {
            let mut state = self.lock();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.generation += 1;
            match state.note_id {
                Some(id) if !state.pending.is_empty() => {
                    Some((id, std::mem::take(&mut state.pending)))
                }
                _ => {
                    state.pending = NotePatch::default();
                    None
                }
            }
        };
        let Some((id, patch)) = taken else {
            return;
        };

        self.inner.store.update_note(id, patch).await;
        self.inner.bus.publish(&Event::SaveComplete);
    }

    /// Destroy path for the editing surface: flush, then detach.
    pub async fn close(&self) {
        self.flush_pending().await;
        self.lock().note_id = None;
    }

    fn buffer(&self, patch: NotePatch) {
        let mut state = self.lock();
        if state.note_id.is_none() {
            debug!("event=edit_dropped module=editor reason=no_note_bound");
            return;
        }
        state.pending.merge(patch);

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        let window = self.inner.window;
        let session = self.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            session.flush_generation(generation).await;
        }));
    }

    /// Timer-fired flush; only the newest generation may proceed.
    async fn flush_generation(&self, generation: u64) {
        let taken = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.timer = None;
            match state.note_id {
                Some(id) if !state.pending.is_empty() => {
                    Some((id, std::mem::take(&mut state.pending)))
                }
                _ => None,
            }
        };
        let Some((id, patch)) = taken else {
            return;
        };

        self.inner.store.update_note(id, patch).await;
        self.inner.bus.publish(&Event::SaveComplete);
    }

    fn lock(&self) -> MutexGuard<'_, EditorState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
