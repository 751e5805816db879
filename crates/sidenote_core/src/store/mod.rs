//! Authoritative in-memory model of notes and session preferences.
//!
//! # Responsibility
//! - Own the ordered note sequence, the active-note reference and the
//!   sidebar preference.
//! - Apply every mutation synchronously in memory, then delegate the
//!   durable leg to the sync manager.
//!
//! # Invariants
//! - Readers in the same process always observe the latest in-memory
//!   mutation; durable storage may lag until persistence completes.
//! - In-memory mutation never fails; only the persistence leg can, and
//!   that failure is logged and surfaced on the bus, never returned to
//!   the mutating caller.
//! - `active_note_id`, when set, names a note present in the sequence.
//! - No lock is held across an await point.

use crate::bus::{Event, EventBus};
use crate::model::note::{Note, NoteId, NotePatch, Preferences};
use crate::search::filter_notes;
use crate::sync::{SyncError, SyncManager, WriteOp};
use log::{error, info, warn};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Store error surfaced by `initialize`; mutation operations never
/// return one.
#[derive(Debug)]
pub enum StoreError {
    AlreadyInitialized,
    SyncManagerMissing,
    Sync(SyncError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "store is already initialized"),
            Self::SyncManagerMissing => {
                write!(f, "sync manager must be bound before this operation")
            }
            Self::Sync(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sync(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SyncError> for StoreError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

/// Explicit reorder targets for one note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Top,
    Up,
    Down,
    Bottom,
}

#[derive(Default)]
struct StoreState {
    notes: Vec<Note>,
    active_note_id: Option<NoteId>,
    sidebar_collapsed: bool,
}

impl StoreState {
    fn preferences(&self) -> Preferences {
        Preferences {
            sidebar_collapsed: self.sidebar_collapsed,
            active_note_id: self.active_note_id,
        }
    }

    fn order(&self) -> Vec<NoteId> {
        self.notes.iter().map(|note| note.id).collect()
    }
}

/// Authoritative session state holder.
///
/// Constructed once per UI session; all mutation goes through named
/// operations, and every accessor returns an owned snapshot rather
/// than a reference into the internal sequence.
pub struct Store {
    bus: Arc<EventBus>,
    state: Mutex<StoreState>,
    sync: OnceCell<Arc<SyncManager>>,
    initialized: AtomicBool,
}

impl Store {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            state: Mutex::new(StoreState::default()),
            sync: OnceCell::new(),
            initialized: AtomicBool::new(false),
        }
    }

    /// Binds the persistence adapter. One-shot; must happen before any
    /// write-producing operation.
    pub fn set_sync_manager(&self, manager: Arc<SyncManager>) {
        if self.sync.set(manager).is_err() {
            warn!("event=sync_manager_rebound module=store status=rejected");
        }
    }

    /// Loads persisted state and repairs invariant violations.
    ///
    /// Must be called exactly once before any other operation; a second
    /// call returns `AlreadyInitialized`. A dangling `active_note_id`
    /// found in the loaded preferences is nulled out and the repaired
    /// record is persisted.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(StoreError::AlreadyInitialized);
        }

        let sync = match self.sync_manager() {
            Some(sync) => sync,
            None => {
                self.initialized.store(false, Ordering::SeqCst);
                return Err(StoreError::SyncManagerMissing);
            }
        };

        let loaded = match sync.load().await {
            Ok(loaded) => loaded,
            Err(err) => {
                // Leave the gate open so the caller may retry startup.
                self.initialized.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };

        let repaired = {
            let mut state = self.lock();
            state.notes = loaded.notes;
            state.sidebar_collapsed = loaded.preferences.sidebar_collapsed;
            state.active_note_id = loaded.preferences.active_note_id;

            match state.active_note_id {
                Some(id) if !state.notes.iter().any(|note| note.id == id) => {
                    info!("event=active_note_repaired module=store note={id}");
                    state.active_note_id = None;
                    Some(state.preferences())
                }
                _ => None,
            }
        };

        if let Some(preferences) = repaired {
            if let Err(err) = sync.persist(WriteOp::WritePreferences(preferences)).await {
                error!("event=persist_failed module=store record=preferences error={err}");
            }
        }

        info!(
            "event=store_initialized module=store notes={} status=ok",
            self.lock().notes.len()
        );
        Ok(())
    }

    /// Creates an empty note at the head of the sequence.
    ///
    /// Returns the note synchronously so the caller can select it
    /// without waiting for the write to land; the upsert and the order
    /// rewrite are committed in a spawned task. Selection itself is a
    /// separate operation; creation never touches `active_note_id`.
    ///
    /// Must run inside an async runtime context.
    pub fn create_note(&self) -> Note {
        let note = Note::new();
        let order = {
            let mut state = self.lock();
            state.notes.insert(0, note.clone());
            state.order()
        };
        info!("event=note_created module=store note={}", note.id);

        let Some(sync) = self.sync_manager() else {
            error!("event=sync_manager_missing module=store op=create_note");
            return note;
        };
        let bus = self.bus.clone();
        let created = note.clone();
        tokio::spawn(async move {
            let persisted = sync
                .persist(WriteOp::UpsertNote {
                    note: created.clone(),
                    position: 0,
                })
                .await;
            if let Err(err) = persisted {
                error!(
                    "event=persist_failed module=store record=note:{} error={err}",
                    created.id
                );
                bus.publish(&Event::SaveFailed(created.id));
                return;
            }
            if let Err(err) = sync.persist(WriteOp::WriteOrder(order)).await {
                error!("event=persist_failed module=store record=order error={err}");
            }
            bus.publish(&Event::NoteUpdated(created));
        });

        note
    }

    /// Merges the provided fields into the matching note and persists.
    ///
    /// A missing id is a benign race (the note may have been deleted
    /// while an edit was in flight): logged, not an error. Publishes
    /// `note-updated` once the record commits, `save:failed` when
    /// retries are exhausted.
    pub async fn update_note(&self, id: NoteId, patch: NotePatch) {
        if patch.is_empty() {
            return;
        }

        let snapshot = {
            let mut state = self.lock();
            let found = state.notes.iter().position(|note| note.id == id);
            found.map(|index| {
                state.notes[index].apply(&patch);
                (state.notes[index].clone(), index as u32)
            })
        };
        let Some((note, position)) = snapshot else {
            info!("event=note_update_skipped module=store note={id} reason=not_found");
            return;
        };

        let Some(sync) = self.sync_manager() else {
            error!("event=sync_manager_missing module=store op=update_note");
            return;
        };
        match sync.persist(WriteOp::UpsertNote { note: note.clone(), position }).await {
            Ok(()) => self.bus.publish(&Event::NoteUpdated(note)),
            Err(err) => {
                error!("event=persist_failed module=store record=note:{id} error={err}");
                self.bus.publish(&Event::SaveFailed(id));
            }
        }
    }

    /// Removes one note and persists the removal.
    ///
    /// Clears and persists `active_note_id` when the removed note was
    /// active. Together with the benign-race rule in `update_note` and
    /// the sync layer's delete supersession, a pending debounced write
    /// can never resurrect the record.
    pub async fn delete_note(&self, id: NoteId) {
        let removed = {
            let mut state = self.lock();
            let found = state.notes.iter().position(|note| note.id == id);
            found.map(|index| {
                state.notes.remove(index);
                let was_active = state.active_note_id == Some(id);
                if was_active {
                    state.active_note_id = None;
                }
                (state.order(), was_active.then(|| state.preferences()))
            })
        };
        let Some((order, cleared_preferences)) = removed else {
            info!("event=note_delete_skipped module=store note={id} reason=not_found");
            return;
        };
        info!("event=note_deleted module=store note={id}");

        let Some(sync) = self.sync_manager() else {
            error!("event=sync_manager_missing module=store op=delete_note");
            return;
        };
        if let Err(err) = sync.persist(WriteOp::DeleteNote { id }).await {
            error!("event=persist_failed module=store record=note:{id} error={err}");
        }
        if let Err(err) = sync.persist(WriteOp::WriteOrder(order)).await {
            error!("event=persist_failed module=store record=order error={err}");
        }
        if let Some(preferences) = cleared_preferences {
            if let Err(err) = sync.persist(WriteOp::WritePreferences(preferences)).await {
                error!("event=persist_failed module=store record=preferences error={err}");
            }
        }
    }

    /// Moves one note to an explicit position.
    ///
    /// Idempotent at the boundaries: moving the first note up (or to
    /// the top) is a silent no-op, not an error. `updated_at` is not
    /// touched; reordering is not a content mutation.
    pub async fn move_note(&self, id: NoteId, direction: MoveDirection) {
        let order = {
            let mut state = self.lock();
            let Some(index) = state.notes.iter().position(|note| note.id == id) else {
                info!("event=note_move_skipped module=store note={id} reason=not_found");
                return;
            };
            let last = state.notes.len() - 1;
            let target = match direction {
                MoveDirection::Top => 0,
                MoveDirection::Up => index.saturating_sub(1),
                MoveDirection::Down => (index + 1).min(last),
                MoveDirection::Bottom => last,
            };
            if target == index {
                return;
            }
            let note = state.notes.remove(index);
            state.notes.insert(target, note);
            state.order()
        };

        let Some(sync) = self.sync_manager() else {
            error!("event=sync_manager_missing module=store op=move_note");
            return;
        };
        if let Err(err) = sync.persist(WriteOp::WriteOrder(order)).await {
            error!("event=persist_failed module=store record=order error={err}");
        }
    }

    /// Changes the active-note reference and persists preferences.
    ///
    /// An id that does not resolve to a present note is ignored with a
    /// log line; the dangling-reference invariant is never violated by
    /// this path.
    pub async fn set_active_note(&self, id: Option<NoteId>) {
        let preferences = {
            let mut state = self.lock();
            if let Some(target) = id {
                if !state.notes.iter().any(|note| note.id == target) {
                    info!("event=note_select_skipped module=store note={target} reason=not_found");
                    return;
                }
            }
            if state.active_note_id == id {
                return;
            }
            state.active_note_id = id;
            state.preferences()
        };
        self.persist_preferences(preferences).await;
    }

    pub fn is_sidebar_collapsed(&self) -> bool {
        self.lock().sidebar_collapsed
    }

    /// Independent preference write; no ordering tie to note writes.
    pub async fn set_sidebar_collapsed(&self, collapsed: bool) {
        let preferences = {
            let mut state = self.lock();
            if state.sidebar_collapsed == collapsed {
                return;
            }
            state.sidebar_collapsed = collapsed;
            state.preferences()
        };
        self.persist_preferences(preferences).await;
    }

    /// Snapshot of the ordered note sequence.
    pub fn notes(&self) -> Vec<Note> {
        self.lock().notes.clone()
    }

    /// Snapshot of one note.
    pub fn note(&self, id: NoteId) -> Option<Note> {
        self.lock().notes.iter().find(|note| note.id == id).cloned()
    }

    pub fn active_note_id(&self) -> Option<NoteId> {
        self.lock().active_note_id
    }

    /// Case-insensitive substring filter over title and content.
    pub fn search_notes(&self, query: &str) -> Vec<Note> {
        filter_notes(&self.lock().notes, query)
    }

    async fn persist_preferences(&self, preferences: Preferences) {
        let Some(sync) = self.sync_manager() else {
            error!("event=sync_manager_missing module=store op=persist_preferences");
            return;
        };
        if let Err(err) = sync.persist(WriteOp::WritePreferences(preferences)).await {
            error!("event=persist_failed module=store record=preferences error={err}");
        }
    }

    fn sync_manager(&self) -> Option<Arc<SyncManager>> {
        self.sync.get().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
