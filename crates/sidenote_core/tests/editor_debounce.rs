use sidenote_core::{
    EditorSession, Event, EventBus, Note, NoteId, PersistedState, Preferences, Store,
    StorageBackend, StorageResult, SyncManager, Topic,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend recording every committed write, so tests can count the
/// writes one edit cycle produces.
#[derive(Default)]
struct RecordingBackend {
    state: Mutex<RecordingState>,
}

#[derive(Default)]
struct RecordingState {
    upserts: Vec<Note>,
    notes: HashMap<NoteId, Note>,
}

impl RecordingBackend {
    fn upsert_count(&self, id: NoteId) -> usize {
        self.state
            .lock()
            .unwrap()
            .upserts
            .iter()
            .filter(|note| note.id == id)
            .count()
    }

    fn stored(&self, id: NoteId) -> Option<Note> {
        self.state.lock().unwrap().notes.get(&id).cloned()
    }
}

impl StorageBackend for RecordingBackend {
    fn load(&self) -> StorageResult<PersistedState> {
        Ok(PersistedState::default())
    }

    fn upsert_note(&self, note: &Note, _position: u32) -> StorageResult<()> {
        let mut state = self.state.lock().unwrap();
        state.upserts.push(note.clone());
        state.notes.insert(note.id, note.clone());
        Ok(())
    }

    fn delete_note(&self, id: NoteId) -> StorageResult<()> {
        self.state.lock().unwrap().notes.remove(&id);
        Ok(())
    }

    fn write_order(&self, _ordered_ids: &[NoteId]) -> StorageResult<()> {
        Ok(())
    }

    fn write_preferences(&self, _preferences: &Preferences) -> StorageResult<()> {
        Ok(())
    }
}

async fn harness() -> (Arc<EventBus>, Arc<Store>, EditorSession, Arc<RecordingBackend>) {
    let bus = Arc::new(EventBus::new());
    let backend = Arc::new(RecordingBackend::default());
    let sync = Arc::new(SyncManager::new(backend.clone()));
    let store = Arc::new(Store::new(bus.clone()));
    store.set_sync_manager(sync);
    store.initialize().await.unwrap();
    let editor = EditorSession::with_window(store.clone(), bus.clone(), Duration::from_secs(1));
    (bus, store, editor, backend)
}

/// Lets fire-and-forget persistence tasks run on the test runtime.
async fn drain_spawned_tasks() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn edits_within_one_window_coalesce_into_a_single_write() {
    let (_bus, store, editor, backend) = harness().await;
    let note = store.create_note();
    drain_spawned_tasks().await;
    editor.select_note(note.id).await;
    let baseline = backend.upsert_count(note.id);

    editor.edit_title("Hello");
    editor.edit_content("World");
    tokio::time::sleep(Duration::from_millis(1100)).await;
    drain_spawned_tasks().await;

    assert_eq!(backend.upsert_count(note.id), baseline + 1);
    let stored = backend.stored(note.id).unwrap();
    assert_eq!(stored.title, "Hello");
    assert_eq!(stored.content, "World");
}

#[tokio::test(start_paused = true)]
async fn every_edit_restarts_the_idle_window() {
    let (_bus, store, editor, backend) = harness().await;
    let note = store.create_note();
    drain_spawned_tasks().await;
    editor.select_note(note.id).await;
    let baseline = backend.upsert_count(note.id);

    editor.edit_title("draft");
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(backend.upsert_count(note.id), baseline);
    assert!(editor.has_pending());

    // A second edit 700ms in pushes the deadline out.
    editor.edit_content("more");
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(backend.upsert_count(note.id), baseline);

    tokio::time::sleep(Duration::from_millis(400)).await;
    drain_spawned_tasks().await;
    assert_eq!(backend.upsert_count(note.id), baseline + 1);
    let stored = backend.stored(note.id).unwrap();
    assert_eq!(stored.title, "draft");
    assert_eq!(stored.content, "more");
    assert!(!editor.has_pending());
}

#[tokio::test(start_paused = true)]
async fn switching_notes_flushes_pending_changes_first() {
    let (_bus, store, editor, backend) = harness().await;
    let a = store.create_note();
    let b = store.create_note();
    drain_spawned_tasks().await;

    editor.select_note(a.id).await;
    editor.edit_content("draft for A");
    editor.select_note(b.id).await;

    // A's durable record reflects the edit before B is active anywhere.
    assert_eq!(backend.stored(a.id).unwrap().content, "draft for A");
    assert_eq!(store.active_note_id(), Some(b.id));
    assert_eq!(editor.note_id(), Some(b.id));
    assert!(!editor.has_pending());

    // The aborted timer never produces a second write for A.
    let count = backend.upsert_count(a.id);
    tokio::time::sleep(Duration::from_secs(2)).await;
    drain_spawned_tasks().await;
    assert_eq!(backend.upsert_count(a.id), count);
}

#[tokio::test(start_paused = true)]
async fn deleting_the_edited_note_discards_the_pending_write() {
    let (_bus, store, editor, backend) = harness().await;
    let note = store.create_note();
    drain_spawned_tasks().await;
    editor.select_note(note.id).await;

    editor.edit_title("doomed");
    store.delete_note(note.id).await;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    drain_spawned_tasks().await;

    // The debounced write fired into a benign no-op; nothing came back.
    assert!(store.note(note.id).is_none());
    assert!(backend.stored(note.id).is_none());
    assert_eq!(backend.upsert_count(note.id), 1); // the creation write only
}

#[tokio::test(start_paused = true)]
async fn debounced_flush_publishes_save_complete() {
    let (bus, store, editor, _backend) = harness().await;
    let note = store.create_note();
    drain_spawned_tasks().await;
    editor.select_note(note.id).await;

    let saves = Arc::new(Mutex::new(0u32));
    let counter = saves.clone();
    bus.subscribe(Topic::SaveComplete, move |event| {
        assert_eq!(*event, Event::SaveComplete);
        *counter.lock().unwrap() += 1;
    });

    editor.edit_title("saved");
    tokio::time::sleep(Duration::from_millis(1100)).await;
    drain_spawned_tasks().await;
    assert_eq!(*saves.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn explicit_flush_commits_immediately_and_disarms_the_timer() {
    let (bus, store, editor, backend) = harness().await;
    let note = store.create_note();
    drain_spawned_tasks().await;
    editor.select_note(note.id).await;

    let saves = Arc::new(Mutex::new(0u32));
    let counter = saves.clone();
    bus.subscribe(Topic::SaveComplete, move |_| {
        *counter.lock().unwrap() += 1;
    });

    editor.edit_title("right now");
    editor.flush_pending().await;
    assert_eq!(backend.stored(note.id).unwrap().title, "right now");
    assert_eq!(*saves.lock().unwrap(), 1);

    // The disarmed timer does not flush a second time.
    tokio::time::sleep(Duration::from_secs(2)).await;
    drain_spawned_tasks().await;
    assert_eq!(*saves.lock().unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn edits_without_a_bound_note_are_dropped() {
    let (_bus, _store, editor, backend) = harness().await;

    editor.edit_title("orphan");
    assert!(!editor.has_pending());

    tokio::time::sleep(Duration::from_secs(2)).await;
    drain_spawned_tasks().await;
    assert!(backend.state.lock().unwrap().upserts.is_empty());
}

#[tokio::test(start_paused = true)]
async fn closing_the_editing_surface_flushes_pending_changes() {
    let (_bus, store, editor, backend) = harness().await;
    let note = store.create_note();
    drain_spawned_tasks().await;
    editor.select_note(note.id).await;

    editor.edit_content("written at close");
    editor.close().await;

    assert_eq!(backend.stored(note.id).unwrap().content, "written at close");
    assert_eq!(editor.note_id(), None);
}
