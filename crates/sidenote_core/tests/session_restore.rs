use sidenote_core::{
    EventBus, NotePatch, PersistedState, Preferences, Session, SessionConfig, SqliteStorage,
    Store, StorageBackend, StorageError, StorageResult, StoreError, SyncManager,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

fn config_for(path: PathBuf) -> SessionConfig {
    SessionConfig {
        db_path: Some(path),
        ..SessionConfig::default()
    }
}

/// Lets fire-and-forget persistence tasks run on the test runtime.
async fn drain_spawned_tasks() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn session_restores_notes_order_and_selection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sidenote.db");

    let session = Session::start(config_for(path.clone())).await.unwrap();
    let first = session.store().create_note();
    let second = session.store().create_note();
    drain_spawned_tasks().await;

    session.editor().select_note(second.id).await;
    session.editor().edit_title("second note");
    session.editor().flush_pending().await;
    session
        .store()
        .update_note(first.id, NotePatch::title("first note"))
        .await;
    session.shutdown().await;

    let restored = Session::start(config_for(path)).await.unwrap();
    let notes = restored.store().notes();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].title, "second note");
    assert_eq!(notes[1].title, "first note");
    assert_eq!(restored.store().active_note_id(), Some(second.id));
    assert_eq!(restored.editor().note_id(), Some(second.id));
    restored.shutdown().await;
}

#[tokio::test]
async fn deleted_note_stays_deleted_across_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sidenote.db");

    let session = Session::start(config_for(path.clone())).await.unwrap();
    let keeper = session.store().create_note();
    let goner = session.store().create_note();
    drain_spawned_tasks().await;

    session
        .store()
        .update_note(keeper.id, NotePatch::title("keeper"))
        .await;
    session.store().delete_note(goner.id).await;
    session.shutdown().await;

    let restored = Session::start(config_for(path)).await.unwrap();
    let notes = restored.store().notes();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id, keeper.id);
    restored.shutdown().await;
}

#[tokio::test]
async fn dangling_active_note_is_repaired_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sidenote.db");

    {
        let storage = SqliteStorage::open(&path).unwrap();
        let stale = Preferences {
            sidebar_collapsed: true,
            active_note_id: Some(Uuid::new_v4()),
        };
        storage.write_preferences(&stale).unwrap();
    }

    let session = Session::start(config_for(path.clone())).await.unwrap();
    assert_eq!(session.store().active_note_id(), None);
    assert!(session.store().is_sidebar_collapsed());
    session.shutdown().await;

    // The repair reached durable storage, not just memory.
    let reread = SqliteStorage::open(&path).unwrap();
    let state = reread.load().unwrap();
    assert_eq!(state.preferences.active_note_id, None);
    assert!(state.preferences.sidebar_collapsed);
}

/// Backend whose load fails until it is marked healthy.
struct FailingLoadBackend {
    healthy: AtomicBool,
}

impl FailingLoadBackend {
    fn new() -> Self {
        Self {
            healthy: AtomicBool::new(false),
        }
    }
}

impl StorageBackend for FailingLoadBackend {
    fn load(&self) -> StorageResult<PersistedState> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(PersistedState::default())
        } else {
            Err(StorageError::InvalidData("storage unavailable".to_string()))
        }
    }

    fn upsert_note(&self, _note: &sidenote_core::Note, _position: u32) -> StorageResult<()> {
        Ok(())
    }

    fn delete_note(&self, _id: sidenote_core::NoteId) -> StorageResult<()> {
        Ok(())
    }

    fn write_order(&self, _ordered_ids: &[sidenote_core::NoteId]) -> StorageResult<()> {
        Ok(())
    }

    fn write_preferences(&self, _preferences: &Preferences) -> StorageResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn initialize_surfaces_load_failure_and_allows_retry() {
    let backend = Arc::new(FailingLoadBackend::new());
    let store = Store::new(Arc::new(EventBus::new()));
    store.set_sync_manager(Arc::new(SyncManager::new(backend.clone())));

    let err = store.initialize().await.unwrap_err();
    assert!(matches!(err, StoreError::Sync(_)));

    // The initialization gate reopens after a failed load.
    backend.healthy.store(true, Ordering::SeqCst);
    store.initialize().await.unwrap();
}

#[tokio::test]
async fn initialize_without_sync_manager_is_rejected() {
    let store = Store::new(Arc::new(EventBus::new()));

    let err = store.initialize().await.unwrap_err();
    assert!(matches!(err, StoreError::SyncManagerMissing));
}
