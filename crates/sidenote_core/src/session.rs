//! Session wiring: one bus, one store, one sync manager per session.
//!
//! # Responsibility
//! - Construct and bind the core objects at startup, explicitly, with
//!   no process-wide singletons.
//! - Wire the intent topics the side panel emits onto store/editor
//!   operations.
//!
//! # Invariants
//! - `Session::start` runs store initialization exactly once.
//! - Shutdown flushes the editing surface before dropping subscriptions.

use crate::bus::{Event, EventBus, Subscription, Topic};
use crate::db::DbError;
use crate::editor::{EditorSession, DEBOUNCE_WINDOW};
use crate::storage::SqliteStorage;
use crate::store::{Store, StoreError};
use crate::sync::{RetryPolicy, SyncManager};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Startup configuration; all knobs have working defaults.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Database file; `None` keeps the session in memory (tests, smoke).
    pub db_path: Option<PathBuf>,
    /// Idle window for the debounced edit pipeline.
    pub debounce: Duration,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            debounce: DEBOUNCE_WINDOW,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug)]
pub enum SessionError {
    Db(DbError),
    Store(StoreError),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<DbError> for SessionError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<StoreError> for SessionError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// One UI session's worth of core objects, explicitly owned.
pub struct Session {
    bus: Arc<EventBus>,
    store: Arc<Store>,
    sync: Arc<SyncManager>,
    editor: EditorSession,
    subscriptions: Vec<Subscription>,
}

impl Session {
    /// Builds, binds and initializes the core objects.
    ///
    /// Restores the previously active note into the editing surface
    /// after load, the way the panel re-opens where the user left off.
    pub async fn start(config: SessionConfig) -> Result<Self, SessionError> {
        let storage = match &config.db_path {
            Some(path) => SqliteStorage::open(path)?,
            None => SqliteStorage::open_in_memory()?,
        };

        let bus = Arc::new(EventBus::new());
        let sync = Arc::new(SyncManager::with_retry(Arc::new(storage), config.retry));
        let store = Arc::new(Store::new(bus.clone()));
        store.set_sync_manager(sync.clone());
        store.initialize().await?;

        let editor = EditorSession::with_window(store.clone(), bus.clone(), config.debounce);
        if let Some(active) = store.active_note_id() {
            editor.select_note(active).await;
        }

        let subscriptions = wire_intents(&bus, &store, &editor);

        Ok(Self {
            bus,
            store,
            sync,
            editor,
            subscriptions,
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn sync_manager(&self) -> &Arc<SyncManager> {
        &self.sync
    }

    pub fn editor(&self) -> &EditorSession {
        &self.editor
    }

    /// Flushes the editing surface and tears the wiring down.
    pub async fn shutdown(self) {
        self.editor.close().await;
        for subscription in self.subscriptions {
            self.bus.unsubscribe(subscription);
        }
        self.bus.clear();
    }
}

/// Subscribes the core-side handlers for the panel's intent topics.
///
/// Handlers run on the synchronous dispatch path, so mutations are
/// handed to spawned tasks rather than awaited inside the handler.
fn wire_intents(
    bus: &Arc<EventBus>,
    store: &Arc<Store>,
    editor: &EditorSession,
) -> Vec<Subscription> {
    let mut subscriptions = Vec::new();

    // New-note intent: create at the head, then focus it.
    {
        let store = store.clone();
        let editor = editor.clone();
        subscriptions.push(bus.subscribe(Topic::NoteCreate, move |_| {
            let note = store.create_note();
            let editor = editor.clone();
            tokio::spawn(async move {
                editor.select_note(note.id).await;
            });
        }));
    }

    // Selection intent: flush-before-switch runs inside the editor.
    {
        let editor = editor.clone();
        subscriptions.push(bus.subscribe(Topic::NoteSelect, move |event| {
            if let Event::NoteSelect(id) = event {
                let editor = editor.clone();
                let id = *id;
                tokio::spawn(async move {
                    editor.select_note(id).await;
                });
            }
        }));
    }

    // Sidebar preference intents.
    {
        let store = store.clone();
        subscriptions.push(bus.subscribe(Topic::SidebarExpandRequest, move |_| {
            let store = store.clone();
            tokio::spawn(async move {
                store.set_sidebar_collapsed(false).await;
            });
        }));
    }
    {
        let store = store.clone();
        subscriptions.push(bus.subscribe(Topic::SidebarCollapseRequest, move |_| {
            let store = store.clone();
            tokio::spawn(async move {
                store.set_sidebar_collapsed(true).await;
            });
        }));
    }

    // Expanding the search bar auto-expands a collapsed sidebar.
    {
        let store = store.clone();
        subscriptions.push(bus.subscribe(Topic::SearchExpand, move |_| {
            let store = store.clone();
            tokio::spawn(async move {
                store.set_sidebar_collapsed(false).await;
            });
        }));
    }

    subscriptions
}
