//! Core state store and synchronization layer for a note-taking side
//! panel: the authoritative in-memory model, the debounced persistence
//! pipeline and the publish/subscribe protocol that keeps independent
//! UI regions consistent. This crate is the single source of truth for
//! note and UI-state invariants.

pub mod bus;
pub mod db;
pub mod editor;
pub mod logging;
pub mod model;
pub mod search;
pub mod session;
pub mod storage;
pub mod store;
pub mod sync;

pub use bus::{Event, EventBus, Subscription, Topic};
pub use editor::{EditorSession, DEBOUNCE_WINDOW};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::note::{now_ms, Note, NoteId, NotePatch, Preferences};
pub use search::filter_notes;
pub use session::{Session, SessionConfig, SessionError};
pub use storage::{PersistedState, SqliteStorage, StorageBackend, StorageError, StorageResult};
pub use store::{MoveDirection, Store, StoreError};
pub use sync::{RecordKey, RetryPolicy, SyncError, SyncManager, SyncResult, WriteOp};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
