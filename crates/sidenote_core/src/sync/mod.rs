//! Sync layer between the in-memory store and durable storage.
//!
//! # Responsibility
//! - Load persisted state at session start.
//! - Commit record-level writes with bounded retry and backoff.
//! - Enforce the concurrent-write contract: at most one in-flight
//!   write per logical record, last-value-wins.
//!
//! # Invariants
//! - A write that completes while a newer write for the same record is
//!   pending re-commits the newer value; an older write never clobbers
//!   a newer one.
//! - A delete supersedes a pending upsert for the same note; a deleted
//!   record is never resurrected by an in-flight write.
//! - A failed persist is retried, then surfaced; it is never silently
//!   dropped and never panics the session.

use crate::model::note::{Note, NoteId, Preferences};
use crate::storage::{PersistedState, StorageBackend, StorageError, StorageResult};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub type SyncResult<T> = Result<T, SyncError>;

/// Sync-layer error for load and persist operations.
#[derive(Debug)]
pub enum SyncError {
    Storage(StorageError),
    /// Every retry attempt for one record failed.
    RetriesExhausted {
        key: RecordKey,
        attempts: u32,
        last: StorageError,
    },
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(err) => write!(f, "{err}"),
            Self::RetriesExhausted {
                key,
                attempts,
                last,
            } => write!(f, "giving up on {key} after {attempts} attempts: {last}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::RetriesExhausted { last, .. } => Some(last),
        }
    }
}

impl From<StorageError> for SyncError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

/// Identity of one logical durable record.
///
/// Each note is its own record; the list order and the preferences
/// record are each a single record of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Note(NoteId),
    Order,
    Preferences,
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Note(id) => write!(f, "note:{id}"),
            Self::Order => write!(f, "order"),
            Self::Preferences => write!(f, "preferences"),
        }
    }
}

/// One record-level write, carrying the full value to commit.
///
/// Callers must build the op from the current in-memory value at call
/// time; the coalescing below guarantees the latest op wins.
#[derive(Debug, Clone)]
pub enum WriteOp {
    UpsertNote { note: Note, position: u32 },
    DeleteNote { id: NoteId },
    WriteOrder(Vec<NoteId>),
    WritePreferences(Preferences),
}

impl WriteOp {
    pub fn key(&self) -> RecordKey {
        match self {
            Self::UpsertNote { note, .. } => RecordKey::Note(note.id),
            Self::DeleteNote { id } => RecordKey::Note(*id),
            Self::WriteOrder(_) => RecordKey::Order,
            Self::WritePreferences(_) => RecordKey::Preferences,
        }
    }
}

/// Bounded-retry policy for failing commits.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per commit, including the first. Minimum 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Default)]
struct PendingWrite {
    /// The newest op that arrived while this record was committing.
    superseded: Option<WriteOp>,
}

/// Adapter between the store and durable storage.
///
/// One instance per session, bound to the store before any
/// write-producing operation runs.
pub struct SyncManager {
    backend: Arc<dyn StorageBackend>,
    retry: RetryPolicy,
    in_flight: Mutex<HashMap<RecordKey, PendingWrite>>,
}

impl SyncManager {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self::with_retry(backend, RetryPolicy::default())
    }

    pub fn with_retry(backend: Arc<dyn StorageBackend>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Loads persisted state for store initialization.
    ///
    /// Single-attempt: at startup there is no in-memory authority yet,
    /// so the caller must see the failure rather than start empty over
    /// a database it would later clobber.
    pub async fn load(&self) -> SyncResult<PersistedState> {
        let state = self.backend.load()?;
        info!(
            "event=state_loaded module=sync notes={} status=ok",
            state.notes.len()
        );
        Ok(state)
    }

    /// Commits one record write, coalescing against in-flight writes.
    ///
    /// When the record already has a committing write, the op is stored
    /// as the record's newest pending value and this call returns
    /// immediately; the committing task re-commits that value once its
    /// current attempt settles. The returned result always describes
    /// the fate of the newest value for the record at the time the
    /// in-flight loop drained.
    pub async fn persist(&self, op: WriteOp) -> SyncResult<()> {
        let key = op.key();
        {
            let mut flights = self.lock();
            if let Some(pending) = flights.get_mut(&key) {
                pending.superseded = Some(op);
                debug!("event=persist_superseded module=sync record={key}");
                return Ok(());
            }
            flights.insert(key, PendingWrite::default());
        }

        let mut current = op;
        loop {
            let committed = self.commit_with_retry(&current).await;

            let next = {
                let mut flights = self.lock();
                match flights.get_mut(&key).and_then(|pending| pending.superseded.take()) {
                    Some(newer) => Some(newer),
                    None => {
                        flights.remove(&key);
                        None
                    }
                }
            };

            match next {
                Some(newer) => current = newer,
                None => return committed,
            }
        }
    }

    async fn commit_with_retry(&self, op: &WriteOp) -> SyncResult<()> {
        let key = op.key();
        let mut delay = self.retry.initial_delay;
        let mut attempt = 1u32;
        loop {
            match self.commit(op) {
                Ok(()) => {
                    debug!("event=record_committed module=sync record={key} attempts={attempt}");
                    return Ok(());
                }
                Err(err) if attempt >= self.retry.max_attempts => {
                    return Err(SyncError::RetriesExhausted {
                        key,
                        attempts: attempt,
                        last: err,
                    });
                }
                Err(err) => {
                    warn!(
                        "event=persist_retry module=sync record={key} attempt={attempt} error={err}"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.retry.max_delay);
                    attempt += 1;
                }
            }
        }
    }

    fn commit(&self, op: &WriteOp) -> StorageResult<()> {
        match op {
            WriteOp::UpsertNote { note, position } => self.backend.upsert_note(note, *position),
            WriteOp::DeleteNote { id } => self.backend.delete_note(*id),
            WriteOp::WriteOrder(ordered_ids) => self.backend.write_order(ordered_ids),
            WriteOp::WritePreferences(preferences) => self.backend.write_preferences(preferences),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RecordKey, PendingWrite>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
