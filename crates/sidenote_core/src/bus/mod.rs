//! In-process synchronous publish/subscribe dispatcher.
//!
//! # Responsibility
//! - Decouple independently-rendered UI regions from the store.
//! - Dispatch events synchronously in subscriber registration order.
//!
//! # Invariants
//! - A panicking handler never prevents later handlers from running.
//! - Dispatch matches the exact topic only; no wildcards, no priorities.
//! - Subscriptions are purely in-memory; nothing survives a restart.

use crate::model::note::{Note, NoteId};
use log::warn;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Every event the core and its collaborators exchange.
///
/// A closed union instead of free-form topic strings, so handler
/// dispatch is exhaustive at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// User asked for a new note (toolbar button, collapsed-rail button).
    NoteCreate,
    /// User picked a note in the list; the editor must flush first.
    NoteSelect(NoteId),
    /// User asked to delete a note; confirmation happens outside core.
    NoteDeleteRequest(Note),
    /// A note's durable record was committed with this value.
    NoteUpdated(Note),
    /// A debounced flush finished; drives the ephemeral saved indicator.
    SaveComplete,
    /// Persistence retries for this note were exhausted.
    SaveFailed(NoteId),
    SearchExpand,
    SearchCollapse,
    SearchChange(String),
    SidebarExpandRequest,
    SidebarCollapseRequest,
}

/// Fieldless discriminant of [`Event`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    NoteCreate,
    NoteSelect,
    NoteDeleteRequest,
    NoteUpdated,
    SaveComplete,
    SaveFailed,
    SearchExpand,
    SearchCollapse,
    SearchChange,
    SidebarExpandRequest,
    SidebarCollapseRequest,
}

impl Topic {
    /// Wire name of the topic, kept for log lines and diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoteCreate => "note:create",
            Self::NoteSelect => "note:select",
            Self::NoteDeleteRequest => "note:delete-request",
            Self::NoteUpdated => "note-updated",
            Self::SaveComplete => "save:complete",
            Self::SaveFailed => "save:failed",
            Self::SearchExpand => "search:expand",
            Self::SearchCollapse => "search:collapse",
            Self::SearchChange => "search:change",
            Self::SidebarExpandRequest => "sidebar:expand-request",
            Self::SidebarCollapseRequest => "sidebar:collapse-request",
        }
    }
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Self::NoteCreate => Topic::NoteCreate,
            Self::NoteSelect(_) => Topic::NoteSelect,
            Self::NoteDeleteRequest(_) => Topic::NoteDeleteRequest,
            Self::NoteUpdated(_) => Topic::NoteUpdated,
            Self::SaveComplete => Topic::SaveComplete,
            Self::SaveFailed(_) => Topic::SaveFailed,
            Self::SearchExpand => Topic::SearchExpand,
            Self::SearchCollapse => Topic::SearchCollapse,
            Self::SearchChange(_) => Topic::SearchChange,
            Self::SidebarExpandRequest => Topic::SidebarExpandRequest,
            Self::SidebarCollapseRequest => Topic::SidebarCollapseRequest,
        }
    }
}

type Handler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Handle returned by [`EventBus::subscribe`]; pass it back to
/// [`EventBus::unsubscribe`] to stop receiving the topic.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    id: u64,
}

#[derive(Default)]
struct BusState {
    next_id: u64,
    handlers: HashMap<Topic, Vec<(u64, Handler)>>,
}

/// Synchronous in-process event dispatcher.
///
/// One instance per session, constructed at startup and passed by
/// reference into each component; never a process-wide global.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusState>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one topic.
    ///
    /// Handlers run synchronously on the publishing call, in the order
    /// they were registered.
    pub fn subscribe(
        &self,
        topic: Topic,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Subscription {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state
            .handlers
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription { topic, id }
    }

    /// Removes one previously registered handler.
    ///
    /// A handle whose handler is already gone (after `clear`) is a
    /// silent no-op.
    pub fn unsubscribe(&self, subscription: Subscription) {
        let mut state = self.lock();
        if let Some(entries) = state.handlers.get_mut(&subscription.topic) {
            entries.retain(|(id, _)| *id != subscription.id);
        }
    }

    /// Dispatches one event to every handler of its topic.
    ///
    /// Dispatch runs against a snapshot of the subscriber list, so a
    /// handler may subscribe or unsubscribe reentrantly without
    /// invalidating the current delivery. A panicking handler is
    /// isolated and logged; remaining handlers still run.
    pub fn publish(&self, event: &Event) {
        let topic = event.topic();
        let snapshot: Vec<Handler> = {
            let state = self.lock();
            state
                .handlers
                .get(&topic)
                .map(|entries| entries.iter().map(|(_, handler)| handler.clone()).collect())
                .unwrap_or_default()
        };

        for handler in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(
                    "event=bus_handler_panicked module=bus topic={} status=isolated",
                    topic.as_str()
                );
            }
        }
    }

    /// Drops every subscription. Used at session teardown and test reset.
    pub fn clear(&self) {
        self.lock().handlers.clear();
    }

    /// Number of handlers currently registered for one topic.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lock()
            .handlers
            .get(&topic)
            .map_or(0, |entries| entries.len())
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        // The lock is never held while user handlers run, so a poisoned
        // state is still structurally sound.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
