//! State shared between the engine, its polling loop and observers.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use pollchat_core::{ChatMessage, ConversationKey, MessageLog, PresenceRoster, UnreadTracker, User};
use serde::Serialize;
use tokio::sync::broadcast;

/// Change notification emitted after the matching snapshot was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A new roster snapshot is available.
    RosterUpdated { online: usize, total: usize },
    /// Messages were appended to the log.
    MessagesAppended { count: usize },
    /// The unread set changed.
    UnreadChanged,
    /// Login or logout completed.
    SessionChanged { authenticated: bool },
}

struct Guarded {
    unread: UnreadTracker,
    /// Bumped on every session reset; writers holding an older value are stale.
    epoch: u64,
}

/// Roster, message log and unread set owned by one engine.
pub struct SharedState {
    roster: PresenceRoster,
    log: MessageLog,
    guard: Mutex<Guarded>,
    events: broadcast::Sender<EngineEvent>,
}

impl SharedState {
    #[must_use]
    pub fn new(event_buffer: usize) -> Arc<Self> {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Arc::new(Self {
            roster: PresenceRoster::new(),
            log: MessageLog::new(),
            guard: Mutex::new(Guarded {
                unread: UnreadTracker::new(),
                epoch: 0,
            }),
            events,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Guarded> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Append messages written during `epoch`.
    ///
    /// Returns false, leaving state untouched, if the session has been reset
    /// since.
    pub fn append(&self, epoch: u64, messages: Vec<ChatMessage>) -> bool {
        if messages.is_empty() {
            return true;
        }
        let count = messages.len();
        let unread_changed = {
            let mut guard = self.lock();
            if guard.epoch != epoch {
                return false;
            }
            let changed = guard.unread.observe(&messages);
            self.log.append_batch(messages);
            changed
        };
        self.emit(EngineEvent::MessagesAppended { count });
        if unread_changed {
            self.emit(EngineEvent::UnreadChanged);
        }
        true
    }

    /// Replace the roster snapshot, excluding `me`. Same staleness rule as
    /// [`Self::append`].
    pub fn publish_roster(&self, epoch: u64, roster: Vec<User>, me: &str) -> bool {
        let online = roster.iter().filter(|u| u.is_online && u.username != me).count();
        {
            let guard = self.lock();
            if guard.epoch != epoch {
                return false;
            }
            self.roster.publish(roster, Some(me));
        }
        let total = self.roster.snapshot().len();
        self.emit(EngineEvent::RosterUpdated { online, total });
        true
    }

    pub fn select(&self, key: ConversationKey) {
        let changed = self.lock().unread.select(key);
        if changed {
            self.emit(EngineEvent::UnreadChanged);
        }
    }

    /// Drop all session data and invalidate in-flight writers.
    ///
    /// Returns the new epoch.
    pub fn reset(&self) -> u64 {
        let mut guard = self.lock();
        guard.epoch += 1;
        guard.unread.clear();
        self.log.clear();
        self.roster.clear();
        guard.epoch
    }

    #[must_use]
    pub fn roster(&self) -> Arc<Vec<User>> {
        self.roster.snapshot()
    }

    #[must_use]
    pub fn online_peers(&self, me: &str) -> Vec<String> {
        self.roster.online_peers(me)
    }

    #[must_use]
    pub const fn log(&self) -> &MessageLog {
        &self.log
    }

    #[must_use]
    pub fn unread(&self) -> BTreeSet<ConversationKey> {
        self.lock().unread.snapshot()
    }

    #[must_use]
    pub fn selected(&self) -> Option<ConversationKey> {
        self.lock().unread.selected().cloned()
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}
