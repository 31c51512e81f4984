//! Append-only chat log with live growth notifications.

use std::sync::{PoisonError, RwLock};

use futures::{StreamExt, future};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{ChatMessage, ConversationKey};

/// Capacity of the growth notification channel.
const LOG_EVENT_CAPACITY: usize = 1024;

/// Change to the log, as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// Messages appended in one atomic step, in log order.
    Appended(Vec<ChatMessage>),
    /// The log was emptied (logout).
    Cleared,
}

/// Insertion-ordered message log.
///
/// Every append is all-or-nothing and never reorders existing entries.
/// Readers only ever receive cloned snapshots.
pub struct MessageLog {
    entries: RwLock<Vec<ChatMessage>>,
    sender: broadcast::Sender<LogEvent>,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(LOG_EVENT_CAPACITY);
        Self {
            entries: RwLock::new(Vec::with_capacity(64)),
            sender,
        }
    }

    /// Append one message.
    pub fn append(&self, message: ChatMessage) {
        self.append_batch(vec![message]);
    }

    /// Append several messages as one step, preserving their order.
    pub fn append_batch(&self, messages: Vec<ChatMessage>) {
        if messages.is_empty() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.extend(messages.iter().cloned());
        // Sent under the lock so subscribers see appends in log order.
        let _ = self.sender.send(LogEvent::Appended(messages));
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(entries = entries.len(), "clearing message log");
        entries.clear();
        let _ = self.sender.send(LogEvent::Cleared);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full log in order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Messages shown for `key`, in log order.
    ///
    /// `Everyone` selects broadcast messages; a peer key selects every message
    /// where that peer is the sender or the addressed recipient.
    #[must_use]
    pub fn filter(&self, key: &ConversationKey) -> Vec<ChatMessage> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|message| match key {
                ConversationKey::Everyone => {
                    message.conversation_key() == ConversationKey::Everyone
                }
                ConversationKey::Peer(peer) => message.involves(peer),
            })
            .cloned()
            .collect()
    }

    /// Receiver for live log changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.sender.subscribe()
    }

    /// Stream that yields the current log, then live appends until cleared.
    #[must_use]
    pub fn history_plus_stream(&self) -> futures::stream::BoxStream<'static, ChatMessage> {
        let (history, rx) = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            (entries.clone(), self.sender.subscribe())
        };

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx)
            .filter_map(|res| future::ready(res.ok()))
            .take_while(|event| future::ready(!matches!(event, LogEvent::Cleared)))
            .flat_map(|event| match event {
                LogEvent::Appended(messages) => futures::stream::iter(messages),
                LogEvent::Cleared => futures::stream::iter(Vec::new()),
            });

        hist.chain(live).boxed()
    }
}
