//! Tracks conversations with activity the user has not looked at.

use std::collections::BTreeSet;

use crate::{ChatMessage, ConversationKey};

/// Selected conversation plus the set of keys with unseen messages.
///
/// The selected key is never a member of the unread set. A fresh tracker
/// has the everyone conversation selected.
#[derive(Debug, Clone)]
pub struct UnreadTracker {
    selected: Option<ConversationKey>,
    unread: BTreeSet<ConversationKey>,
}

impl Default for UnreadTracker {
    fn default() -> Self {
        Self {
            selected: Some(ConversationKey::Everyone),
            unread: BTreeSet::new(),
        }
    }
}

impl UnreadTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record newly appended messages. Returns true if the set grew.
    pub fn observe(&mut self, messages: &[ChatMessage]) -> bool {
        let mut changed = false;
        for message in messages.iter().filter(|m| !m.is_local()) {
            let key = message.conversation_key();
            if self.selected.as_ref() != Some(&key) {
                changed |= self.unread.insert(key);
            }
        }
        changed
    }

    /// Switch the active conversation. Returns true if the set shrank.
    pub fn select(&mut self, key: ConversationKey) -> bool {
        let changed = self.unread.remove(&key);
        self.selected = Some(key);
        changed
    }

    #[must_use]
    pub fn selected(&self) -> Option<&ConversationKey> {
        self.selected.as_ref()
    }

    #[must_use]
    pub fn is_unread(&self, key: &ConversationKey) -> bool {
        self.unread.contains(key)
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeSet<ConversationKey> {
        self.unread.clone()
    }

    /// Back to the initial state: everyone selected, nothing unread.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
