//! Message list of the open conversation.
//!
//! REST history and pushed frames can arrive in any order and can overlap.
//! The list keeps one entry per server id and stays sorted by timestamp
//! whatever the arrival order.

use std::collections::HashSet;

use campusnet_shared::{ChatMessage, Message};

/// Messages of one conversation, sorted by timestamp ascending.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConversationMessages {
    ids: HashSet<i64>,
    messages: Vec<ChatMessage>,
}

impl ConversationMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message, maintaining sort order by timestamp. Messages with equal
    /// timestamps keep their arrival order.
    /// Returns false if a message with the same id already exists.
    pub fn insert(&mut self, msg: ChatMessage) -> bool {
        if !self.ids.insert(msg.id) {
            return false;
        }
        let pos = self
            .messages
            .partition_point(|m| m.timestamp <= msg.timestamp);
        self.messages.insert(pos, msg);
        true
    }

    /// Merge a REST snapshot. Messages already held, pushed ones included,
    /// are kept. Returns how many messages were new.
    pub fn hydrate<'a>(&mut self, history: impl IntoIterator<Item = &'a Message>) -> usize {
        history
            .into_iter()
            .map(ChatMessage::from)
            .filter(|msg| self.insert(msg.clone()))
            .count()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    /// Forget everything, e.g. when another conversation is opened.
    pub fn clear(&mut self) {
        self.ids.clear();
        self.messages.clear();
    }
}
