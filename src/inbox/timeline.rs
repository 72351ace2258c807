//! Ordered, id-deduplicated message sequence for one conversation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::gateway::Message;

/// Messages sorted by `created_at` ascending, each id at most once.
///
/// Messages with equal timestamps keep their arrival order.
#[derive(Debug, Default, Clone)]
pub struct MessageTimeline {
    messages: Vec<Message>,
    ids: HashSet<Uuid>,
}

impl MessageTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with a fresh snapshot.
    pub fn replace(&mut self, snapshot: Vec<Message>) {
        self.clear();
        self.extend(snapshot);
    }

    /// Insert one message. Returns `false` if its id was already present.
    pub fn insert(&mut self, message: Message) -> bool {
        if !self.ids.insert(message.id) {
            return false;
        }
        let at = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(at, message);
        true
    }

    /// Insert many; returns the ones that were new.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) -> Vec<Message> {
        messages
            .into_iter()
            .filter(|m| self.insert(m.clone()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.ids.contains(&id)
    }

    pub fn latest_created_at(&self) -> Option<DateTime<Utc>> {
        self.messages.last().map(|m| m.created_at)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
