//! Message ordering and the per-session transcript store.

use shared::protocol::{Message, StoredMessage};
use tracing::debug;

pub type Transcript = Vec<Message>;

/// Adds `incoming` to an ascending-by-`ts` transcript, keeping it ascending.
///
/// Equal timestamps keep arrival order: the new message lands after every
/// entry with the same `ts`. Nothing is deduplicated, so a redelivered
/// message shows up twice.
pub fn merge(mut existing: Transcript, incoming: Message) -> Transcript {
    let at = existing.partition_point(|message| message.ts <= incoming.ts);
    existing.insert(at, incoming);
    existing
}

/// Transcript for one session view. `None` until history arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptStore {
    messages: Option<Transcript>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.messages.is_some()
    }

    pub fn messages(&self) -> Option<&[Message]> {
        self.messages.as_deref()
    }

    pub fn len(&self) -> usize {
        self.messages.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.as_ref().and_then(|messages| messages.last())
    }

    /// Replaces whatever was held with the unwrapped history records.
    pub fn load(&mut self, history: Vec<StoredMessage>) -> &[Message] {
        let mut messages: Transcript = history.into_iter().map(|stored| stored.message).collect();
        messages.sort_by_key(|message| message.ts);
        self.messages.insert(messages)
    }

    pub fn append(&mut self, message: Message) {
        if self.messages.is_none() {
            debug!("history: live message arrived before history, starting empty transcript");
        }
        let messages = self.messages.take().unwrap_or_default();
        self.messages = Some(merge(messages, message));
    }

    pub fn clear(&mut self) {
        self.messages = None;
    }

    /// True when there is no last message or the human party sent it.
    pub fn sent_last_message(&self) -> bool {
        self.last().map_or(true, Message::is_incoming)
    }

    /// True when there is no last message or it carries the feedback flag.
    pub fn last_message_feedback(&self) -> bool {
        self.last().map_or(true, |message| message.is_feedback)
    }

    /// The human party is waiting: they spoke last, or the latest reply is
    /// not a feedback marker so more output is expected.
    pub fn busy(&self) -> bool {
        self.sent_last_message() || !self.last_message_feedback()
    }
}

#[cfg(test)]
#[path = "tests/transcript_tests.rs"]
mod tests;
