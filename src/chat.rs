//! Two-party, per-case conversations.
//!
//! Conversation identity is deterministic: derived from the case id and the
//! sorted participant pair. Looking up and creating are therefore the same
//! operation, and two devices resolving the same pair independently arrive
//! at the same conversation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::model::{AlertId, UnixTimeMs, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Derives the id from the case and the participant pair. Participant
    /// order does not matter; the pair is sorted before hashing.
    #[must_use]
    pub fn derive(alert_id: &AlertId, a: &UserId, b: &UserId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };

        let mut hasher = blake3::Hasher::new();
        hasher.update(b"conversation.v1");
        hasher.update(&[0]);
        hasher.update(alert_id.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(first.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(second.as_str().as_bytes());

        Self(hasher.finalize().to_hex().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: UserId,
    pub kind: MessageKind,
    /// Text body for `Text`, blob URI for `Image` and `File`.
    pub payload: String,
    pub sent_at: UnixTimeMs,
}

impl Message {
    #[must_use]
    pub fn preview(&self) -> String {
        match self.kind {
            MessageKind::Text => self.payload.clone(),
            MessageKind::Image => "Photo".into(),
            MessageKind::File => "File".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub sender: UserId,
    pub preview: String,
    pub sent_at: UnixTimeMs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub alert_id: AlertId,
    /// Sorted pair.
    pub participants: (UserId, UserId),
    pub messages: Vec<Message>,
    pub last_message: Option<LastMessage>,
    /// Per-participant read horizon. Unread counts are computed from this
    /// on demand, never stored.
    pub last_read: HashMap<UserId, UnixTimeMs>,
}

impl Conversation {
    #[must_use]
    pub fn new(alert_id: AlertId, a: UserId, b: UserId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            id: ConversationId::derive(&alert_id, &first, &second),
            alert_id,
            participants: (first, second),
            messages: Vec::new(),
            last_message: None,
            last_read: HashMap::new(),
        }
    }

    #[must_use]
    pub fn involves(&self, user: &UserId) -> bool {
        &self.participants.0 == user || &self.participants.1 == user
    }

    #[must_use]
    pub fn other_participant(&self, user: &UserId) -> Option<&UserId> {
        if &self.participants.0 == user {
            Some(&self.participants.1)
        } else if &self.participants.1 == user {
            Some(&self.participants.0)
        } else {
            None
        }
    }

    /// Appends a message and refreshes the last-message cache. Messages are
    /// append-only; there is no edit or delete.
    pub fn append(&mut self, message: Message) {
        self.last_message = Some(LastMessage {
            sender: message.sender.clone(),
            preview: message.preview(),
            sent_at: message.sent_at,
        });
        self.messages.push(message);
    }

    /// Messages from the other party newer than the reader's read horizon.
    #[must_use]
    pub fn unread_count(&self, reader: &UserId) -> usize {
        let horizon = self.last_read.get(reader).copied().unwrap_or(UnixTimeMs(0));
        self.messages
            .iter()
            .filter(|m| &m.sender != reader && m.sent_at > horizon)
            .count()
    }

    /// Called when the reader opens the conversation.
    pub fn mark_read(&mut self, reader: &UserId, now: UnixTimeMs) {
        let entry = self.last_read.entry(reader.clone()).or_insert(UnixTimeMs(0));
        if now > *entry {
            *entry = now;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationDirectory {
    conversations: HashMap<ConversationId, Conversation>,
}

impl ConversationDirectory {
    #[must_use]
    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn get_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    /// Deterministic lookup-or-create. Repeating the call with the same case
    /// and pair, in any order, always lands on the same conversation.
    pub fn lookup_or_create(
        &mut self,
        alert_id: &AlertId,
        a: &UserId,
        b: &UserId,
    ) -> &mut Conversation {
        let id = ConversationId::derive(alert_id, a, b);
        self.conversations
            .entry(id)
            .or_insert_with(|| Conversation::new(alert_id.clone(), a.clone(), b.clone()))
    }

    /// Replaces a conversation with the server's copy, keeping the local
    /// read horizon when the server does not know it.
    pub fn merge(&mut self, mut incoming: Conversation) {
        if let Some(existing) = self.conversations.get(&incoming.id) {
            for (user, horizon) in &existing.last_read {
                let entry = incoming
                    .last_read
                    .entry(user.clone())
                    .or_insert(UnixTimeMs(0));
                if *horizon > *entry {
                    *entry = *horizon;
                }
            }
        }
        self.conversations.insert(incoming.id.clone(), incoming);
    }

    #[must_use]
    pub fn for_user(&self, user: &UserId) -> Vec<&Conversation> {
        let mut list: Vec<&Conversation> = self
            .conversations
            .values()
            .filter(|c| c.involves(user))
            .collect();
        list.sort_by(|a, b| {
            let at = a.last_message.as_ref().map(|m| m.sent_at);
            let bt = b.last_message.as_ref().map(|m| m.sent_at);
            bt.cmp(&at)
        });
        list
    }

    #[must_use]
    pub fn total_unread(&self, reader: &UserId) -> usize {
        self.conversations
            .values()
            .filter(|c| c.involves(reader))
            .map(|c| c.unread_count(reader))
            .sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}
