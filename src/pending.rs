//! In-flight operation registry.
//!
//! Every backend write is registered here with a deadline. The registry is
//! the single owner of the outcome: a timer tick expires overdue entries,
//! and a response whose operation id is no longer registered is dropped.
//! An operation resolves exactly once, never both ways.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::chat::ConversationId;
use crate::model::{AlertId, UnixTimeMs};
use crate::OPERATION_TIMEOUT;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpId(pub String);

impl OpId {
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    SubmitReport,
    ResolveCase { alert_id: AlertId },
    UpsertConversation { conversation_id: ConversationId },
    SendMessage { conversation_id: ConversationId },
}

impl OpKind {
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            Self::SubmitReport => "submit report",
            Self::ResolveCase { .. } => "resolve case",
            Self::UpsertConversation { .. } => "open conversation",
            Self::SendMessage { .. } => "send message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightOp {
    pub id: OpId,
    pub kind: OpKind,
    pub deadline: UnixTimeMs,
}

#[derive(Debug, Clone, Default)]
pub struct InFlightOps {
    ops: HashMap<OpId, InFlightOp>,
}

impl InFlightOps {
    /// Registers an operation and stamps its deadline.
    pub fn register(&mut self, kind: OpKind, now: UnixTimeMs) -> OpId {
        let id = OpId::generate();
        #[allow(clippy::cast_possible_truncation)]
        let deadline = UnixTimeMs(now.0 + OPERATION_TIMEOUT.as_millis() as u64);
        self.ops.insert(
            id.clone(),
            InFlightOp {
                id: id.clone(),
                kind,
                deadline,
            },
        );
        id
    }

    /// Claims the outcome for `id`. Returns `None` when the operation was
    /// never registered or already expired; the caller must then drop the
    /// response without applying it.
    pub fn resolve(&mut self, id: &OpId) -> Option<InFlightOp> {
        self.ops.remove(id)
    }

    /// Removes and returns every operation whose deadline has passed.
    pub fn expire(&mut self, now: UnixTimeMs) -> Vec<InFlightOp> {
        let overdue: Vec<OpId> = self
            .ops
            .values()
            .filter(|op| op.deadline <= now)
            .map(|op| op.id.clone())
            .collect();
        overdue
            .into_iter()
            .filter_map(|id| self.ops.remove(&id))
            .collect()
    }

    #[must_use]
    pub fn is_pending(&self, id: &OpId) -> bool {
        self.ops.contains_key(id)
    }

    #[must_use]
    pub fn pending_ids(&self) -> Vec<OpId> {
        self.ops.keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
