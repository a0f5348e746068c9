use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Bot => "bot",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a record inside its transcript. Records are never removed, so
/// an id stays valid for the life of the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    id: RecordId,
    role: Role,
    text: String,
    pending: bool,
    at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

/// Append-only message history for one panel.
///
/// The only in-place edit is [`Transcript::resolve_last_pending`], which
/// finalizes the newest placeholder. Display order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    records: Vec<MessageRecord>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, role: Role, text: impl Into<String>) -> RecordId {
        self.push(role, text.into(), false)
    }

    pub fn append_pending(&mut self, role: Role, placeholder: impl Into<String>) -> RecordId {
        self.push(role, placeholder.into(), true)
    }

    /// Finalizes the most recently appended pending record. A transcript with
    /// nothing pending is left untouched and `None` is returned; late replies
    /// landing on a cleared panel take this path.
    pub fn resolve_last_pending(&mut self, text: impl Into<String>) -> Option<RecordId> {
        let record = self.records.iter_mut().rev().find(|record| record.pending)?;
        record.text = text.into();
        record.pending = false;
        Some(record.id)
    }

    pub fn records(&self) -> &[MessageRecord] {
        &self.records
    }

    pub fn get(&self, id: RecordId) -> Option<&MessageRecord> {
        self.records.get(id.0)
    }

    pub fn last(&self) -> Option<&MessageRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.records.iter().filter(|record| record.pending).count()
    }

    pub fn has_pending(&self) -> bool {
        self.records.iter().any(|record| record.pending)
    }

    fn push(&mut self, role: Role, text: String, pending: bool) -> RecordId {
        let id = RecordId(self.records.len());
        self.records.push(MessageRecord {
            id,
            role,
            text,
            pending,
            at: Utc::now(),
        });
        id
    }
}
