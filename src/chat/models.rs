//! The core models for managing a stateful chat with an LLM.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::TranscriptError;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry in a transcript. Content is opaque and never inspected
/// by the session.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
            timestamp: None,
        }
    }

    /// Same as `new` but stamped with the current time.
    pub fn now(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

/// Ordered messages of one conversation. Only the first message may
/// have the `system` role and it can't be added after the fact.
#[derive(Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Message>", into = "Vec<Message>")]
pub struct Transcript(Vec<Message>);

impl Transcript {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn with_system(prompt: &str) -> Self {
        Self(vec![Message::now(Role::System, prompt)])
    }

    pub fn new_with_messages(messages: Vec<Message>) -> Result<Self, TranscriptError> {
        let misplaced_system = messages
            .iter()
            .skip(1)
            .any(|m| m.role() == Role::System);
        if misplaced_system {
            return Err(TranscriptError::SystemMessageNotLeading);
        }
        Ok(Self(messages))
    }

    pub fn messages(&self) -> &[Message] {
        &self.0
    }

    pub fn system_message(&self) -> Option<&Message> {
        self.0.first().filter(|m| m.role() == Role::System)
    }

    pub fn push_user(&mut self, content: &str) -> &Message {
        self.0.push(Message::now(Role::User, content));
        &self.0[self.0.len() - 1]
    }

    pub fn push_assistant(&mut self, content: &str) -> &Message {
        self.0.push(Message::now(Role::Assistant, content));
        &self.0[self.0.len() - 1]
    }

    pub fn last(&self) -> Option<&Message> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True once anything other than the system message was added.
    pub fn has_conversation(&self) -> bool {
        self.0.iter().any(|m| m.role() != Role::System)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.0.iter()
    }
}

impl TryFrom<Vec<Message>> for Transcript {
    type Error = TranscriptError;

    fn try_from(messages: Vec<Message>) -> Result<Self, Self::Error> {
        Transcript::new_with_messages(messages)
    }
}

impl From<Transcript> for Vec<Message> {
    fn from(transcript: Transcript) -> Self {
        transcript.0
    }
}

/// Who a session belongs to. Only authenticated identities have a
/// stable handle and therefore a history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Identity {
    Guest,
    Authenticated { handle: String },
}

impl Identity {
    pub fn authenticated(handle: &str) -> Self {
        Identity::Authenticated {
            handle: handle.to_string(),
        }
    }

    pub fn handle(&self) -> Option<&str> {
        match self {
            Identity::Guest => None,
            Identity::Authenticated { handle } => Some(handle),
        }
    }

    pub fn is_guest(&self) -> bool {
        matches!(self, Identity::Guest)
    }
}

/// Identifies a durably saved transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub id: String,
    pub handle: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotRef,
    pub transcript: Transcript,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchHit {
    pub snapshot: SnapshotRef,
    pub message: Message,
}

/// Case insensitive substring match over message content. Roles and
/// metadata are never matched. A blank keyword matches nothing.
pub fn search_snapshots(snapshots: &[Snapshot], keyword: &str) -> Vec<SearchHit> {
    let needle = keyword.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    snapshots
        .iter()
        .flat_map(|snapshot| {
            snapshot
                .transcript
                .iter()
                .filter(|m| m.content().to_lowercase().contains(&needle))
                .map(|m| SearchHit {
                    snapshot: snapshot.meta.clone(),
                    message: m.clone(),
                })
        })
        .collect()
}
