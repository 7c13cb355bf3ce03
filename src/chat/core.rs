use uuid::Uuid;

use super::error::{ChatError, StorageError};
use super::models::{Identity, Message, SearchHit, Snapshot, Transcript};
use super::persona::Persona;
use super::provider::SharedProvider;
use super::store::SharedStore;

/// Result of a successful turn. A failed save never undoes the reply,
/// it is handed back as `warning` instead.
#[derive(Debug)]
pub struct Reply {
    pub message: Message,
    pub warning: Option<StorageError>,
}

/// One conversation with an LLM.
///
/// Owns the transcript for the session and decides when it gets
/// persisted:
/// - Guests are never persisted
/// - Authenticated sessions are saved after every successful reply
/// - Starting a new chat saves anything not yet saved, then resets
///
/// Use `Chat::builder()` to construct a valid `Chat`. Every mutating
/// operation takes `&mut self`, so a session can't have two turns in
/// flight at once.
pub struct Chat {
    provider: SharedProvider,
    store: Option<SharedStore>,
    identity: Identity,
    persona: Option<Persona>,
    transcript: Transcript,
    // Assigned lazily on the first save after a reset
    snapshot_id: Option<String>,
    // Transcript length as of the last save (or reset)
    saved_len: usize,
}

fn seed(persona: &Option<Persona>) -> Transcript {
    match persona {
        Some(p) => Transcript::with_system(p.system_prompt()),
        None => Transcript::new(),
    }
}

impl Chat {
    pub fn builder(provider: SharedProvider) -> ChatBuilder {
        ChatBuilder::new(provider)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn persona(&self) -> Option<&Persona> {
        self.persona.as_ref()
    }

    pub fn snapshot_id(&self) -> Option<&str> {
        self.snapshot_id.as_deref()
    }

    /// Runs the next turn in chat by adding `text` as a user message
    /// and asking the provider for a reply.
    ///
    /// Blank input is rejected without touching the transcript. When
    /// the provider fails the user message stays in the transcript
    /// unanswered and the failure is returned as is.
    pub async fn submit(&mut self, text: &str) -> Result<Reply, ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::InputRejected);
        }

        self.transcript.push_user(text);
        tracing::debug!(
            "Requesting completion for {} messages",
            self.transcript.len()
        );

        let content = match self.provider.complete(self.transcript.messages()).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Completion failed ({}): {}", e.kind(), e);
                return Err(e.into());
            }
        };
        let message = self.transcript.push_assistant(&content).clone();
        let warning = self.persist().await.err();

        Ok(Reply { message, warning })
    }

    /// Start over with a fresh transcript for the same persona. Unsaved
    /// messages are persisted first on a best effort basis, a failed
    /// save is returned but doesn't prevent the reset.
    pub async fn new_chat(&mut self) -> Option<StorageError> {
        let warning = self.persist().await.err();
        self.reset(self.persona.clone());
        warning
    }

    /// Change persona. The current system message is never rewritten,
    /// instead this starts a new chat seeded with the new persona.
    pub async fn switch_persona(&mut self, persona: Option<Persona>) -> Option<StorageError> {
        let warning = self.persist().await.err();
        self.reset(persona);
        warning
    }

    /// Continue a previously saved conversation. Later turns are saved
    /// back into the same snapshot.
    ///
    /// Unsaved changes are persisted before the snapshot is read, so
    /// resuming this session's own snapshot picks up its latest turns.
    pub async fn resume(&mut self, snapshot_id: &str) -> Result<Option<StorageError>, ChatError> {
        let store = match (&self.store, &self.identity) {
            (Some(store), Identity::Authenticated { .. }) => store.clone(),
            _ => return Err(ChatError::SnapshotNotFound(snapshot_id.to_string())),
        };

        let warning = self.persist().await.err();
        // The stored copy of the current snapshot is behind the transcript
        // when the save above failed
        if warning.is_some() && self.snapshot_id.as_deref() == Some(snapshot_id) {
            return Ok(warning);
        }

        let snapshot = store
            .get(&self.identity, snapshot_id)
            .await?
            .ok_or_else(|| ChatError::SnapshotNotFound(snapshot_id.to_string()))?;
        self.saved_len = snapshot.transcript.len();
        self.transcript = snapshot.transcript;
        self.snapshot_id = Some(snapshot.meta.id);
        Ok(warning)
    }

    /// Saved conversations of this session's identity, oldest first.
    pub async fn history(&self) -> Result<Vec<Snapshot>, StorageError> {
        match &self.store {
            Some(store) => store.load(&self.identity).await,
            None => Ok(Vec::new()),
        }
    }

    /// Messages in this identity's saved conversations that contain
    /// `keyword`, ignoring case.
    pub async fn search(&self, keyword: &str) -> Result<Vec<SearchHit>, StorageError> {
        match &self.store {
            Some(store) => store.search(&self.identity, keyword).await,
            None => Ok(Vec::new()),
        }
    }

    fn has_unsaved_changes(&self) -> bool {
        self.transcript.has_conversation() && self.transcript.len() != self.saved_len
    }

    fn reset(&mut self, persona: Option<Persona>) {
        self.transcript = seed(&persona);
        self.persona = persona;
        self.snapshot_id = None;
        self.saved_len = self.transcript.len();
    }

    /// Save the transcript if the identity may be persisted and there
    /// is something new to write.
    async fn persist(&mut self) -> Result<(), StorageError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if self.identity.is_guest() || !self.has_unsaved_changes() {
            return Ok(());
        }

        let snapshot_id = self
            .snapshot_id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        match store
            .save(&self.identity, &snapshot_id, &self.transcript)
            .await
        {
            Ok(_) => {
                self.saved_len = self.transcript.len();
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to save snapshot {}: {}", snapshot_id, e);
                Err(e)
            }
        }
    }
}

pub struct ChatBuilder {
    provider: SharedProvider,
    store: Option<SharedStore>,
    identity: Identity,
    persona: Option<Persona>,
}

impl ChatBuilder {
    pub fn new(provider: SharedProvider) -> Self {
        Self {
            provider,
            store: None,
            identity: Identity::Guest,
            persona: None,
        }
    }

    /// Seed the transcript with the persona's system message. Without
    /// one the transcript starts empty.
    pub fn persona(mut self, persona: Persona) -> Self {
        self.persona = Some(persona);
        self
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Chat {
        let transcript = seed(&self.persona);
        Chat {
            provider: self.provider,
            store: self.store,
            identity: self.identity,
            persona: self.persona,
            saved_len: transcript.len(),
            transcript,
            snapshot_id: None,
        }
    }
}
