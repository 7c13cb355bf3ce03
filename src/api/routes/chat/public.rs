//! Public types for the chat API
use serde::{Deserialize, Serialize};

use crate::chat::{Identity, Message, SearchHit, Snapshot, Transcript};

#[derive(Deserialize, Default)]
pub struct CreateSessionRequest {
    // Falls back to the configured default. An empty string starts
    // without a system message.
    pub persona: Option<String>,
    // Both or neither, neither means a guest session
    pub handle: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub identity: Identity,
    pub persona: Option<String>,
    pub transcript: Transcript,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: Message,
    pub warning: Option<String>,
}

#[derive(Serialize)]
pub struct NewChatResponse {
    pub transcript: Transcript,
    pub warning: Option<String>,
}

#[derive(Serialize)]
pub struct CloseSessionResponse {
    pub warning: Option<String>,
}

#[derive(Deserialize)]
pub struct ResumeRequest {
    pub snapshot_id: String,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub snapshots: Vec<Snapshot>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub keyword: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
}

/// Body returned when the completion provider fails a turn.
#[derive(Serialize)]
pub struct ProviderErrorResponse {
    pub kind: String,
    pub message: String,
}
