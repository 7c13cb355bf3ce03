//! Router for the chat API

use std::sync::{Arc, RwLock};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::Query;
use uuid::Uuid;

use super::public;
use crate::api::public::ApiError;
use crate::api::state::{AppState, SharedChat};
use crate::auth::{AuthError, Credential};
use crate::chat::{Chat, ChatError, ProviderError};

type SharedState = Arc<RwLock<AppState>>;

fn find_session(state: &SharedState, id: &str) -> Option<SharedChat> {
    state
        .write()
        .expect("Unable to write share state")
        .sessions
        .get(id)
}

fn session_not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        format!("Chat session {} not found", id),
    )
        .into_response()
}

fn provider_failure(err: ProviderError) -> Response {
    let status = match err {
        ProviderError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ProviderError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ProviderError::Unauthorized | ProviderError::MalformedResponse(_) => {
            StatusCode::BAD_GATEWAY
        }
    };
    let body = public::ProviderErrorResponse {
        kind: err.kind().to_string(),
        message: err.to_string(),
    };
    (status, Json(body)).into_response()
}

/// Start a new chat session as a guest or, with credentials, as an
/// authenticated user
async fn create_session(
    State(state): State<SharedState>,
    Json(payload): Json<public::CreateSessionRequest>,
) -> Result<Response, ApiError> {
    let (provider, store, accounts, personas, default_persona) = {
        let shared_state = state.read().expect("Unable to read share state");
        (
            shared_state.provider.clone(),
            shared_state.store.clone(),
            shared_state.accounts.clone(),
            shared_state.personas.clone(),
            shared_state.config.default_persona.clone(),
        )
    };

    let identity = match (payload.handle, payload.password) {
        (Some(handle), Some(password)) => {
            match accounts
                .authenticate(&Credential { handle, password })
                .await
            {
                Ok(identity) => identity,
                Err(AuthError::InvalidCredential) => {
                    return Ok((StatusCode::UNAUTHORIZED, "Invalid credentials").into_response());
                }
                Err(e) => return Err(e.into()),
            }
        }
        (None, None) => accounts.guest(),
        _ => {
            return Ok((
                StatusCode::BAD_REQUEST,
                "Provide both handle and password or neither",
            )
                .into_response());
        }
    };

    let persona = match payload.persona.or(default_persona) {
        Some(name) if name.trim().is_empty() => None,
        Some(name) => match personas.get(&name) {
            Ok(persona) => Some(persona),
            Err(e) => return Ok((StatusCode::BAD_REQUEST, e.to_string()).into_response()),
        },
        None => None,
    };

    let mut builder = Chat::builder(provider)
        .store(store)
        .identity(identity.clone());
    if let Some(persona) = persona {
        builder = builder.persona(persona);
    }
    let chat = builder.build();

    let session_id = Uuid::new_v4().to_string();
    let resp = public::SessionResponse {
        session_id: session_id.clone(),
        identity,
        persona: chat.persona().map(|p| p.name().to_string()),
        transcript: chat.transcript().clone(),
    };
    state
        .write()
        .expect("Unable to write share state")
        .sessions
        .insert(session_id.clone(), chat);
    tracing::debug!("Started chat session {}", session_id);

    Ok(Json(resp).into_response())
}

/// Get the current transcript of a session
async fn chat_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(chat) = find_session(&state, &id) else {
        return Ok(session_not_found(&id));
    };
    let chat = chat.lock().await;

    Ok(Json(public::SessionResponse {
        session_id: id,
        identity: chat.identity().clone(),
        persona: chat.persona().map(|p| p.name().to_string()),
        transcript: chat.transcript().clone(),
    })
    .into_response())
}

/// Send the next message in a session and wait for the reply
async fn chat_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<public::ChatRequest>,
) -> Result<Response, ApiError> {
    let Some(chat) = find_session(&state, &id) else {
        return Ok(session_not_found(&id));
    };
    let mut chat = chat.lock().await;

    match chat.submit(&payload.message).await {
        Ok(reply) => Ok(Json(public::ChatResponse {
            reply: reply.message,
            warning: reply.warning.map(|w| w.to_string()),
        })
        .into_response()),
        // Blank messages are ignored
        Err(ChatError::InputRejected) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(ChatError::Provider(e)) => {
            tracing::error!("Chat handler error: {}", e);
            Ok(provider_failure(e))
        }
        Err(e) => Err(e.into()),
    }
}

/// Save the current conversation if needed and start over
async fn new_chat(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(chat) = find_session(&state, &id) else {
        return Ok(session_not_found(&id));
    };
    let mut chat = chat.lock().await;
    let warning = chat.new_chat().await;

    Ok(Json(public::NewChatResponse {
        transcript: chat.transcript().clone(),
        warning: warning.map(|w| w.to_string()),
    })
    .into_response())
}

/// Continue a saved conversation in this session
async fn resume(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<public::ResumeRequest>,
) -> Result<Response, ApiError> {
    let Some(chat) = find_session(&state, &id) else {
        return Ok(session_not_found(&id));
    };
    let mut chat = chat.lock().await;

    match chat.resume(&payload.snapshot_id).await {
        Ok(warning) => Ok(Json(public::NewChatResponse {
            transcript: chat.transcript().clone(),
            warning: warning.map(|w| w.to_string()),
        })
        .into_response()),
        Err(ChatError::SnapshotNotFound(snapshot_id)) => Ok((
            StatusCode::NOT_FOUND,
            format!("Snapshot {} not found", snapshot_id),
        )
            .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// End a session, saving anything not yet saved
async fn close_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let removed = state
        .write()
        .expect("Unable to write share state")
        .sessions
        .remove(&id);
    let Some(chat) = removed else {
        return Ok(session_not_found(&id));
    };
    let warning = chat.lock().await.new_chat().await;
    tracing::debug!("Closed chat session {}", id);

    Ok(Json(public::CloseSessionResponse {
        warning: warning.map(|w| w.to_string()),
    })
    .into_response())
}

/// Saved conversations of the session's identity
async fn history(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(chat) = find_session(&state, &id) else {
        return Ok(session_not_found(&id));
    };
    let snapshots = chat.lock().await.history().await?;

    Ok(Json(public::HistoryResponse { snapshots }).into_response())
}

/// Search the saved conversations of the session's identity
async fn search(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(params): Query<public::SearchQuery>,
) -> Result<Response, ApiError> {
    let Some(chat) = find_session(&state, &id) else {
        return Ok(session_not_found(&id));
    };
    let hits = chat.lock().await.search(&params.keyword).await?;

    Ok(Json(public::SearchResponse { hits }).into_response())
}

/// Create the chat router
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(chat_session).delete(close_session))
        .route("/sessions/{id}/messages", post(chat_handler))
        .route("/sessions/{id}/new", post(new_chat))
        .route("/sessions/{id}/resume", post(resume))
        .route("/sessions/{id}/history", get(history))
        .route("/sessions/{id}/search", get(search))
}
