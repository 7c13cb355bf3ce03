//! Public API types

use axum::response::{IntoResponse, Response};
use http::StatusCode;

use crate::auth::AuthError;
use crate::chat::{ChatError, StorageError};

// Errors

/// Any error a handler bubbles up with `?`. Known domain errors get a
/// matching status, everything else is a 500.
pub struct ApiError(anyhow::Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        if let Some(err) = self.0.downcast_ref::<ChatError>() {
            return match err {
                ChatError::InputRejected
                | ChatError::UnknownPersona(_)
                | ChatError::InvalidPersona { .. } => StatusCode::BAD_REQUEST,
                ChatError::SnapshotNotFound(_) => StatusCode::NOT_FOUND,
                ChatError::Storage(StorageError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
                ChatError::Provider(_) => StatusCode::BAD_GATEWAY,
                ChatError::Storage(StorageError::NotPersistable) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
        }
        match self.0.downcast_ref::<StorageError>() {
            Some(StorageError::Unavailable(_)) => return StatusCode::SERVICE_UNAVAILABLE,
            Some(StorageError::NotPersistable) => return StatusCode::INTERNAL_SERVER_ERROR,
            None => {}
        }
        match self.0.downcast_ref::<AuthError>() {
            Some(AuthError::InvalidCredential) => StatusCode::UNAUTHORIZED,
            Some(AuthError::Storage(_)) => StatusCode::SERVICE_UNAVAILABLE,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self.0);
        } else {
            tracing::debug!("{}", self.0);
        }
        (status, self.0.to_string()).into_response()
    }
}

/// Lets handlers use `?` on anything convertible to `anyhow::Error`
impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

// Re-export public types from each route

pub mod chat {
    pub use crate::api::routes::chat::public::*;
}
