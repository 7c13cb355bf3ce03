//! Error types for chat sessions.

/// Why a completion provider could not produce a reply. Every kind is
/// handled the same way by a session, the kind only matters to
/// whoever renders the failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("completion provider rejected the credentials")]
    Unauthorized,
    #[error("completion provider is rate limiting requests")]
    RateLimited,
    #[error("completion provider unavailable: {0}")]
    Unavailable(String),
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
}

impl ProviderError {
    /// Stable machine readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Unauthorized => "unauthorized",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::Unavailable(_) => "unavailable",
            ProviderError::MalformedResponse(_) => "malformed_response",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("guest sessions can not be persisted")]
    NotPersistable,
}

impl StorageError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        StorageError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    #[error("system message must be the first message of a transcript")]
    SystemMessageNotLeading,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Blank submissions. Callers ignore this rather than showing it.
    #[error("message is empty")]
    InputRejected,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("unknown persona: {0}")]
    UnknownPersona(String),
    #[error("persona {name} could not be rendered: {reason}")]
    InvalidPersona { name: String, reason: String },
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_kinds_are_distinct() {
        let kinds = [
            ProviderError::Unauthorized.kind(),
            ProviderError::RateLimited.kind(),
            ProviderError::Unavailable(String::from("timeout")).kind(),
            ProviderError::MalformedResponse(String::from("no choices")).kind(),
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in kinds.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_chat_error_display() {
        let err = ChatError::from(ProviderError::RateLimited);
        assert_eq!(
            err.to_string(),
            "completion provider is rate limiting requests"
        );

        let err = ChatError::from(StorageError::unavailable("disk full"));
        assert_eq!(err.to_string(), "storage unavailable: disk full");

        let err = ChatError::UnknownPersona(String::from("pirate"));
        assert_eq!(err.to_string(), "unknown persona: pirate");
    }
}
