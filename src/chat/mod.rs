//! Chat sessions: transcripts, personas, persistence and the
//! completion provider seam.
mod core;
pub mod db;
pub mod error;
pub mod models;
pub mod persona;
pub mod provider;
pub mod store;

pub use self::core::{Chat, ChatBuilder, Reply};
pub use db::SqliteStore;
pub use error::{ChatError, ProviderError, StorageError, TranscriptError};
pub use models::{Identity, Message, Role, SearchHit, Snapshot, SnapshotRef, Transcript};
pub use persona::{Persona, PersonaRegistry};
pub use provider::{CompletionProvider, RuleProvider, SharedProvider, provider_from_config};
pub use store::{MemoryStore, SessionStore, SharedStore};
