//! Where snapshots of authenticated transcripts are kept.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use super::error::StorageError;
use super::models::{Identity, SearchHit, Snapshot, SnapshotRef, Transcript, search_snapshots};

/// Persistence for transcripts keyed by the identity's handle.
///
/// Implementations must make each `save` all-or-nothing and must never
/// return snapshots that belong to a different handle.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Write `transcript` as snapshot `snapshot_id`, replacing the
    /// messages of an existing snapshot with that ID. Fails with
    /// `NotPersistable` for guests.
    async fn save(
        &self,
        identity: &Identity,
        snapshot_id: &str,
        transcript: &Transcript,
    ) -> Result<SnapshotRef, StorageError>;

    /// All snapshots for the identity, oldest first. Guests and
    /// identities without history get an empty list.
    async fn load(&self, identity: &Identity) -> Result<Vec<Snapshot>, StorageError>;

    async fn get(
        &self,
        identity: &Identity,
        snapshot_id: &str,
    ) -> Result<Option<Snapshot>, StorageError> {
        let snapshots = self.load(identity).await?;
        Ok(snapshots.into_iter().find(|s| s.meta.id == snapshot_id))
    }

    async fn search(
        &self,
        identity: &Identity,
        keyword: &str,
    ) -> Result<Vec<SearchHit>, StorageError> {
        let snapshots = self.load(identity).await?;
        Ok(search_snapshots(&snapshots, keyword))
    }
}

pub type SharedStore = Arc<dyn SessionStore + Send + Sync + 'static>;

/// Keeps snapshots in memory for the life of the process.
#[derive(Default)]
pub struct MemoryStore {
    // Insertion ordered so ties on `created_at` keep write order
    snapshots: Mutex<Vec<Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save(
        &self,
        identity: &Identity,
        snapshot_id: &str,
        transcript: &Transcript,
    ) -> Result<SnapshotRef, StorageError> {
        let handle = identity.handle().ok_or(StorageError::NotPersistable)?;
        let mut snapshots = self
            .snapshots
            .lock()
            .map_err(|_| StorageError::unavailable("memory store lock poisoned"))?;
        let now = Utc::now();

        if let Some(existing) = snapshots.iter_mut().find(|s| s.meta.id == snapshot_id) {
            if existing.meta.handle != handle {
                return Err(StorageError::Unavailable(format!(
                    "snapshot {} belongs to another identity",
                    snapshot_id
                )));
            }
            existing.meta.updated_at = now;
            existing.transcript = transcript.clone();
            return Ok(existing.meta.clone());
        }

        let meta = SnapshotRef {
            id: snapshot_id.to_string(),
            handle: handle.to_string(),
            created_at: now,
            updated_at: now,
        };
        snapshots.push(Snapshot {
            meta: meta.clone(),
            transcript: transcript.clone(),
        });
        Ok(meta)
    }

    async fn load(&self, identity: &Identity) -> Result<Vec<Snapshot>, StorageError> {
        let Some(handle) = identity.handle() else {
            return Ok(Vec::new());
        };
        let snapshots = self
            .snapshots
            .lock()
            .map_err(|_| StorageError::unavailable("memory store lock poisoned"))?;
        let mut found: Vec<Snapshot> = snapshots
            .iter()
            .filter(|s| s.meta.handle == handle)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps
        found.sort_by_key(|s| s.meta.created_at);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::{Message, Role};

    fn transcript(texts: &[(Role, &str)]) -> Transcript {
        Transcript::new_with_messages(
            texts
                .iter()
                .map(|(role, content)| Message::new(*role, content))
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let store = MemoryStore::new();
        let alex = Identity::authenticated("alex");
        let saved = transcript(&[
            (Role::System, "You are a helpful assistant."),
            (Role::User, "hello"),
            (Role::Assistant, "Hi there! How can I help you?"),
        ]);

        let meta = store.save(&alex, "s1", &saved).await.unwrap();
        assert_eq!(meta.handle, "alex");

        let loaded = store.load(&alex).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].meta.id, "s1");
        assert_eq!(loaded[0].transcript, saved);
    }

    #[tokio::test]
    async fn test_guest_is_not_persistable() {
        let store = MemoryStore::new();
        let result = store
            .save(&Identity::Guest, "s1", &transcript(&[(Role::User, "hi")]))
            .await;
        assert_eq!(result, Err(StorageError::NotPersistable));
        assert!(store.load(&Identity::Guest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_existing_snapshot() {
        let store = MemoryStore::new();
        let alex = Identity::authenticated("alex");

        let first = store
            .save(&alex, "s1", &transcript(&[(Role::User, "hi")]))
            .await
            .unwrap();
        let second = store
            .save(
                &alex,
                "s1",
                &transcript(&[(Role::User, "hi"), (Role::Assistant, "hello")]),
            )
            .await
            .unwrap();

        assert_eq!(first.created_at, second.created_at);
        let loaded = store.load(&alex).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_save_refuses_other_identities_snapshot() {
        let store = MemoryStore::new();
        store
            .save(
                &Identity::authenticated("alex"),
                "s1",
                &transcript(&[(Role::User, "mine")]),
            )
            .await
            .unwrap();

        let result = store
            .save(
                &Identity::authenticated("sam"),
                "s1",
                &transcript(&[(Role::User, "yours")]),
            )
            .await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));

        let alex = store.load(&Identity::authenticated("alex")).await.unwrap();
        assert_eq!(alex[0].transcript.messages()[0].content(), "mine");
    }

    #[tokio::test]
    async fn test_load_orders_by_creation() {
        let store = MemoryStore::new();
        let alex = Identity::authenticated("alex");
        for id in ["a", "b", "c"] {
            store
                .save(&alex, id, &transcript(&[(Role::User, id)]))
                .await
                .unwrap();
        }
        // Updating an older snapshot doesn't move it
        store
            .save(&alex, "a", &transcript(&[(Role::User, "a again")]))
            .await
            .unwrap();

        let ids: Vec<String> = store
            .load(&alex)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.meta.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_identity() {
        let store = MemoryStore::new();
        let alex = Identity::authenticated("alex");
        let sam = Identity::authenticated("sam");
        store
            .save(&alex, "s1", &transcript(&[(Role::User, "alex likes foo")]))
            .await
            .unwrap();
        store
            .save(&sam, "s2", &transcript(&[(Role::User, "sam likes FOO too")]))
            .await
            .unwrap();

        let hits = store.search(&alex, "foo").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snapshot.handle, "alex");
        assert_eq!(hits[0].message.content(), "alex likes foo");

        assert!(store.search(&Identity::Guest, "foo").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_only_finds_own_snapshots() {
        let store = MemoryStore::new();
        store
            .save(
                &Identity::authenticated("alex"),
                "s1",
                &transcript(&[(Role::User, "hi")]),
            )
            .await
            .unwrap();

        let found = store
            .get(&Identity::authenticated("alex"), "s1")
            .await
            .unwrap();
        assert!(found.is_some());
        let found = store
            .get(&Identity::authenticated("sam"), "s1")
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
