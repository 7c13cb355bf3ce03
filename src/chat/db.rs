use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::{Connection, params};

use super::error::StorageError;
use super::models::{Identity, Message, Snapshot, SnapshotRef, Transcript};
use super::store::SessionStore;

/// Snapshot row as stored, before the JSON messages are decoded.
struct SnapshotRow {
    id: String,
    handle: String,
    created_at: String,
    updated_at: String,
    messages: Vec<String>,
}

/// Outcome of the save transaction.
enum SaveResult {
    Saved { created_at: String },
    OwnedByOther,
}

// Fixed width timestamps so that ordering by the text column is
// ordering by time
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Unavailable(format!("invalid timestamp {}: {}", s, e)))
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = StorageError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let messages = row
            .messages
            .iter()
            .map(|data| serde_json::from_str::<Message>(data))
            .collect::<Result<Vec<Message>, _>>()
            .map_err(StorageError::unavailable)?;
        let transcript =
            Transcript::new_with_messages(messages).map_err(StorageError::unavailable)?;

        Ok(Snapshot {
            meta: SnapshotRef {
                created_at: parse_timestamp(&row.created_at)?,
                updated_at: parse_timestamp(&row.updated_at)?,
                id: row.id,
                handle: row.handle,
            },
            transcript,
        })
    }
}

fn find_snapshot_rows(
    conn: &rusqlite::Connection,
    handle: &str,
    snapshot_id: Option<&str>,
) -> Result<Vec<SnapshotRow>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, handle, created_at, updated_at
        FROM snapshot
        WHERE handle = ?1 AND (?2 IS NULL OR id = ?2)
        ORDER BY created_at ASC, rowid ASC
        "#,
    )?;
    let mut rows = stmt
        .query_map(params![handle, snapshot_id], |row| {
            Ok(SnapshotRow {
                id: row.get(0)?,
                handle: row.get(1)?,
                created_at: row.get(2)?,
                updated_at: row.get(3)?,
                messages: Vec::new(),
            })
        })?
        .collect::<Result<Vec<SnapshotRow>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT data FROM snapshot_message WHERE snapshot_id = ?1 ORDER BY position ASC",
    )?;
    for row in rows.iter_mut() {
        row.messages = stmt
            .query_map([&row.id], |i| i.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
    }

    Ok(rows)
}

/// Snapshots stored in SQLite. All access goes through the single
/// `tokio_rusqlite` connection thread, so writes for an identity are
/// serialized and each save is one transaction.
#[derive(Clone)]
pub struct SqliteStore {
    db: Connection,
}

impl SqliteStore {
    pub fn new(db: &Connection) -> Self {
        Self { db: db.clone() }
    }

    async fn snapshot_rows(
        &self,
        handle: &str,
        snapshot_id: Option<&str>,
    ) -> Result<Vec<Snapshot>, StorageError> {
        let handle = handle.to_owned();
        let snapshot_id = snapshot_id.map(str::to_owned);
        let rows = self
            .db
            .call(move |conn| {
                // Read everything inside one transaction for a consistent view
                let tx = conn.transaction()?;
                let rows = find_snapshot_rows(&tx, &handle, snapshot_id.as_deref())?;
                tx.commit()?;
                Ok(rows)
            })
            .await
            .map_err(StorageError::unavailable)?;

        rows.into_iter().map(Snapshot::try_from).collect()
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn save(
        &self,
        identity: &Identity,
        snapshot_id: &str,
        transcript: &Transcript,
    ) -> Result<SnapshotRef, StorageError> {
        let handle = identity
            .handle()
            .ok_or(StorageError::NotPersistable)?
            .to_owned();
        let data = transcript
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<String>, _>>()
            .map_err(StorageError::unavailable)?;
        let now = timestamp(Utc::now());
        let s_id = snapshot_id.to_owned();
        let h = handle.clone();
        let updated_at = now.clone();

        let result = self
            .db
            .call(move |conn| {
                // The snapshot row and all of its messages are written
                // together or not at all
                let tx = conn.transaction()?;

                let existing: Option<(String, String)> = tx
                    .query_row(
                        "SELECT handle, created_at FROM snapshot WHERE id = ?1",
                        [&s_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let created_at = match existing {
                    Some((owner, _)) if owner != h => return Ok(SaveResult::OwnedByOther),
                    Some((_, created_at)) => {
                        tx.execute(
                            "UPDATE snapshot SET updated_at = ?1 WHERE id = ?2",
                            params![now, s_id],
                        )?;
                        tx.execute(
                            "DELETE FROM snapshot_message WHERE snapshot_id = ?1",
                            [&s_id],
                        )?;
                        created_at
                    }
                    None => {
                        tx.execute(
                            "INSERT INTO snapshot (id, handle, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                            params![s_id, h, now],
                        )?;
                        now.clone()
                    }
                };

                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO snapshot_message (snapshot_id, position, data) VALUES (?1, ?2, ?3)",
                    )?;
                    for (position, msg) in data.iter().enumerate() {
                        stmt.execute(params![s_id, position as i64, msg])?;
                    }
                }

                tx.commit()?;
                Ok(SaveResult::Saved { created_at })
            })
            .await
            .map_err(StorageError::unavailable)?;

        match result {
            SaveResult::Saved { created_at } => Ok(SnapshotRef {
                id: snapshot_id.to_string(),
                handle,
                created_at: parse_timestamp(&created_at)?,
                updated_at: parse_timestamp(&updated_at)?,
            }),
            SaveResult::OwnedByOther => Err(StorageError::Unavailable(format!(
                "snapshot {} belongs to another identity",
                snapshot_id
            ))),
        }
    }

    async fn load(&self, identity: &Identity) -> Result<Vec<Snapshot>, StorageError> {
        match identity.handle() {
            Some(handle) => self.snapshot_rows(handle, None).await,
            None => Ok(Vec::new()),
        }
    }

    async fn get(
        &self,
        identity: &Identity,
        snapshot_id: &str,
    ) -> Result<Option<Snapshot>, StorageError> {
        let Some(handle) = identity.handle() else {
            return Ok(None);
        };
        let mut found = self.snapshot_rows(handle, Some(snapshot_id)).await?;
        Ok(found.pop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::models::Role;
    use crate::core::db::initialize_db;

    async fn test_store() -> SqliteStore {
        let db = Connection::open_in_memory().await.unwrap();
        db.call(|conn| {
            initialize_db(conn)?;
            Ok(())
        })
        .await
        .unwrap();
        SqliteStore::new(&db)
    }

    fn transcript(texts: &[(Role, &str)]) -> Transcript {
        Transcript::new_with_messages(
            texts
                .iter()
                .map(|(role, content)| Message::now(*role, content))
                .collect(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let store = test_store().await;
        let alex = Identity::authenticated("alex");
        let saved = transcript(&[
            (Role::System, "You are a helpful assistant."),
            (Role::User, "hello"),
            (Role::Assistant, "Hi there! How can I help you?"),
        ]);

        store.save(&alex, "s1", &saved).await.unwrap();
        let loaded = store.load(&alex).await.unwrap();

        assert_eq!(loaded.len(), 1);
        let pairs: Vec<(Role, &str)> = loaded[0]
            .transcript
            .iter()
            .map(|m| (m.role(), m.content()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (Role::System, "You are a helpful assistant."),
                (Role::User, "hello"),
                (Role::Assistant, "Hi there! How can I help you?"),
            ]
        );
    }

    #[tokio::test]
    async fn test_guest_is_not_persistable() {
        let store = test_store().await;
        let result = store
            .save(&Identity::Guest, "s1", &transcript(&[(Role::User, "hi")]))
            .await;
        assert_eq!(result, Err(StorageError::NotPersistable));
        assert!(store.load(&Identity::Guest).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_created_at() {
        let store = test_store().await;
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
    async fn test_refuses_other_identities_snapshot() {
        let store = test_store().await;
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

        let loaded = store.load(&Identity::authenticated("alex")).await.unwrap();
        assert_eq!(loaded[0].transcript.messages()[0].content(), "mine");
        assert!(
            store
                .load(&Identity::authenticated("sam"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_load_orders_by_creation() {
        let store = test_store().await;
        let alex = Identity::authenticated("alex");
        for id in ["a", "b", "c"] {
            store
                .save(&alex, id, &transcript(&[(Role::User, id)]))
                .await
                .unwrap();
        }
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
        let store = test_store().await;
        let alex = Identity::authenticated("alex");
        let sam = Identity::authenticated("sam");
        store
            .save(&alex, "s1", &transcript(&[(Role::User, "alex likes foo")]))
            .await
            .unwrap();
        store
            .save(&sam, "s2", &transcript(&[(Role::User, "sam likes Foo too")]))
            .await
            .unwrap();

        let hits = store.search(&sam, "FOO").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snapshot.id, "s2");
        assert_eq!(hits[0].message.content(), "sam likes Foo too");
    }

    #[tokio::test]
    async fn test_get_snapshot() {
        let store = test_store().await;
        let alex = Identity::authenticated("alex");
        store
            .save(&alex, "s1", &transcript(&[(Role::User, "hi")]))
            .await
            .unwrap();

        assert!(store.get(&alex, "s1").await.unwrap().is_some());
        assert!(store.get(&alex, "missing").await.unwrap().is_none());
        assert!(
            store
                .get(&Identity::authenticated("sam"), "s1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_failed_save_leaves_previous_snapshot_intact() {
        let store = test_store().await;
        let alex = Identity::authenticated("alex");
        let first = transcript(&[(Role::User, "hello"), (Role::Assistant, "Hi there!")]);
        store.save(&alex, "s1", &first).await.unwrap();

        // Abort the transaction after the old messages were deleted
        store
            .db
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_message BEFORE INSERT ON snapshot_message
                     WHEN NEW.data LIKE '%rejected%'
                     BEGIN SELECT RAISE(ABORT, 'message rejected'); END;",
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let second = transcript(&[
            (Role::User, "hello"),
            (Role::Assistant, "Hi there!"),
            (Role::User, "this one is rejected"),
        ]);
        let result = store.save(&alex, "s1", &second).await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));

        let loaded = store.load(&alex).await.unwrap();
        assert_eq!(loaded.len(), 1);
        let contents: Vec<&str> = loaded[0].transcript.iter().map(|m| m.content()).collect();
        assert_eq!(contents, vec!["hello", "Hi there!"]);
        assert_eq!(loaded[0].meta.updated_at, loaded[0].meta.created_at);

        // A brand new snapshot is not left behind half written either
        let result = store.save(&alex, "s2", &second).await;
        assert!(result.is_err());
        assert!(store.get(&alex, "s2").await.unwrap().is_none());
    }
}
