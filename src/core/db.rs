//! SQLite connection and schema management.
use rusqlite::Connection as SyncConnection;
use tokio_rusqlite::Connection;

/// Ordered schema migrations. The index of each entry + 1 is the
/// `user_version` the database is at after it runs.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS account (
        handle TEXT PRIMARY KEY,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS snapshot (
        id TEXT PRIMARY KEY,
        handle TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS snapshot_message (
        snapshot_id TEXT NOT NULL REFERENCES snapshot(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        data TEXT NOT NULL,
        PRIMARY KEY (snapshot_id, position)
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS snapshot_handle_created_at
        ON snapshot (handle, created_at);
    "#,
];

/// Open the async connection to the database stored in `db_path`.
pub async fn async_db(db_path: &str) -> Result<Connection, tokio_rusqlite::Error> {
    let path = format!("{}/palaver.sqlite", db_path.trim_end_matches('/'));
    let db = Connection::open(path).await?;
    db.call(|conn| {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    })
    .await?;
    Ok(db)
}

/// Create all tables on a fresh database.
pub fn initialize_db(conn: &mut SyncConnection) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migrate_db(conn)?;
    Ok(())
}

/// Apply every migration newer than the database's `user_version`.
/// Each migration runs in its own transaction.
pub fn migrate_db(conn: &mut SyncConnection) -> Result<usize, rusqlite::Error> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let mut applied = 0;
    for (idx, migration) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let tx = conn.transaction()?;
        tx.execute_batch(migration)?;
        tx.pragma_update(None, "user_version", (idx + 1) as i64)?;
        tx.commit()?;
        tracing::debug!("Applied db migration {}", idx + 1);
        applied += 1;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_db_is_idempotent() {
        let mut conn = SyncConnection::open_in_memory().unwrap();
        initialize_db(&mut conn).unwrap();
        assert_eq!(migrate_db(&mut conn).unwrap(), 0);

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version as usize, MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_async_db_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        let db = async_db(path).await.unwrap();
        db.call(|conn| {
            initialize_db(conn)?;
            Ok(())
        })
        .await
        .unwrap();
        assert!(dir.path().join("palaver.sqlite").exists());
    }
}
