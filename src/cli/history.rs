use anyhow::Result;

use crate::auth::SqliteAccounts;
use crate::chat::{SessionStore, SqliteStore};
use crate::core::db::async_db;

use super::account::login;

/// Truncate `text` to `max` characters for one line listings.
pub fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max {
        format!("{}...", line.chars().take(max).collect::<String>())
    } else {
        line.to_string()
    }
}

pub async fn list(handle: &str, db_path: &str) -> Result<()> {
    let db = async_db(db_path).await?;
    let identity = login(&SqliteAccounts::new(&db), handle).await?;
    let snapshots = SqliteStore::new(&db).load(&identity).await?;

    if snapshots.is_empty() {
        println!("No saved conversations");
    }
    for snapshot in snapshots {
        let opening = snapshot
            .transcript
            .iter()
            .find(|m| m.role() == crate::chat::Role::User)
            .map(|m| preview(m.content(), 60))
            .unwrap_or_default();
        println!(
            "{}  {}  {} messages  {}",
            snapshot.meta.id,
            snapshot.meta.created_at.format("%Y-%m-%d %H:%M"),
            snapshot.transcript.len(),
            opening
        );
    }

    Ok(())
}

pub async fn search(handle: &str, keyword: &str, db_path: &str) -> Result<()> {
    let db = async_db(db_path).await?;
    let identity = login(&SqliteAccounts::new(&db), handle).await?;
    let hits = SqliteStore::new(&db).search(&identity, keyword).await?;

    if hits.is_empty() {
        println!("No matches for \"{}\"", keyword);
    }
    for hit in hits {
        println!(
            "{}  {:?}: {}",
            hit.snapshot.id,
            hit.message.role(),
            preview(hit.message.content(), 80)
        );
    }

    Ok(())
}
