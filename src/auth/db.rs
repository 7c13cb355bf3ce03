use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use super::{AuthError, AuthProvider, Credential, normalize_handle};
use crate::chat::Identity;

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| AuthError::Storage(e.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Storage(e.to_string()))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(password_hash).map_err(|e| AuthError::Storage(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Accounts stored in the `account` table with Argon2 password
/// hashes.
#[derive(Clone)]
pub struct SqliteAccounts {
    db: Connection,
}

impl SqliteAccounts {
    pub fn new(db: &Connection) -> Self {
        Self { db: db.clone() }
    }

    /// Create an account or replace the password of an existing one.
    pub async fn register(&self, handle: &str, password: &str) -> Result<Identity, AuthError> {
        let handle = normalize_handle(handle);
        if handle.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredential);
        }
        let password_hash = hash_password(password)?;

        let h = handle.clone();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO account (handle, password_hash) VALUES (?1, ?2)
                     ON CONFLICT(handle) DO UPDATE SET password_hash = excluded.password_hash",
                    (&h, &password_hash),
                )?;
                Ok(())
            })
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        tracing::info!("Registered account {}", handle);
        Ok(Identity::Authenticated { handle })
    }

    async fn find_password_hash(&self, handle: &str) -> Result<Option<String>, AuthError> {
        let h = handle.to_owned();
        self.db
            .call(move |conn| {
                let hash = conn
                    .query_row(
                        "SELECT password_hash FROM account WHERE handle = ?1",
                        [&h],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(hash)
            })
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))
    }
}

#[async_trait]
impl AuthProvider for SqliteAccounts {
    async fn authenticate(&self, credential: &Credential) -> Result<Identity, AuthError> {
        let handle = normalize_handle(&credential.handle);
        let Some(password_hash) = self.find_password_hash(&handle).await? else {
            tracing::debug!("Login attempt for unknown account {}", handle);
            return Err(AuthError::InvalidCredential);
        };

        if verify_password(&credential.password, &password_hash)? {
            Ok(Identity::Authenticated { handle })
        } else {
            tracing::debug!("Wrong password for account {}", handle);
            Err(AuthError::InvalidCredential)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::initialize_db;

    async fn test_accounts() -> SqliteAccounts {
        let db = Connection::open_in_memory().await.unwrap();
        db.call(|conn| {
            initialize_db(conn)?;
            Ok(())
        })
        .await
        .unwrap();
        SqliteAccounts::new(&db)
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let accounts = test_accounts().await;
        accounts.register("Alex", "hunter2").await.unwrap();

        let identity = accounts
            .authenticate(&Credential::new("alex", "hunter2"))
            .await
            .unwrap();
        assert_eq!(identity, Identity::authenticated("alex"));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let accounts = test_accounts().await;
        accounts.register("alex", "hunter2").await.unwrap();

        let result = accounts
            .authenticate(&Credential::new("alex", "wrong"))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredential)));
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let accounts = test_accounts().await;
        let result = accounts
            .authenticate(&Credential::new("nobody", "hunter2"))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredential)));
    }

    #[tokio::test]
    async fn test_register_replaces_password() {
        let accounts = test_accounts().await;
        accounts.register("alex", "old").await.unwrap();
        accounts.register("alex", "new").await.unwrap();

        assert!(
            accounts
                .authenticate(&Credential::new("alex", "old"))
                .await
                .is_err()
        );
        assert!(
            accounts
                .authenticate(&Credential::new("alex", "new"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_register_rejects_blank() {
        let accounts = test_accounts().await;
        assert!(matches!(
            accounts.register("  ", "pw").await,
            Err(AuthError::InvalidCredential)
        ));
        assert!(matches!(
            accounts.register("alex", "").await,
            Err(AuthError::InvalidCredential)
        ));
    }

    #[test]
    fn test_guest_always_available() {
        // `guest` doesn't touch the database
        struct NoAccounts;
        #[async_trait]
        impl AuthProvider for NoAccounts {
            async fn authenticate(&self, _credential: &Credential) -> Result<Identity, AuthError> {
                Err(AuthError::InvalidCredential)
            }
        }
        assert_eq!(NoAccounts.guest(), Identity::Guest);
    }
}
