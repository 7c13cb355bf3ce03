//! Test utilities for integration tests
use std::sync::{Arc, RwLock};

use axum::{Router, body::Body};
use tempfile::TempDir;

use palaver::api::AppState;
use palaver::api::app;
use palaver::auth::SqliteAccounts;
use palaver::chat::SharedProvider;
use palaver::core::db::async_db;
use palaver::core::db::initialize_db;
use palaver::core::{AppConfig, ProviderKind};

/// Accounts every test app is seeded with.
pub const ACCOUNTS: [(&str, &str); 2] = [("alex", "correct horse"), ("sam", "battery staple")];

/// Keeps the temporary storage alive for as long as the router is in
/// use.
pub struct TestApp {
    pub router: Router,
    pub db: tokio_rusqlite::Connection,
    _dir: TempDir,
}

pub fn test_config(storage_path: &str) -> AppConfig {
    AppConfig {
        storage_path: storage_path.to_string(),
        db_path: format!("{}/db", storage_path),
        provider: ProviderKind::Rules,
        openai_model: String::from("gpt-4o"),
        openai_api_hostname: String::from("http://127.0.0.1:9"),
        openai_api_key: String::from("test-api-key"),
        request_timeout_secs: 5,
        max_sessions: 100,
        session_idle_secs: 60 * 60,
        system_message: String::from("You are a helpful assistant."),
        default_persona: Some(String::from("assistant")),
        assistant_name: String::from("Smart Chatbot"),
    }
}

/// Creates a test application router backed by a fresh database in a
/// temporary directory and replying with canned answers.
pub async fn test_app() -> TestApp {
    build_app(None, |_| {}).await
}

/// Same as `test_app` but with a custom completion provider.
pub async fn test_app_with_provider(provider: SharedProvider) -> TestApp {
    build_app(Some(provider), |_| {}).await
}

/// Same as `test_app` with changes applied to the default test config.
pub async fn test_app_with_config(configure: impl FnOnce(&mut AppConfig)) -> TestApp {
    build_app(None, configure).await
}

async fn build_app(
    provider: Option<SharedProvider>,
    configure: impl FnOnce(&mut AppConfig),
) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let mut config = test_config(dir.path().to_str().unwrap());
    configure(&mut config);
    std::fs::create_dir_all(&config.db_path).expect("Failed to create db directory");

    let db = async_db(&config.db_path)
        .await
        .expect("Failed to connect to async db");
    db.call(|conn| {
        initialize_db(conn).expect("Failed to migrate db");
        Ok(())
    })
    .await
    .unwrap();

    let accounts = SqliteAccounts::new(&db);
    for (handle, password) in ACCOUNTS {
        accounts.register(handle, password).await.unwrap();
    }

    let mut app_state = AppState::new(db.clone(), config);
    if let Some(provider) = provider {
        app_state = app_state.with_provider(provider);
    }

    TestApp {
        router: app(Arc::new(RwLock::new(app_state))),
        db,
        _dir: dir,
    }
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
