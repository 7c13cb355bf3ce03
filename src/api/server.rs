use std::sync::{Arc, RwLock};

use anyhow::Result;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::routes;
use crate::api::state::AppState;
use crate::core::{
    AppConfig,
    db::{async_db, migrate_db},
    logging,
};

/// axum logs rejections from built-in extractors with the
/// `axum::rejection` target, at `TRACE` level. `axum::rejection=trace`
/// enables showing those events.
pub const LOG_FILTER: &str = concat!(
    env!("CARGO_CRATE_NAME"),
    "=debug,tower_http=debug,axum::rejection=trace"
);

pub fn app(shared_state: Arc<RwLock<AppState>>) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        // API routes
        .nest("/api", routes::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::clone(&shared_state))
}

// Run the server
pub async fn serve(host: String, port: String, config: AppConfig) -> Result<()> {
    logging::init(LOG_FILTER);

    std::fs::create_dir_all(&config.db_path)?;
    let db = async_db(&config.db_path).await?;
    // Bring older databases up to date before taking traffic
    let applied = db
        .call(|conn| {
            let applied = migrate_db(conn)?;
            Ok(applied)
        })
        .await?;
    if applied > 0 {
        tracing::info!("Applied {} db migration(s)", applied);
    }

    let app_state = AppState::new(db, config);
    let shared_state = Arc::new(RwLock::new(app_state));
    let app = app(Arc::clone(&shared_state));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;

    tracing::debug!("Server started. Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
