//! Server binary: wires configuration, storage, and the API router.

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use homework_helper::{routes, settings, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = Arc::new(build_state(config).await?);
    settings::ensure_defaults(state.storage.as_ref()).await?;

    let app = routes::api_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Pick the storage backend: PostgreSQL when `DATABASE_URL` is set,
/// otherwise the in-memory store.
async fn build_state(config: Config) -> anyhow::Result<AppState> {
    #[cfg(feature = "sqlx-storage")]
    if let Ok(url) = std::env::var("DATABASE_URL") {
        let pool = sqlx::PgPool::connect(&url).await?;
        let storage = homework_helper::SqlxStorage::new(pool);
        storage.migrate().await?;
        info!("connected to PostgreSQL storage");
        return Ok(AppState::new(config, storage));
    }

    #[cfg(feature = "memory-storage")]
    {
        tracing::warn!("DATABASE_URL is not set, using in-memory storage");
        return Ok(AppState::new(config, homework_helper::MemoryStorage::new()));
    }

    #[cfg(not(feature = "memory-storage"))]
    anyhow::bail!("DATABASE_URL is required when the memory-storage feature is disabled");
}
