//! Homework Helper
//!
//! A backend for a homework tutoring app: students ask questions (text, or
//! text plus a photo), answers stream back from an LLM vendor as
//! Server-Sent Events, and a credit/subscription ledger meters who may ask.
//!
//! # Features
//!
//! - `sqlx-storage` (default): PostgreSQL storage via SQLx
//! - `memory-storage`: In-memory storage for testing
//!
//! # Example
//!
//! ```rust,ignore
//! use homework_helper::{AppState, Config, SqlxStorage, routes, settings};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     dotenvy::dotenv().ok();
//!     let config = Config::from_env()?;
//!     let pool = sqlx::PgPool::connect(&std::env::var("DATABASE_URL")?).await?;
//!     let storage = SqlxStorage::new(pool);
//!     storage.migrate().await?;
//!
//!     let state = Arc::new(AppState::new(config, storage));
//!     settings::ensure_defaults(state.storage.as_ref()).await?;
//!
//!     let app = routes::api_router().with_state(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod ledger;
pub mod llm;
pub mod models;
pub mod routes;
pub mod settings;
pub mod storage;

// Re-exports for convenience
use std::sync::Arc;

pub use config::{Config, ConfigError, LlmConfig, SecurityConfig, ServerConfig};
pub use error::{Error, Result, StorageError};
pub use models::{Account, CreditBalance, CreditTransaction, Subscription};
#[cfg(feature = "memory-storage")]
pub use storage::MemoryStorage;
#[cfg(feature = "sqlx-storage")]
pub use storage::SqlxStorage;
pub use storage::{
    AccountStorage, FeedbackStorage, SettingsStorage, Storage, UsageStorage,
};

/// Application state containing configuration and storage.
///
/// This is designed to be wrapped in `Arc` and used with Axum's state extractor.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Storage backend for accounts, settings, feedback, and usage.
    pub storage: Box<dyn Storage>,
    /// HTTP client for LLM vendor requests.
    pub http_client: reqwest::Client,
}

impl AppState {
    /// Create a new AppState with the given configuration and storage.
    pub fn new(config: Config, storage: impl Storage + 'static) -> Self {
        Self {
            config,
            storage: Box::new(storage),
            http_client: reqwest::Client::new(),
        }
    }

    /// Create a new AppState with a custom HTTP client.
    pub fn with_http_client(
        config: Config,
        storage: impl Storage + 'static,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            storage: Box::new(storage),
            http_client,
        }
    }
}

/// Type alias for Arc-wrapped AppState, commonly used with Axum.
pub type SharedState = Arc<AppState>;
