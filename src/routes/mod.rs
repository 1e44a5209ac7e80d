//! HTTP route handlers.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::AppState;

pub mod account;
pub mod admin;
pub mod chat;
pub mod feedback;

pub use account::account_router;
pub use admin::admin_router;
pub use chat::chat_router;
pub use feedback::feedback_router;

/// Assemble the full API surface.
///
/// - `GET /healthz` - liveness probe
/// - `/api/chat/*` - streaming question answering
/// - `/api/admin/*` - token-guarded admin surface
/// - `/api/*` - account, pricing, and feedback routes
pub fn api_router() -> Router<Arc<AppState>> {
    let api = Router::new()
        .nest("/chat", chat_router())
        .nest("/admin", admin_router())
        .merge(account_router())
        .merge(feedback_router());

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
}

async fn healthz() -> &'static str {
    "ok"
}
