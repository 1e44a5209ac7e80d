//! Feedback submission route.
//!
//! - `POST /feedback` - record a thumbs verdict on an answer
//!
//! Feedback is anonymous: entries never carry an account id, so the route
//! takes no auth extractor at all.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;

use crate::error::Result;
use crate::models::{Feedback, NewFeedback};
use crate::storage::FeedbackStorage;
use crate::AppState;

/// Build the feedback router.
///
/// Routes:
/// - `POST /feedback` - store a new feedback entry
pub fn feedback_router() -> Router<Arc<AppState>> {
    Router::new().route("/feedback", post(submit_feedback))
}

/// Handler for `POST /feedback`.
async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewFeedback>,
) -> Result<(StatusCode, Json<Feedback>)> {
    let feedback = payload.into_feedback();
    state.storage.record_feedback(&feedback).await?;
    info!(
        feedback_id = %feedback.id,
        rating = feedback.rating.as_str(),
        "recorded feedback"
    );
    Ok((StatusCode::CREATED, Json(feedback)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::FeedbackRating;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_feedback_lands_in_storage() {
        let storage = MemoryStorage::new();
        let payload: NewFeedback = serde_json::from_str(
            r#"{ "rating": "not-helpful", "comment": "answer stopped mid-step" }"#,
        )
        .unwrap();

        let feedback = payload.into_feedback();
        storage.record_feedback(&feedback).await.unwrap();

        let stored = storage.list_feedback(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rating, FeedbackRating::NotHelpful);
        assert_eq!(stored[0].comment, "answer stopped mid-step");
    }
}
