//! Question-answering routes.
//!
//! The streaming chat surface:
//! - `POST /gemini` - multipart question (prompt plus optional image) answered by Gemini
//! - `POST /groq` - JSON question answered by Groq
//!
//! Both endpoints reply with Server-Sent Events. Anything that goes wrong
//! before the stream opens (bad input, exhausted quota, bad token) is a
//! plain HTTP error; once streaming has begun, failures arrive as a final
//! plain-text chunk inside the stream so the client always gets a closed,
//! readable answer.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use tracing::{info, warn};

use crate::auth::MaybeAuthUser;
use crate::error::{Error, Result};
use crate::ledger;
use crate::llm::{self, gemini::InlineImage};
use crate::models::{Provider, UsageLogEntry};
use crate::storage::UsageStorage;
use crate::AppState;

/// Build the chat router.
///
/// Routes:
/// - `POST /gemini` - stream an answer from Gemini (image-capable)
/// - `POST /groq` - stream an answer from Groq (text only)
pub fn chat_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/gemini", post(ask_gemini))
        .route("/groq", post(ask_groq))
}

/// Request body for `POST /groq`.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    /// The question text.
    pub prompt: String,
}

/// Handler for `POST /gemini`.
///
/// Reads a multipart form with a `prompt` text field and an optional
/// `image` file field, admits the caller, then relays Gemini's answer.
async fn ask_gemini(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(user): MaybeAuthUser,
    multipart: Multipart,
) -> Result<impl IntoResponse> {
    let upload = read_upload(multipart).await?;
    let prompt = clean_prompt(&upload.prompt)?;
    let account_id = user.as_ref().map(|auth| auth.account_id.as_str());
    admit(&state, account_id).await?;

    info!(
        authenticated = user.is_some(),
        prompt_chars = prompt.chars().count(),
        has_image = upload.image.is_some(),
        "relaying question to Gemini"
    );
    log_usage(
        &state,
        account_id,
        Provider::Gemini,
        &state.config.llm.gemini_model,
        &prompt,
        upload.image.is_some(),
    )
    .await;

    let chunks =
        llm::gemini::stream_answer(&state.http_client, &state.config.llm, &prompt, upload.image)?;
    Ok(llm::sse_answer(chunks, None))
}

/// Handler for `POST /groq`.
///
/// Same admission flow as the Gemini route, but the answer is raced
/// against the configured wall-clock timeout.
async fn ask_groq(
    State(state): State<Arc<AppState>>,
    MaybeAuthUser(user): MaybeAuthUser,
    Json(request): Json<AskRequest>,
) -> Result<impl IntoResponse> {
    let prompt = clean_prompt(&request.prompt)?;
    let account_id = user.as_ref().map(|auth| auth.account_id.as_str());
    admit(&state, account_id).await?;

    info!(
        authenticated = user.is_some(),
        prompt_chars = prompt.chars().count(),
        "relaying question to Groq"
    );
    log_usage(
        &state,
        account_id,
        Provider::Groq,
        &state.config.llm.groq_model,
        &prompt,
        false,
    )
    .await;

    let chunks = llm::groq::stream_answer(&state.http_client, &state.config.llm, &prompt)?;
    let patience = Duration::from_secs(state.config.llm.answer_timeout_secs);
    Ok(llm::sse_answer(chunks, Some(patience)))
}

// ====== admission and parsing helpers ======

/// A parsed `POST /gemini` form.
struct QuestionUpload {
    prompt: String,
    image: Option<InlineImage>,
}

/// Pull the `prompt` and optional `image` fields out of a multipart body.
///
/// Unknown fields are ignored. The image is base64-encoded here so the
/// vendor client only ever sees wire-ready data.
async fn read_upload(mut multipart: Multipart) -> Result<QuestionUpload> {
    let mut prompt = String::new();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| Error::InvalidRequest(format!("malformed multipart body: {err}")))?
    {
        match field.name() {
            Some("prompt") => {
                prompt = field
                    .text()
                    .await
                    .map_err(|err| Error::InvalidRequest(format!("unreadable prompt field: {err}")))?;
            }
            Some("image") => {
                let mime_type = field.content_type().unwrap_or("image/png").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| Error::InvalidRequest(format!("unreadable image field: {err}")))?;
                image = Some(InlineImage {
                    mime_type,
                    data: BASE64.encode(&bytes),
                });
            }
            _ => {}
        }
    }

    Ok(QuestionUpload { prompt, image })
}

/// Validate and trim the question text.
fn clean_prompt(raw: &str) -> Result<String> {
    let prompt = raw.trim();
    if prompt.is_empty() {
        return Err(Error::InvalidRequest(
            "prompt must not be empty".to_string(),
        ));
    }
    Ok(prompt.to_string())
}

/// Gate a question on the caller's quota.
///
/// Signed-in callers go through the ledger admission gate. Anonymous
/// callers pass through without server-side accounting: guest allowances
/// live on the device until the guest signs up and reconciles.
async fn admit(state: &AppState, account_id: Option<&str>) -> Result<()> {
    let Some(account_id) = account_id else {
        return Ok(());
    };
    if ledger::admit_question(state.storage.as_ref(), account_id).await? {
        Ok(())
    } else {
        Err(Error::QuotaExhausted(
            "no credits or daily questions remaining".to_string(),
        ))
    }
}

/// Append the question to the usage log.
///
/// Failures are logged and swallowed so accounting hiccups never block an
/// answer.
async fn log_usage(
    state: &AppState,
    account_id: Option<&str>,
    provider: Provider,
    model: &str,
    prompt: &str,
    has_image: bool,
) {
    let entry = UsageLogEntry::record(account_id, provider, model, prompt.chars().count(), has_image);
    if let Err(error) = state.storage.record_usage(&entry).await {
        warn!(%error, "failed to record usage entry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::config::{Config, LlmConfig, SecurityConfig, ServerConfig};
    use crate::models::CreditBalance;
    use crate::storage::{AccountStorage, MemoryStorage};

    fn test_config() -> Config {
        Config {
            llm: LlmConfig {
                gemini_api_key: "test-gemini-key".to_string(),
                groq_api_key: "test-groq-key".to_string(),
                gemini_base_url: "http://localhost:0".to_string(),
                gemini_model: "gemini-2.0-flash".to_string(),
                groq_base_url: "http://localhost:0".to_string(),
                groq_model: "llama-3.3-70b-versatile".to_string(),
                answer_timeout_secs: 45,
            },
            security: SecurityConfig {
                jwt_secret: "test-secret".to_string(),
                admin_token: "test-admin".to_string(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
        }
    }

    fn test_state() -> AppState {
        AppState::new(test_config(), MemoryStorage::new())
    }

    #[test]
    fn test_ask_request_deserializes() {
        let request: AskRequest =
            serde_json::from_str(r#"{"prompt": "What is 2 + 2?"}"#).unwrap();
        assert_eq!(request.prompt, "What is 2 + 2?");
    }

    #[test]
    fn test_clean_prompt_trims() {
        let prompt = clean_prompt("  solve x^2 = 9  ").unwrap();
        assert_eq!(prompt, "solve x^2 = 9");
    }

    #[test]
    fn test_clean_prompt_rejects_blank() {
        assert!(matches!(clean_prompt(""), Err(Error::InvalidRequest(_))));
        assert!(matches!(clean_prompt("   "), Err(Error::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_admit_allows_anonymous() {
        let state = test_state();
        admit(&state, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_admit_spends_a_credit() {
        let state = test_state();
        state.storage.get_or_create_account("u_1").await.unwrap();
        state
            .storage
            .init_credits(
                "u_1",
                CreditBalance {
                    remaining: 2,
                    total: 2,
                    last_refill_date: Utc::now(),
                },
            )
            .await
            .unwrap();

        admit(&state, Some("u_1")).await.unwrap();

        let account = state.storage.get_account("u_1").await.unwrap().unwrap();
        assert_eq!(account.credits.unwrap().remaining, 1);
    }

    #[tokio::test]
    async fn test_admit_rejects_exhausted_credits() {
        let state = test_state();
        state.storage.get_or_create_account("u_1").await.unwrap();
        state
            .storage
            .init_credits(
                "u_1",
                CreditBalance {
                    remaining: 0,
                    total: 5,
                    last_refill_date: Utc::now(),
                },
            )
            .await
            .unwrap();

        let denied = admit(&state, Some("u_1")).await;
        assert!(matches!(denied, Err(Error::QuotaExhausted(_))));
    }

    #[tokio::test]
    async fn test_admit_starts_fresh_account_on_trial() {
        let state = test_state();

        admit(&state, Some("u_new")).await.unwrap();

        let account = state.storage.get_account("u_new").await.unwrap().unwrap();
        let subscription = account.subscription.unwrap();
        assert_eq!(subscription.questions_used, 1);
    }
}
