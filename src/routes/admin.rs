//! Admin surface.
//!
//! Operational endpoints behind the static `x-admin-token` header:
//! - account inspection and ledger history
//! - credit grants and plan changes for support cases
//! - the one-way credits-to-subscription migration
//! - live settings patches
//! - the scheduled daily question reset
//! - feedback and usage log review
//!
//! Every handler takes the [`AdminAuth`] extractor, so a bad or missing
//! token is rejected before any storage work happens.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AdminAuth;
use crate::error::{Error, Result};
use crate::ledger;
use crate::models::{
    Account, BalanceChange, CreditSettings, CreditSettingsPatch, CreditTransaction, Feedback,
    PlanId, Subscription, SubscriptionSettings, SubscriptionSettingsPatch, SubscriptionStatus,
    UsageLogEntry,
};
use crate::settings;
use crate::storage::{AccountStorage, FeedbackStorage, Storage, UsageStorage};
use crate::AppState;

/// Row cap for the admin list endpoints.
const LIST_LIMIT: i64 = 200;

/// Build the admin router.
///
/// Routes:
/// - `GET  /accounts` - newest accounts
/// - `GET  /accounts/{id}` - one account
/// - `GET  /accounts/{id}/transactions` - one account's ledger history
/// - `POST /accounts/{id}/credits` - grant or remove credits
/// - `POST /accounts/{id}/subscription` - set the plan and status
/// - `POST /accounts/{id}/migrate` - migrate off the credits model
/// - `PUT  /settings/credits` - patch credit settings
/// - `PUT  /settings/subscriptions` - patch subscription settings
/// - `POST /jobs/reset-daily-questions` - zero the daily counters
/// - `GET  /feedback` - recent feedback entries
/// - `GET  /usage` - recent usage log entries
pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts", get(list_accounts))
        .route("/accounts/{id}", get(show_account))
        .route("/accounts/{id}/transactions", get(account_transactions))
        .route("/accounts/{id}/credits", post(grant_credits))
        .route("/accounts/{id}/subscription", post(set_subscription))
        .route("/accounts/{id}/migrate", post(migrate_account))
        .route("/settings/credits", put(patch_credit_settings))
        .route("/settings/subscriptions", put(patch_subscription_settings))
        .route("/jobs/reset-daily-questions", post(reset_daily_questions))
        .route("/feedback", get(list_feedback))
        .route("/usage", get(list_usage))
}

/// Request body for `POST /accounts/{id}/credits`.
///
/// A negative amount takes credits back. Admin grants skip the balance
/// ceiling but keep the zero floor.
#[derive(Debug, Deserialize)]
pub struct GrantCreditsRequest {
    pub amount: i64,
}

/// Request body for `POST /accounts/{id}/subscription`.
#[derive(Debug, Deserialize)]
pub struct SetSubscriptionRequest {
    pub plan: PlanId,
    /// Defaults to `active` when omitted.
    #[serde(default)]
    pub status: Option<SubscriptionStatus>,
}

/// Response body for `POST /jobs/reset-daily-questions`.
#[derive(Debug, Serialize)]
pub struct ResetReport {
    pub accounts_reset: u64,
}

/// Handler for `GET /accounts`.
async fn list_accounts(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Account>>> {
    let accounts = state.storage.list_accounts(LIST_LIMIT).await?;
    Ok(Json(accounts))
}

/// Handler for `GET /accounts/{id}`.
async fn show_account(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Account>> {
    let account = require_account(state.storage.as_ref(), &id).await?;
    Ok(Json(account))
}

/// Handler for `GET /accounts/{id}/transactions`.
async fn account_transactions(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CreditTransaction>>> {
    require_account(state.storage.as_ref(), &id).await?;
    let history = state.storage.list_transactions(&id, LIST_LIMIT).await?;
    Ok(Json(history))
}

/// Handler for `POST /accounts/{id}/credits`.
async fn grant_credits(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<GrantCreditsRequest>,
) -> Result<Json<BalanceChange>> {
    info!(account_id = %id, amount = request.amount, "admin credit grant");
    let change =
        ledger::add_credits(state.storage.as_ref(), &id, request.amount, true, None).await?;
    Ok(Json(change))
}

/// Handler for `POST /accounts/{id}/subscription`.
async fn set_subscription(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<SetSubscriptionRequest>,
) -> Result<Json<Subscription>> {
    let status = request.status.unwrap_or(SubscriptionStatus::Active);
    info!(
        account_id = %id,
        plan = request.plan.as_str(),
        "admin subscription change"
    );
    let subscription = ledger::subscription::update_user_subscription(
        state.storage.as_ref(),
        &id,
        request.plan,
        status,
    )
    .await?;
    Ok(Json(subscription))
}

/// Handler for `POST /accounts/{id}/migrate`.
async fn migrate_account(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Subscription>> {
    require_account(state.storage.as_ref(), &id).await?;
    let subscription =
        ledger::subscription::migrate_from_credits_to_subscription(state.storage.as_ref(), &id)
            .await?;
    Ok(Json(subscription))
}

/// Handler for `PUT /settings/credits`.
async fn patch_credit_settings(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Json(patch): Json<CreditSettingsPatch>,
) -> Result<Json<CreditSettings>> {
    let updated = settings::update_credit_settings(state.storage.as_ref(), patch).await?;
    info!("updated credit settings");
    Ok(Json(updated))
}

/// Handler for `PUT /settings/subscriptions`.
async fn patch_subscription_settings(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
    Json(patch): Json<SubscriptionSettingsPatch>,
) -> Result<Json<SubscriptionSettings>> {
    let updated = settings::update_subscription_settings(state.storage.as_ref(), patch).await?;
    info!("updated subscription settings");
    Ok(Json(updated))
}

/// Handler for `POST /jobs/reset-daily-questions`.
async fn reset_daily_questions(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ResetReport>> {
    let accounts_reset = ledger::subscription::reset_daily_questions(state.storage.as_ref()).await?;
    Ok(Json(ResetReport { accounts_reset }))
}

/// Handler for `GET /feedback`.
async fn list_feedback(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Feedback>>> {
    let entries = state.storage.list_feedback(LIST_LIMIT).await?;
    Ok(Json(entries))
}

/// Handler for `GET /usage`.
async fn list_usage(
    _admin: AdminAuth,
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UsageLogEntry>>> {
    let entries = state.storage.list_usage(LIST_LIMIT).await?;
    Ok(Json(entries))
}

// ====== lookup helpers ======

/// Fetch an account or fail with a 404, never creating one as a side
/// effect of an admin read.
async fn require_account(storage: &dyn Storage, account_id: &str) -> Result<Account> {
    storage
        .get_account(account_id)
        .await?
        .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::storage::MemoryStorage;

    #[test]
    fn test_grant_request_deserializes() {
        let request: GrantCreditsRequest = serde_json::from_str(r#"{"amount": -20}"#).unwrap();
        assert_eq!(request.amount, -20);
    }

    #[test]
    fn test_subscription_request_defaults_status() {
        let request: SetSubscriptionRequest =
            serde_json::from_str(r#"{"plan": "tier1"}"#).unwrap();
        assert_eq!(request.plan, PlanId::Tier1);
        assert!(request.status.is_none());
    }

    #[test]
    fn test_subscription_request_with_status() {
        let request: SetSubscriptionRequest =
            serde_json::from_str(r#"{"plan": "tier2", "status": "cancelled"}"#).unwrap();
        assert_eq!(request.status, Some(SubscriptionStatus::Cancelled));
    }

    #[test]
    fn test_reset_report_serializes() {
        let json = serde_json::to_value(ResetReport { accounts_reset: 7 }).unwrap();
        assert_eq!(json["accounts_reset"], 7);
    }

    #[tokio::test]
    async fn test_require_account_missing_is_not_found() {
        let storage = MemoryStorage::new();

        let missing = require_account(&storage, "u_ghost").await;
        assert!(matches!(missing, Err(Error::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_require_account_never_creates() {
        let storage = MemoryStorage::new();

        require_account(&storage, "u_ghost").await.ok();
        assert!(storage.get_account("u_ghost").await.unwrap().is_none());

        storage.get_or_create_account("u_real").await.unwrap();
        let account = require_account(&storage, "u_real").await.unwrap();
        assert_eq!(account.id, "u_real");
    }
}
