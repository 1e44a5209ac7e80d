//! Account-facing routes.
//!
//! Everything a signed-in user can ask about their own account, plus the
//! public pricing views:
//! - `GET /me` - profile with credits and subscription state
//! - `GET /me/transactions` - newest-first ledger history
//! - `POST /me/claim-guest` - one-time guest balance reconciliation
//! - `GET /plans` - subscription plan catalog
//! - `GET /credit-options` - credit purchase options

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{Error, Result};
use crate::ledger::{self, guest::GuestClaim};
use crate::models::{Account, CreditSettings, CreditTransaction, SubscriptionSettings};
use crate::settings;
use crate::storage::{AccountStorage, Storage};
use crate::AppState;

/// How many ledger entries `GET /me/transactions` returns.
const HISTORY_LIMIT: i64 = 50;

/// Build the account router.
///
/// Routes:
/// - `GET /me` - the caller's account profile
/// - `GET /me/transactions` - the caller's ledger history
/// - `POST /me/claim-guest` - merge a guest balance into the account
/// - `GET /plans` - public subscription plans
/// - `GET /credit-options` - public credit purchase options
pub fn account_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(me))
        .route("/me/transactions", get(my_transactions))
        .route("/me/claim-guest", post(claim_guest))
        .route("/plans", get(plans))
        .route("/credit-options", get(credit_options))
}

/// Request body for `POST /me/claim-guest`.
#[derive(Debug, Deserialize)]
pub struct ClaimGuestRequest {
    /// The guest balance the client still holds.
    pub remaining: i64,
}

/// Handler for `GET /me`.
///
/// Creates the account on first sight, starts the trial subscription for a
/// brand-new account, and applies any credit refill that has come due.
async fn me(State(state): State<Arc<AppState>>, user: AuthUser) -> Result<Json<Account>> {
    let account = load_profile(state.storage.as_ref(), &user.account_id).await?;
    Ok(Json(account))
}

/// Handler for `GET /me/transactions`.
async fn my_transactions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<CreditTransaction>>> {
    let history = state
        .storage
        .list_transactions(&user.account_id, HISTORY_LIMIT)
        .await?;
    Ok(Json(history))
}

/// Handler for `POST /me/claim-guest`.
///
/// Merges the client's reported guest balance into the account ledger,
/// exactly once per account.
async fn claim_guest(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<ClaimGuestRequest>,
) -> Result<Json<GuestClaim>> {
    info!(
        account_id = %user.account_id,
        remaining = request.remaining,
        "guest balance claim"
    );
    let claim =
        ledger::guest::claim_guest_credits(state.storage.as_ref(), &user.account_id, request.remaining)
            .await?;
    Ok(Json(claim))
}

/// Handler for `GET /plans`.
async fn plans(State(state): State<Arc<AppState>>) -> Result<Json<SubscriptionSettings>> {
    let settings = settings::subscription_settings(state.storage.as_ref()).await?;
    Ok(Json(settings))
}

/// Handler for `GET /credit-options`.
async fn credit_options(State(state): State<Arc<AppState>>) -> Result<Json<CreditSettings>> {
    let settings = settings::credit_settings(state.storage.as_ref()).await?;
    Ok(Json(settings))
}

// ====== profile helpers ======

/// Fetch the caller's account, initializing what needs initializing.
///
/// A brand-new account is put on the default plan's trial. An account on
/// the credits model gets its periodic refill checked while we are here,
/// so the profile the client renders is never stale by a refill.
async fn load_profile(storage: &dyn Storage, account_id: &str) -> Result<Account> {
    let account = storage.get_or_create_account(account_id).await?;

    if account.is_uninitialized() {
        ledger::subscription::initialize_user_subscription(storage, account_id).await?;
    }
    if account.credits.is_some() {
        ledger::check_and_refill_credits(storage, account_id).await?;
    }

    storage
        .get_account(account_id)
        .await?
        .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    use crate::models::{CreditBalance, PlanId, SubscriptionStatus};
    use crate::storage::MemoryStorage;

    #[test]
    fn test_claim_guest_request_deserializes() {
        let request: ClaimGuestRequest = serde_json::from_str(r#"{"remaining": 3}"#).unwrap();
        assert_eq!(request.remaining, 3);
    }

    #[tokio::test]
    async fn test_load_profile_starts_trial_for_new_account() {
        let storage = MemoryStorage::new();

        let account = load_profile(&storage, "u_new").await.unwrap();

        let subscription = account.subscription.unwrap();
        assert_eq!(subscription.plan, PlanId::Free);
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        assert_eq!(subscription.questions_used, 0);
        assert!(account.credits.is_none());
    }

    #[tokio::test]
    async fn test_load_profile_applies_due_refill() {
        let storage = MemoryStorage::new();
        storage.get_or_create_account("u_1").await.unwrap();
        storage
            .init_credits(
                "u_1",
                CreditBalance {
                    remaining: 1,
                    total: 20,
                    last_refill_date: Utc::now() - Duration::days(8),
                },
            )
            .await
            .unwrap();

        let account = load_profile(&storage, "u_1").await.unwrap();

        // Default settings refill 5 credits every 7 days.
        assert_eq!(account.credits.unwrap().remaining, 6);
    }

    #[tokio::test]
    async fn test_load_profile_leaves_fresh_balance_alone() {
        let storage = MemoryStorage::new();
        storage.get_or_create_account("u_1").await.unwrap();
        storage
            .init_credits(
                "u_1",
                CreditBalance {
                    remaining: 4,
                    total: 20,
                    last_refill_date: Utc::now(),
                },
            )
            .await
            .unwrap();

        let account = load_profile(&storage, "u_1").await.unwrap();

        assert_eq!(account.credits.unwrap().remaining, 4);
        assert!(account.subscription.is_none());
    }
}
