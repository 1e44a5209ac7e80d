//! Credit ledger operations: spending, grants, refills, and the admission
//! gate used by the chat routes.
//!
//! Every balance mutation happens as one atomic storage operation and then
//! appends an immutable transaction record, so the ledger history always
//! reconstructs the balance.

pub mod guest;
pub mod subscription;

use chrono::Utc;
use tracing::debug;

use crate::{
    error::{Error, Result},
    models::{BalanceChange, CreditBalance, CreditTransaction, TransactionKind},
    settings,
    storage::{storage_error, AccountStorage, Storage},
};

/// Spend `amount` credits from an account's balance.
///
/// Returns `Ok(false)` and leaves the balance untouched when the account has
/// no credits block or not enough credits remain. A successful spend appends
/// a `use` ledger entry.
pub async fn use_credits(storage: &dyn Storage, account_id: &str, amount: i64) -> Result<bool> {
    if amount < 1 {
        return Err(Error::InvalidRequest(format!(
            "amount must be at least 1, got {amount}"
        )));
    }

    let Some(change) = storage.debit_credits(account_id, amount).await? else {
        return Ok(false);
    };

    let tx = CreditTransaction::record(account_id, TransactionKind::Use, -amount, change, None);
    storage.record_transaction(&tx).await?;
    Ok(true)
}

/// Grant credits to an account, or take them back with a negative `amount`.
///
/// Non-admin calls clamp the balance to `[0, max_credits]`; admin calls keep
/// the zero floor but may exceed the ceiling. `total` grows only for
/// positive amounts. A fresh account gets its credits block initialized at
/// zero first, so the grant lands in the same call.
pub async fn add_credits(
    storage: &dyn Storage,
    account_id: &str,
    amount: i64,
    is_admin: bool,
    note: Option<String>,
) -> Result<BalanceChange> {
    storage.get_or_create_account(account_id).await?;
    if storage
        .init_credits(account_id, CreditBalance::starting(Utc::now()))
        .await?
    {
        debug!(account_id, "initialized credits block for first grant");
    }

    let cap = if is_admin {
        None
    } else {
        Some(settings::credit_settings(storage).await?.max_credits)
    };

    let change = storage
        .adjust_credits(account_id, amount, cap)
        .await?
        .ok_or_else(|| storage_error("credits block missing after init"))?;

    let kind = if amount < 0 {
        TransactionKind::Remove
    } else {
        TransactionKind::Add
    };
    let tx = CreditTransaction::record(account_id, kind, amount, change, note);
    storage.record_transaction(&tx).await?;
    Ok(change)
}

/// Opportunistic refill check.
///
/// When at least `refill_period_days` whole days have elapsed since the last
/// refill, adds `refill_amount` (clamped to `max_credits`), stamps the
/// refill date, and appends a `refill` ledger entry. Returns the applied
/// change, or `None` when no refill was due or a concurrent check already
/// applied it.
pub async fn check_and_refill_credits(
    storage: &dyn Storage,
    account_id: &str,
) -> Result<Option<BalanceChange>> {
    let Some(account) = storage.get_account(account_id).await? else {
        return Ok(None);
    };
    let Some(balance) = account.credits else {
        return Ok(None);
    };

    let settings = settings::credit_settings(storage).await?;
    let now = Utc::now();
    let elapsed_days = (now - balance.last_refill_date).num_days();
    if elapsed_days < settings.refill_period_days {
        return Ok(None);
    }

    let Some(change) = storage
        .apply_refill(
            account_id,
            settings.refill_amount,
            settings.max_credits,
            balance.last_refill_date,
            now,
        )
        .await?
    else {
        // Another request applied the refill between our read and the swap.
        return Ok(None);
    };

    let tx = CreditTransaction::record(
        account_id,
        TransactionKind::Refill,
        settings.refill_amount,
        change,
        None,
    );
    storage.record_transaction(&tx).await?;
    debug!(
        account_id,
        amount = settings.refill_amount,
        "applied credit refill"
    );
    Ok(Some(change))
}

/// Admission gate for the chat routes.
///
/// Subscription accounts go through the daily question quota; credit
/// accounts spend one credit; a fresh account is started on the default
/// plan's trial first and then gated like any subscriber.
pub async fn admit_question(storage: &dyn Storage, account_id: &str) -> Result<bool> {
    let account = storage.get_or_create_account(account_id).await?;

    if account.subscription.is_some() {
        return subscription::use_question(storage, account_id).await;
    }
    if account.credits.is_some() {
        return use_credits(storage, account_id, 1).await;
    }

    subscription::initialize_user_subscription(storage, account_id).await?;
    subscription::use_question(storage, account_id).await
}
