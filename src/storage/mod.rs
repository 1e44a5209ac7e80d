//! Storage abstraction for accounts, ledgers, settings, and feedback.
//!
//! This module provides a trait-based storage abstraction with two implementations:
//! - `SqlxStorage`: PostgreSQL storage via SQLx (feature: `sqlx-storage`)
//! - `MemoryStorage`: In-memory storage for testing and databaseless runs
//!   (feature: `memory-storage`)
//!
//! Every balance or quota mutation is a single atomic operation inside the
//! backend (one conditional statement in SQL, one lock scope in memory), so
//! two racing requests can never lose an update on the same account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{Result, StorageError};
use crate::models::{
    Account, BalanceChange, CreditBalance, CreditSettings, CreditTransaction, Feedback,
    Subscription, SubscriptionSettings, UsageLogEntry,
};

#[cfg(feature = "sqlx-storage")]
mod sqlx_impl;
#[cfg(feature = "sqlx-storage")]
pub use sqlx_impl::SqlxStorage;

#[cfg(feature = "memory-storage")]
mod memory;
#[cfg(feature = "memory-storage")]
pub use memory::MemoryStorage;

/// Storage trait for account and ledger operations.
#[async_trait]
pub trait AccountStorage: Send + Sync {
    /// Get an account by its identity-provider id.
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>>;

    /// Get an account, creating an empty record on first sight.
    async fn get_or_create_account(&self, account_id: &str) -> Result<Account>;

    /// List accounts, newest first.
    async fn list_accounts(&self, limit: i64) -> Result<Vec<Account>>;

    /// Initialize the credits block if the account has none yet.
    ///
    /// Returns true if the block was created by this call.
    async fn init_credits(&self, account_id: &str, balance: CreditBalance) -> Result<bool>;

    /// Atomically add `amount` to the balance, flooring at 0 and capping at
    /// `cap` when given. `total` grows only for positive amounts.
    ///
    /// Returns `None` if the account has no credits block.
    async fn adjust_credits(
        &self,
        account_id: &str,
        amount: i64,
        cap: Option<i64>,
    ) -> Result<Option<BalanceChange>>;

    /// Atomically subtract `amount` if and only if enough credits remain.
    ///
    /// Returns `None` when the balance is insufficient or the account has no
    /// credits block; the balance is left untouched in both cases.
    async fn debit_credits(&self, account_id: &str, amount: i64) -> Result<Option<BalanceChange>>;

    /// Apply a refill: add `amount` (floored at 0, capped at `cap`) and stamp
    /// `last_refill_date = now`, but only if the stored refill date still
    /// equals `previous_refill`. The compare-and-swap makes concurrent
    /// refill checks apply at most once.
    async fn apply_refill(
        &self,
        account_id: &str,
        amount: i64,
        cap: i64,
        previous_refill: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<BalanceChange>>;

    /// Null out the credits block (end of a migration).
    async fn clear_credits(&self, account_id: &str) -> Result<()>;

    /// Initialize the subscription block if the account has none yet.
    ///
    /// Returns true if the block was created by this call.
    async fn init_subscription(&self, account_id: &str, subscription: Subscription)
        -> Result<bool>;

    /// Overwrite the subscription block.
    async fn set_subscription(&self, account_id: &str, subscription: Subscription) -> Result<()>;

    /// Admission gate: atomically increment `questions_used` if the
    /// subscription is active, inside its window, and under its quota.
    ///
    /// Returns false (and changes nothing) in every other case, including a
    /// missing subscription block.
    async fn consume_question(&self, account_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Zero `questions_used` on every active subscription.
    ///
    /// Returns the number of accounts touched. Idempotent.
    async fn reset_daily_questions(&self) -> Result<u64>;

    /// Flip the guest-claimed flag, returning true only for the first call.
    async fn claim_guest_once(&self, account_id: &str) -> Result<bool>;

    /// Append an immutable ledger entry.
    async fn record_transaction(&self, transaction: &CreditTransaction) -> Result<()>;

    /// List ledger entries for an account, newest first.
    async fn list_transactions(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<CreditTransaction>>;
}

/// Storage trait for the global settings singletons.
#[async_trait]
pub trait SettingsStorage: Send + Sync {
    /// Read the credit settings document, if present.
    async fn get_credit_settings(&self) -> Result<Option<CreditSettings>>;

    /// Write the credit settings document only if absent.
    ///
    /// Returns true if this call created it. Concurrent callers converge on
    /// one stored value.
    async fn init_credit_settings(&self, settings: &CreditSettings) -> Result<bool>;

    /// Overwrite the credit settings document.
    async fn put_credit_settings(&self, settings: &CreditSettings) -> Result<()>;

    /// Read the subscription settings document, if present.
    async fn get_subscription_settings(&self) -> Result<Option<SubscriptionSettings>>;

    /// Write the subscription settings document only if absent.
    async fn init_subscription_settings(&self, settings: &SubscriptionSettings) -> Result<bool>;

    /// Overwrite the subscription settings document.
    async fn put_subscription_settings(&self, settings: &SubscriptionSettings) -> Result<()>;
}

/// Storage trait for feedback entries.
#[async_trait]
pub trait FeedbackStorage: Send + Sync {
    /// Append a feedback entry.
    async fn record_feedback(&self, feedback: &Feedback) -> Result<()>;

    /// List feedback entries, newest first.
    async fn list_feedback(&self, limit: i64) -> Result<Vec<Feedback>>;
}

/// Storage trait for usage log entries.
#[async_trait]
pub trait UsageStorage: Send + Sync {
    /// Append a usage log entry.
    async fn record_usage(&self, entry: &UsageLogEntry) -> Result<()>;

    /// List usage entries, newest first.
    async fn list_usage(&self, limit: i64) -> Result<Vec<UsageLogEntry>>;
}

/// Combined storage trait for convenience.
///
/// This trait is object-safe and can be used with `Box<dyn Storage>` for
/// dynamic dispatch, or with concrete types for static dispatch.
pub trait Storage:
    AccountStorage + SettingsStorage + FeedbackStorage + UsageStorage + Send + Sync
{
}

impl<T: AccountStorage + SettingsStorage + FeedbackStorage + UsageStorage + Send + Sync> Storage
    for T
{
}

/// Helper function to create a storage error from a string.
pub fn storage_error(msg: impl Into<String>) -> StorageError {
    StorageError::Other(msg.into())
}

/// Clamp a candidate balance into `[0, cap]` (or `[0, ∞)` without a cap).
///
/// The floor is applied after the cap; the result is never negative, even
/// for a negative `cap`.
pub(crate) fn clamp_balance(candidate: i64, cap: Option<i64>) -> i64 {
    let capped = match cap {
        Some(cap) => candidate.min(cap),
        None => candidate,
    };
    capped.max(0)
}
