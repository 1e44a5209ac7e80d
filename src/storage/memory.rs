//! In-memory storage implementation for testing and databaseless runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{
    error::Result,
    models::{
        Account, BalanceChange, CreditBalance, CreditSettings, CreditTransaction, Feedback,
        Subscription, SubscriptionSettings, SubscriptionStatus, UsageLogEntry,
    },
    storage::{clamp_balance, AccountStorage, FeedbackStorage, SettingsStorage, UsageStorage},
};

/// In-memory storage backend.
///
/// Every mutation takes one write-lock scope, which gives the same
/// no-lost-update behavior the SQL backend gets from single conditional
/// statements.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    accounts: RwLock<HashMap<String, Account>>,
    transactions: RwLock<HashMap<String, Vec<CreditTransaction>>>,
    credit_settings: RwLock<Option<CreditSettings>>,
    subscription_settings: RwLock<Option<SubscriptionSettings>>,
    feedback: RwLock<Vec<Feedback>>,
    usage: RwLock<Vec<UsageLogEntry>>,
}

impl MemoryStorage {
    /// Create a new empty in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all stored data (useful for test cleanup).
    pub fn clear(&self) {
        self.accounts.write().clear();
        self.transactions.write().clear();
        *self.credit_settings.write() = None;
        *self.subscription_settings.write() = None;
        self.feedback.write().clear();
        self.usage.write().clear();
    }

    /// Get the number of stored accounts.
    pub fn account_count(&self) -> usize {
        self.accounts.read().len()
    }

    /// Get the number of ledger entries recorded for an account.
    pub fn transaction_count(&self, account_id: &str) -> usize {
        self.transactions
            .read()
            .get(account_id)
            .map_or(0, Vec::len)
    }
}

fn take_newest<T: Clone>(items: &[T], limit: i64) -> Vec<T> {
    let mut out: Vec<T> = items.iter().rev().cloned().collect();
    out.truncate(limit.max(0) as usize);
    out
}

#[async_trait]
impl AccountStorage for MemoryStorage {
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        Ok(self.accounts.read().get(account_id).cloned())
    }

    async fn get_or_create_account(&self, account_id: &str) -> Result<Account> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .entry(account_id.to_string())
            .or_insert_with(|| Account::new(account_id.to_string(), Utc::now()));
        Ok(account.clone())
    }

    async fn list_accounts(&self, limit: i64) -> Result<Vec<Account>> {
        let accounts = self.accounts.read();
        let mut all: Vec<Account> = accounts.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit.max(0) as usize);
        Ok(all)
    }

    async fn init_credits(&self, account_id: &str, balance: CreditBalance) -> Result<bool> {
        let mut accounts = self.accounts.write();
        match accounts.get_mut(account_id) {
            Some(account) if account.credits.is_none() => {
                account.credits = Some(balance);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn adjust_credits(
        &self,
        account_id: &str,
        amount: i64,
        cap: Option<i64>,
    ) -> Result<Option<BalanceChange>> {
        let mut accounts = self.accounts.write();
        let Some(credits) = accounts
            .get_mut(account_id)
            .and_then(|account| account.credits.as_mut())
        else {
            return Ok(None);
        };

        let previous_balance = credits.remaining;
        credits.remaining = clamp_balance(previous_balance + amount, cap);
        if amount > 0 {
            credits.total += amount;
        }

        Ok(Some(BalanceChange {
            previous_balance,
            new_balance: credits.remaining,
        }))
    }

    async fn debit_credits(&self, account_id: &str, amount: i64) -> Result<Option<BalanceChange>> {
        let mut accounts = self.accounts.write();
        let Some(credits) = accounts
            .get_mut(account_id)
            .and_then(|account| account.credits.as_mut())
        else {
            return Ok(None);
        };

        if credits.remaining < amount {
            return Ok(None);
        }

        let previous_balance = credits.remaining;
        credits.remaining -= amount;

        Ok(Some(BalanceChange {
            previous_balance,
            new_balance: credits.remaining,
        }))
    }

    async fn apply_refill(
        &self,
        account_id: &str,
        amount: i64,
        cap: i64,
        previous_refill: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<BalanceChange>> {
        let mut accounts = self.accounts.write();
        let Some(credits) = accounts
            .get_mut(account_id)
            .and_then(|account| account.credits.as_mut())
        else {
            return Ok(None);
        };

        // Compare-and-swap on the refill stamp.
        if credits.last_refill_date != previous_refill {
            return Ok(None);
        }

        let previous_balance = credits.remaining;
        credits.remaining = clamp_balance(previous_balance + amount, Some(cap));
        if amount > 0 {
            credits.total += amount;
        }
        credits.last_refill_date = now;

        Ok(Some(BalanceChange {
            previous_balance,
            new_balance: credits.remaining,
        }))
    }

    async fn clear_credits(&self, account_id: &str) -> Result<()> {
        let mut accounts = self.accounts.write();
        if let Some(account) = accounts.get_mut(account_id) {
            account.credits = None;
        }
        Ok(())
    }

    async fn init_subscription(
        &self,
        account_id: &str,
        subscription: Subscription,
    ) -> Result<bool> {
        let mut accounts = self.accounts.write();
        match accounts.get_mut(account_id) {
            Some(account) if account.subscription.is_none() => {
                account.subscription = Some(subscription);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_subscription(&self, account_id: &str, subscription: Subscription) -> Result<()> {
        let mut accounts = self.accounts.write();
        if let Some(account) = accounts.get_mut(account_id) {
            account.subscription = Some(subscription);
        }
        Ok(())
    }

    async fn consume_question(&self, account_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut accounts = self.accounts.write();
        let Some(subscription) = accounts
            .get_mut(account_id)
            .and_then(|account| account.subscription.as_mut())
        else {
            return Ok(false);
        };

        if !subscription.can_ask(now) {
            return Ok(false);
        }

        subscription.questions_used += 1;
        Ok(true)
    }

    async fn reset_daily_questions(&self) -> Result<u64> {
        let mut accounts = self.accounts.write();
        let mut touched = 0;
        for account in accounts.values_mut() {
            if let Some(subscription) = account.subscription.as_mut() {
                if subscription.status == SubscriptionStatus::Active {
                    subscription.questions_used = 0;
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }

    async fn claim_guest_once(&self, account_id: &str) -> Result<bool> {
        let mut accounts = self.accounts.write();
        match accounts.get_mut(account_id) {
            Some(account) if !account.guest_claimed => {
                account.guest_claimed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_transaction(&self, transaction: &CreditTransaction) -> Result<()> {
        self.transactions
            .write()
            .entry(transaction.account_id.clone())
            .or_default()
            .push(transaction.clone());
        Ok(())
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<CreditTransaction>> {
        let transactions = self.transactions.read();
        Ok(transactions
            .get(account_id)
            .map(|entries| take_newest(entries, limit))
            .unwrap_or_default())
    }
}

#[async_trait]
impl SettingsStorage for MemoryStorage {
    async fn get_credit_settings(&self) -> Result<Option<CreditSettings>> {
        Ok(self.credit_settings.read().clone())
    }

    async fn init_credit_settings(&self, settings: &CreditSettings) -> Result<bool> {
        let mut stored = self.credit_settings.write();
        if stored.is_none() {
            *stored = Some(settings.clone());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn put_credit_settings(&self, settings: &CreditSettings) -> Result<()> {
        *self.credit_settings.write() = Some(settings.clone());
        Ok(())
    }

    async fn get_subscription_settings(&self) -> Result<Option<SubscriptionSettings>> {
        Ok(self.subscription_settings.read().clone())
    }

    async fn init_subscription_settings(&self, settings: &SubscriptionSettings) -> Result<bool> {
        let mut stored = self.subscription_settings.write();
        if stored.is_none() {
            *stored = Some(settings.clone());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn put_subscription_settings(&self, settings: &SubscriptionSettings) -> Result<()> {
        *self.subscription_settings.write() = Some(settings.clone());
        Ok(())
    }
}

#[async_trait]
impl FeedbackStorage for MemoryStorage {
    async fn record_feedback(&self, feedback: &Feedback) -> Result<()> {
        self.feedback.write().push(feedback.clone());
        Ok(())
    }

    async fn list_feedback(&self, limit: i64) -> Result<Vec<Feedback>> {
        Ok(take_newest(&self.feedback.read(), limit))
    }
}

#[async_trait]
impl UsageStorage for MemoryStorage {
    async fn record_usage(&self, entry: &UsageLogEntry) -> Result<()> {
        self.usage.write().push(entry.clone());
        Ok(())
    }

    async fn list_usage(&self, limit: i64) -> Result<Vec<UsageLogEntry>> {
        Ok(take_newest(&self.usage.read(), limit))
    }
}
