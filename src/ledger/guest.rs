//! Guest balance logic and its sign-in reconciliation.
//!
//! Guests are tracked by a one-integer counter in the client's local
//! storage, never by a server account. [`GuestStore`] is that counter's
//! shape; the functions over it mirror the server ledger semantics so both
//! paths refuse the same requests. When a guest signs in, the client
//! presents its remaining counter once and [`claim_guest_credits`] merges it
//! into the new account's ledger, guarded by a first-claim flag.

use serde::Serialize;
use tracing::info;

use crate::{
    error::Result,
    models::CreditSettings,
    settings,
    storage::{AccountStorage, Storage},
};

/// One-integer counter store, the shape of the client's local storage.
pub trait GuestStore {
    /// Read the stored counter, if any.
    fn get(&self) -> Option<i64>;
    /// Overwrite the stored counter.
    fn set(&mut self, value: i64);
}

/// In-memory guest store for tests and embedded clients.
#[derive(Debug, Default)]
pub struct MemoryGuestStore {
    value: Option<i64>,
}

impl MemoryGuestStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GuestStore for MemoryGuestStore {
    fn get(&self) -> Option<i64> {
        self.value
    }

    fn set(&mut self, value: i64) {
        self.value = Some(value);
    }
}

/// Read the guest balance, seeding it from settings on first touch.
pub fn guest_credits(store: &mut dyn GuestStore, settings: &CreditSettings) -> i64 {
    match store.get() {
        Some(value) => value,
        None => {
            store.set(settings.guest_credits);
            settings.guest_credits
        }
    }
}

/// Spend guest credits; false and unchanged when not enough remain.
pub fn use_guest_credits(
    store: &mut dyn GuestStore,
    settings: &CreditSettings,
    amount: i64,
) -> bool {
    if amount < 1 {
        return false;
    }

    let remaining = guest_credits(store, settings);
    if remaining < amount {
        return false;
    }

    store.set(remaining - amount);
    true
}

/// Outcome of a guest reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GuestClaim {
    /// The reported balance was merged into the account ledger.
    Merged { granted: i64 },
    /// A previous claim already consumed this account's merge.
    AlreadyClaimed,
}

/// Merge a signed-in user's reported guest balance into their ledger.
///
/// The first claim per account wins; later calls report
/// [`GuestClaim::AlreadyClaimed`] and change nothing. The reported balance
/// is capped at the configured guest grant, since a legitimate guest counter
/// only ever counts down from there. The merge goes through the non-admin
/// grant path, so the usual balance ceiling applies too.
pub async fn claim_guest_credits(
    storage: &dyn Storage,
    account_id: &str,
    remaining: i64,
) -> Result<GuestClaim> {
    storage.get_or_create_account(account_id).await?;
    if !storage.claim_guest_once(account_id).await? {
        return Ok(GuestClaim::AlreadyClaimed);
    }

    let settings = settings::credit_settings(storage).await?;
    let granted = remaining.min(settings.guest_credits).max(0);
    if granted > 0 {
        super::add_credits(
            storage,
            account_id,
            granted,
            false,
            Some("guest_reconciliation".to_string()),
        )
        .await?;
    }

    info!(account_id, granted, "merged guest balance into account");
    Ok(GuestClaim::Merged { granted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{AccountStorage, MemoryStorage};

    #[test]
    fn test_guest_credits_seeds_empty_store() {
        let mut store = MemoryGuestStore::new();
        let settings = CreditSettings::default();

        assert_eq!(guest_credits(&mut store, &settings), 5);
        assert_eq!(store.get(), Some(5));
    }

    #[test]
    fn test_guest_credits_keeps_existing_value() {
        let mut store = MemoryGuestStore::new();
        store.set(2);

        assert_eq!(guest_credits(&mut store, &CreditSettings::default()), 2);
    }

    #[test]
    fn test_use_guest_credits_spends() {
        let mut store = MemoryGuestStore::new();
        let settings = CreditSettings::default();

        assert!(use_guest_credits(&mut store, &settings, 1));
        assert_eq!(store.get(), Some(4));
    }

    #[test]
    fn test_use_guest_credits_insufficient() {
        let mut store = MemoryGuestStore::new();
        store.set(3);

        assert!(!use_guest_credits(&mut store, &CreditSettings::default(), 5));
        assert_eq!(store.get(), Some(3));
    }

    #[test]
    fn test_use_guest_credits_rejects_non_positive() {
        let mut store = MemoryGuestStore::new();
        store.set(3);

        assert!(!use_guest_credits(&mut store, &CreditSettings::default(), 0));
        assert!(!use_guest_credits(&mut store, &CreditSettings::default(), -2));
        assert_eq!(store.get(), Some(3));
    }

    #[tokio::test]
    async fn test_claim_merges_exactly_once() {
        let storage = MemoryStorage::new();

        let first = claim_guest_credits(&storage, "u_1", 3).await.unwrap();
        assert_eq!(first, GuestClaim::Merged { granted: 3 });

        let account = storage.get_account("u_1").await.unwrap().unwrap();
        assert_eq!(account.credits.unwrap().remaining, 3);

        let second = claim_guest_credits(&storage, "u_1", 3).await.unwrap();
        assert_eq!(second, GuestClaim::AlreadyClaimed);

        let account = storage.get_account("u_1").await.unwrap().unwrap();
        assert_eq!(account.credits.unwrap().remaining, 3);

        let history = storage.list_transactions("u_1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].note.as_deref(), Some("guest_reconciliation"));
    }

    #[tokio::test]
    async fn test_claim_caps_reported_balance() {
        let storage = MemoryStorage::new();

        let claim = claim_guest_credits(&storage, "u_1", 999).await.unwrap();
        assert_eq!(claim, GuestClaim::Merged { granted: 5 });
    }

    #[tokio::test]
    async fn test_claim_with_empty_balance_still_consumes() {
        let storage = MemoryStorage::new();

        let first = claim_guest_credits(&storage, "u_1", 0).await.unwrap();
        assert_eq!(first, GuestClaim::Merged { granted: 0 });
        assert!(storage
            .list_transactions("u_1", 10)
            .await
            .unwrap()
            .is_empty());

        let second = claim_guest_credits(&storage, "u_1", 5).await.unwrap();
        assert_eq!(second, GuestClaim::AlreadyClaimed);
    }
}
