//! Account model for Homework Helper users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::subscription::Subscription;

/// A student account, keyed by the identity provider's opaque user id.
///
/// After migration an account carries *either* a credits block *or* a
/// subscription block as its active accounting mode; both may transiently
/// coexist while a migration is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Identity-provider user id.
    pub id: String,
    /// Credit ledger block, if the account is on the credits model.
    pub credits: Option<CreditBalance>,
    /// Subscription block, if the account is on the subscription model.
    pub subscription: Option<Subscription>,
    /// Whether a guest-local balance has already been merged into this
    /// account. Set at most once.
    pub guest_claimed: bool,
    /// When the account record was created.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Fresh account with neither accounting block initialized.
    #[must_use]
    pub fn new(id: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            credits: None,
            subscription: None,
            guest_claimed: false,
            created_at,
        }
    }

    /// Returns true if neither accounting block has been initialized yet.
    #[must_use]
    pub fn is_uninitialized(&self) -> bool {
        self.credits.is_none() && self.subscription.is_none()
    }
}

/// Credit ledger block on an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    /// Credits currently available.
    pub remaining: i64,
    /// Lifetime credits ever granted.
    pub total: i64,
    /// When credits were last topped up by the refill check.
    pub last_refill_date: DateTime<Utc>,
}

impl CreditBalance {
    /// Zeroed block stamped at `now`; grants are applied on top of this.
    #[must_use]
    pub fn starting(now: DateTime<Utc>) -> Self {
        Self {
            remaining: 0,
            total: 0,
            last_refill_date: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_is_uninitialized() {
        let account = Account::new("u_1".to_string(), Utc::now());
        assert!(account.is_uninitialized());
        assert!(!account.guest_claimed);
    }

    #[test]
    fn test_account_with_credits_is_initialized() {
        let mut account = Account::new("u_1".to_string(), Utc::now());
        account.credits = Some(CreditBalance {
            remaining: 20,
            total: 20,
            last_refill_date: Utc::now(),
        });
        assert!(!account.is_uninitialized());
    }

    #[test]
    fn test_starting_balance_is_zeroed() {
        let balance = CreditBalance::starting(Utc::now());
        assert_eq!(balance.remaining, 0);
        assert_eq!(balance.total, 0);
    }

    #[test]
    fn test_account_serde_round_trip() {
        let account = Account::new("u_42".to_string(), Utc::now());
        let json = serde_json::to_string(&account).unwrap();
        let parsed: Account = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, "u_42");
        assert!(parsed.credits.is_none());
    }
}
