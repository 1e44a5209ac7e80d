//! Subscription lifecycle: trial start, plan changes, the daily question
//! gate, and the one-way migration off the credits model.

use chrono::{Months, Utc};
use tracing::info;

use crate::{
    error::Result,
    models::{
        BalanceChange, CreditTransaction, PlanId, Subscription, SubscriptionSettings,
        SubscriptionStatus, TransactionKind,
    },
    settings,
    storage::{AccountStorage, Storage},
};

/// Lifetime credit total that migrates an account to [`PlanId::Tier2`].
const TIER2_THRESHOLD: i64 = 500;
/// Lifetime credit total that migrates an account to [`PlanId::Tier1`].
const TIER1_THRESHOLD: i64 = 150;

fn questions_limit_for(settings: &SubscriptionSettings, plan: PlanId) -> Option<i64> {
    settings.plan(plan).and_then(|def| def.questions_per_day)
}

/// Start a new account on the default plan's trial window.
///
/// No-op returning the stored block when a subscription already exists.
pub async fn initialize_user_subscription(
    storage: &dyn Storage,
    account_id: &str,
) -> Result<Subscription> {
    let account = storage.get_or_create_account(account_id).await?;
    if let Some(existing) = account.subscription {
        return Ok(existing);
    }

    let settings = settings::subscription_settings(storage).await?;
    let now = Utc::now();
    let subscription = Subscription {
        plan: settings.default_plan,
        status: SubscriptionStatus::Active,
        start_date: now,
        end_date: now + chrono::Duration::try_days(settings.trial_days).unwrap_or_default(),
        questions_used: 0,
        questions_limit: questions_limit_for(&settings, settings.default_plan),
    };

    if storage
        .init_subscription(account_id, subscription.clone())
        .await?
    {
        info!(
            account_id,
            plan = subscription.plan.as_str(),
            "started trial subscription"
        );
        return Ok(subscription);
    }

    // Lost an initialization race; return whichever block won.
    let account = storage.get_or_create_account(account_id).await?;
    Ok(account.subscription.unwrap_or(subscription))
}

/// Switch an account to `plan` with a fresh one-month window.
///
/// Usage counters reset. Independent of any payment confirmation; billing
/// integration is out of scope.
pub async fn update_user_subscription(
    storage: &dyn Storage,
    account_id: &str,
    plan: PlanId,
    status: SubscriptionStatus,
) -> Result<Subscription> {
    storage.get_or_create_account(account_id).await?;

    let settings = settings::subscription_settings(storage).await?;
    let now = Utc::now();
    let subscription = Subscription {
        plan,
        status,
        start_date: now,
        end_date: now + Months::new(1),
        questions_used: 0,
        questions_limit: questions_limit_for(&settings, plan),
    };

    storage
        .set_subscription(account_id, subscription.clone())
        .await?;
    info!(account_id, plan = plan.as_str(), "updated subscription");
    Ok(subscription)
}

/// Admission check for one question; true also counts it.
///
/// False when the subscription is missing, not active, past its window, or
/// out of quota; nothing changes in those cases.
pub async fn use_question(storage: &dyn Storage, account_id: &str) -> Result<bool> {
    storage.consume_question(account_id, Utc::now()).await
}

/// One-way migration from the credits model to a subscription.
///
/// The lifetime credit total picks the tier. Any remaining balance is zeroed
/// into the ledger with a `credit_migration` entry and the credits block is
/// removed. A second call is a no-op returning the existing subscription.
pub async fn migrate_from_credits_to_subscription(
    storage: &dyn Storage,
    account_id: &str,
) -> Result<Subscription> {
    let account = storage.get_or_create_account(account_id).await?;
    if let Some(existing) = account.subscription {
        return Ok(existing);
    }

    let total = account.credits.map_or(0, |balance| balance.total);
    let plan = if total >= TIER2_THRESHOLD {
        PlanId::Tier2
    } else if total >= TIER1_THRESHOLD {
        PlanId::Tier1
    } else {
        PlanId::Free
    };

    let settings = settings::subscription_settings(storage).await?;
    let now = Utc::now();
    let subscription = Subscription {
        plan,
        status: SubscriptionStatus::Active,
        start_date: now,
        end_date: now + Months::new(1),
        questions_used: 0,
        questions_limit: questions_limit_for(&settings, plan),
    };

    if !storage
        .init_subscription(account_id, subscription.clone())
        .await?
    {
        // A concurrent migration won; keep its result.
        let account = storage.get_or_create_account(account_id).await?;
        return Ok(account.subscription.unwrap_or(subscription));
    }

    if let Some(balance) = account.credits {
        let change = BalanceChange {
            previous_balance: balance.remaining,
            new_balance: 0,
        };
        let tx = CreditTransaction::record(
            account_id,
            TransactionKind::Remove,
            -balance.remaining,
            change,
            Some("credit_migration".to_string()),
        );
        storage.record_transaction(&tx).await?;
        storage.clear_credits(account_id).await?;
    }

    info!(
        account_id,
        plan = plan.as_str(),
        total,
        "migrated account to subscription"
    );
    Ok(subscription)
}

/// Zero `questions_used` on every active subscription. Idempotent; returns
/// how many accounts were touched.
pub async fn reset_daily_questions(storage: &dyn Storage) -> Result<u64> {
    let touched = storage.reset_daily_questions().await?;
    info!(touched, "reset daily question counters");
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::add_credits;
    use crate::storage::{AccountStorage, MemoryStorage};
    use chrono::Duration;

    #[tokio::test]
    async fn test_initialize_starts_default_plan_trial() {
        let storage = MemoryStorage::new();
        let sub = initialize_user_subscription(&storage, "u_1").await.unwrap();

        assert_eq!(sub.plan, PlanId::Free);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.questions_used, 0);
        assert_eq!(sub.questions_limit, Some(5));
        assert!(sub.end_date > Utc::now() + Duration::days(6));
    }

    #[tokio::test]
    async fn test_initialize_keeps_existing_subscription() {
        let storage = MemoryStorage::new();
        update_user_subscription(&storage, "u_1", PlanId::Tier2, SubscriptionStatus::Active)
            .await
            .unwrap();

        let sub = initialize_user_subscription(&storage, "u_1").await.unwrap();
        assert_eq!(sub.plan, PlanId::Tier2);
    }

    #[tokio::test]
    async fn test_update_resets_counters_and_window() {
        let storage = MemoryStorage::new();
        initialize_user_subscription(&storage, "u_1").await.unwrap();
        assert!(use_question(&storage, "u_1").await.unwrap());
        assert!(use_question(&storage, "u_1").await.unwrap());

        let sub = update_user_subscription(&storage, "u_1", PlanId::Tier1, SubscriptionStatus::Active)
            .await
            .unwrap();

        assert_eq!(sub.plan, PlanId::Tier1);
        assert_eq!(sub.questions_used, 0);
        assert_eq!(sub.questions_limit, Some(50));
        assert!(sub.end_date > Utc::now() + Duration::days(27));
    }

    #[tokio::test]
    async fn test_use_question_exhausts_quota() {
        let storage = MemoryStorage::new();
        initialize_user_subscription(&storage, "u_1").await.unwrap();

        for _ in 0..5 {
            assert!(use_question(&storage, "u_1").await.unwrap());
        }
        assert!(!use_question(&storage, "u_1").await.unwrap());

        let account = storage.get_account("u_1").await.unwrap().unwrap();
        assert_eq!(account.subscription.unwrap().questions_used, 5);
    }

    #[tokio::test]
    async fn test_use_question_fails_after_window_closes() {
        let storage = MemoryStorage::new();
        storage.get_or_create_account("u_1").await.unwrap();
        let now = Utc::now();
        storage
            .set_subscription(
                "u_1",
                Subscription {
                    plan: PlanId::Tier1,
                    status: SubscriptionStatus::Active,
                    start_date: now - Duration::days(40),
                    end_date: now - Duration::days(9),
                    questions_used: 0,
                    questions_limit: Some(50),
                },
            )
            .await
            .unwrap();

        assert!(!use_question(&storage, "u_1").await.unwrap());

        let account = storage.get_account("u_1").await.unwrap().unwrap();
        assert_eq!(account.subscription.unwrap().questions_used, 0);
    }

    #[tokio::test]
    async fn test_use_question_fails_when_cancelled() {
        let storage = MemoryStorage::new();
        initialize_user_subscription(&storage, "u_1").await.unwrap();
        update_user_subscription(&storage, "u_1", PlanId::Tier1, SubscriptionStatus::Cancelled)
            .await
            .unwrap();

        assert!(!use_question(&storage, "u_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_use_question_unbounded_plan() {
        let storage = MemoryStorage::new();
        update_user_subscription(&storage, "u_1", PlanId::Tier2, SubscriptionStatus::Active)
            .await
            .unwrap();

        for _ in 0..200 {
            assert!(use_question(&storage, "u_1").await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_use_question_without_subscription() {
        let storage = MemoryStorage::new();
        storage.get_or_create_account("u_1").await.unwrap();
        assert!(!use_question(&storage, "u_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_migration_tier_thresholds() {
        let storage = MemoryStorage::new();

        add_credits(&storage, "heavy", 500, true, None).await.unwrap();
        add_credits(&storage, "mid", 150, true, None).await.unwrap();
        add_credits(&storage, "light", 149, true, None).await.unwrap();

        let heavy = migrate_from_credits_to_subscription(&storage, "heavy")
            .await
            .unwrap();
        let mid = migrate_from_credits_to_subscription(&storage, "mid")
            .await
            .unwrap();
        let light = migrate_from_credits_to_subscription(&storage, "light")
            .await
            .unwrap();

        assert_eq!(heavy.plan, PlanId::Tier2);
        assert_eq!(mid.plan, PlanId::Tier1);
        assert_eq!(light.plan, PlanId::Free);
    }

    #[tokio::test]
    async fn test_migration_zeroes_credits_into_ledger() {
        let storage = MemoryStorage::new();
        add_credits(&storage, "u_1", 120, true, None).await.unwrap();

        migrate_from_credits_to_subscription(&storage, "u_1")
            .await
            .unwrap();

        let account = storage.get_account("u_1").await.unwrap().unwrap();
        assert!(account.credits.is_none());
        assert!(account.subscription.is_some());

        let history = storage.list_transactions("u_1", 1).await.unwrap();
        assert_eq!(history[0].kind, TransactionKind::Remove);
        assert_eq!(history[0].amount, -120);
        assert_eq!(history[0].previous_balance, 120);
        assert_eq!(history[0].new_balance, 0);
        assert_eq!(history[0].note.as_deref(), Some("credit_migration"));
    }

    #[tokio::test]
    async fn test_migration_twice_is_noop() {
        let storage = MemoryStorage::new();
        add_credits(&storage, "u_1", 200, true, None).await.unwrap();

        let first = migrate_from_credits_to_subscription(&storage, "u_1")
            .await
            .unwrap();
        let entries = storage.list_transactions("u_1", 10).await.unwrap().len();

        let second = migrate_from_credits_to_subscription(&storage, "u_1")
            .await
            .unwrap();

        assert_eq!(first.plan, second.plan);
        assert_eq!(
            storage.list_transactions("u_1", 10).await.unwrap().len(),
            entries
        );
    }

    #[tokio::test]
    async fn test_migration_of_fresh_account_lands_on_free() {
        let storage = MemoryStorage::new();
        let sub = migrate_from_credits_to_subscription(&storage, "u_new")
            .await
            .unwrap();

        assert_eq!(sub.plan, PlanId::Free);
        assert!(storage
            .list_transactions("u_new", 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_reset_daily_questions_idempotent() {
        let storage = MemoryStorage::new();
        initialize_user_subscription(&storage, "u_1").await.unwrap();
        initialize_user_subscription(&storage, "u_2").await.unwrap();
        assert!(use_question(&storage, "u_1").await.unwrap());

        assert_eq!(reset_daily_questions(&storage).await.unwrap(), 2);
        assert_eq!(reset_daily_questions(&storage).await.unwrap(), 2);

        let account = storage.get_account("u_1").await.unwrap().unwrap();
        assert_eq!(account.subscription.unwrap().questions_used, 0);
    }
}
