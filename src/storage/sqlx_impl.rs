//! `SQLx` `PostgreSQL` storage implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{Result, StorageError},
    models::{
        Account, BalanceChange, CreditBalance, CreditSettings, CreditTransaction, Feedback,
        FeedbackRating, PlanId, Provider, Subscription, SubscriptionSettings, SubscriptionStatus,
        TransactionKind, UsageLogEntry,
    },
    storage::{AccountStorage, FeedbackStorage, SettingsStorage, UsageStorage},
};

const CREDIT_SETTINGS_KEY: &str = "credit_settings";
const SUBSCRIPTION_SETTINGS_KEY: &str = "subscription_settings";

/// `SQLx` `PostgreSQL` storage backend.
///
/// Balance and quota mutations are single conditional statements, so
/// concurrent requests against one account cannot lose updates.
#[derive(Debug, Clone)]
pub struct SqlxStorage {
    pool: PgPool,
}

impl SqlxStorage {
    /// Create a new `SQLx` storage with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///    - Returns `StorageError` if migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.into()))?;
        Ok(())
    }
}

#[async_trait]
impl AccountStorage for SqlxStorage {
    async fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r"
            SELECT
                account_id, credits_remaining, credits_total, last_refill_date,
                sub_plan, sub_status, sub_start_date, sub_end_date,
                questions_used, questions_limit,
                guest_claimed, created_at
            FROM accounts
            WHERE account_id = $1
            ",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(row.map(AccountRow::into_account))
    }

    async fn get_or_create_account(&self, account_id: &str) -> Result<Account> {
        sqlx::query(
            r"
            INSERT INTO accounts (account_id)
            VALUES ($1)
            ON CONFLICT (account_id) DO NOTHING
            ",
        )
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        self.get_account(account_id)
            .await?
            .ok_or_else(|| StorageError::Other("account missing after upsert".to_string()).into())
    }

    async fn list_accounts(&self, limit: i64) -> Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, AccountRow>(
            r"
            SELECT
                account_id, credits_remaining, credits_total, last_refill_date,
                sub_plan, sub_status, sub_start_date, sub_end_date,
                questions_used, questions_limit,
                guest_claimed, created_at
            FROM accounts
            ORDER BY created_at DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(rows.into_iter().map(AccountRow::into_account).collect())
    }

    async fn init_credits(&self, account_id: &str, balance: CreditBalance) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET credits_remaining = $2, credits_total = $3, last_refill_date = $4
            WHERE account_id = $1 AND credits_remaining IS NULL
            ",
        )
        .bind(account_id)
        .bind(balance.remaining)
        .bind(balance.total)
        .bind(balance.last_refill_date)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn adjust_credits(
        &self,
        account_id: &str,
        amount: i64,
        cap: Option<i64>,
    ) -> Result<Option<BalanceChange>> {
        let row = sqlx::query_as::<_, BalanceChangeRow>(
            r"
            WITH before AS (
                SELECT account_id, credits_remaining
                FROM accounts
                WHERE account_id = $1 AND credits_remaining IS NOT NULL
            )
            UPDATE accounts a
            SET credits_remaining = GREATEST(
                    LEAST(a.credits_remaining + $2, COALESCE($3, a.credits_remaining + $2)), 0),
                credits_total = a.credits_total + GREATEST($2, 0)
            FROM before b
            WHERE a.account_id = b.account_id AND a.credits_remaining IS NOT NULL
            RETURNING b.credits_remaining AS previous_balance,
                      a.credits_remaining AS new_balance
            ",
        )
        .bind(account_id)
        .bind(amount)
        .bind(cap)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(row.map(BalanceChangeRow::into_change))
    }

    async fn debit_credits(&self, account_id: &str, amount: i64) -> Result<Option<BalanceChange>> {
        let row = sqlx::query_as::<_, BalanceChangeRow>(
            r"
            WITH before AS (
                SELECT account_id, credits_remaining
                FROM accounts
                WHERE account_id = $1 AND credits_remaining >= $2
            )
            UPDATE accounts a
            SET credits_remaining = a.credits_remaining - $2
            FROM before b
            WHERE a.account_id = b.account_id AND a.credits_remaining >= $2
            RETURNING b.credits_remaining AS previous_balance,
                      a.credits_remaining AS new_balance
            ",
        )
        .bind(account_id)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(row.map(BalanceChangeRow::into_change))
    }

    async fn apply_refill(
        &self,
        account_id: &str,
        amount: i64,
        cap: i64,
        previous_refill: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<BalanceChange>> {
        let row = sqlx::query_as::<_, BalanceChangeRow>(
            r"
            WITH before AS (
                SELECT account_id, credits_remaining
                FROM accounts
                WHERE account_id = $1 AND credits_remaining IS NOT NULL
            )
            UPDATE accounts a
            SET credits_remaining = GREATEST(LEAST(a.credits_remaining + $2, $3), 0),
                credits_total = a.credits_total + GREATEST($2, 0),
                last_refill_date = $5
            FROM before b
            WHERE a.account_id = b.account_id AND a.last_refill_date = $4
            RETURNING b.credits_remaining AS previous_balance,
                      a.credits_remaining AS new_balance
            ",
        )
        .bind(account_id)
        .bind(amount)
        .bind(cap)
        .bind(previous_refill)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(row.map(BalanceChangeRow::into_change))
    }

    async fn clear_credits(&self, account_id: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE accounts
            SET credits_remaining = NULL, credits_total = NULL, last_refill_date = NULL
            WHERE account_id = $1
            ",
        )
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn init_subscription(
        &self,
        account_id: &str,
        subscription: Subscription,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET sub_plan = $2, sub_status = $3, sub_start_date = $4,
                sub_end_date = $5, questions_used = $6, questions_limit = $7
            WHERE account_id = $1 AND sub_plan IS NULL
            ",
        )
        .bind(account_id)
        .bind(subscription.plan)
        .bind(subscription.status)
        .bind(subscription.start_date)
        .bind(subscription.end_date)
        .bind(subscription.questions_used)
        .bind(subscription.questions_limit)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_subscription(&self, account_id: &str, subscription: Subscription) -> Result<()> {
        sqlx::query(
            r"
            UPDATE accounts
            SET sub_plan = $2, sub_status = $3, sub_start_date = $4,
                sub_end_date = $5, questions_used = $6, questions_limit = $7
            WHERE account_id = $1
            ",
        )
        .bind(account_id)
        .bind(subscription.plan)
        .bind(subscription.status)
        .bind(subscription.start_date)
        .bind(subscription.end_date)
        .bind(subscription.questions_used)
        .bind(subscription.questions_limit)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn consume_question(&self, account_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET questions_used = questions_used + 1
            WHERE account_id = $1
              AND sub_status = 'active'
              AND sub_end_date >= $2
              AND (questions_limit IS NULL OR questions_used < questions_limit)
            ",
        )
        .bind(account_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn reset_daily_questions(&self) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET questions_used = 0
            WHERE sub_status = 'active'
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected())
    }

    async fn claim_guest_once(&self, account_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE accounts
            SET guest_claimed = TRUE
            WHERE account_id = $1 AND NOT guest_claimed
            ",
        )
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_transaction(&self, transaction: &CreditTransaction) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO credit_transactions
                (id, account_id, amount, kind, previous_balance, new_balance, note, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(transaction.id)
        .bind(&transaction.account_id)
        .bind(transaction.amount)
        .bind(transaction.kind)
        .bind(transaction.previous_balance)
        .bind(transaction.new_balance)
        .bind(&transaction.note)
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<CreditTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r"
            SELECT id, account_id, amount, kind, previous_balance, new_balance, note, created_at
            FROM credit_transactions
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            ",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(rows.into_iter().map(TransactionRow::into_transaction).collect())
    }
}

#[async_trait]
impl SettingsStorage for SqlxStorage {
    async fn get_credit_settings(&self) -> Result<Option<CreditSettings>> {
        let row: Option<sqlx::types::Json<CreditSettings>> =
            sqlx::query_scalar(r"SELECT value FROM settings WHERE key = $1")
                .bind(CREDIT_SETTINGS_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::Database)?;

        Ok(row.map(|json| json.0))
    }

    async fn init_credit_settings(&self, settings: &CreditSettings) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO NOTHING
            ",
        )
        .bind(CREDIT_SETTINGS_KEY)
        .bind(sqlx::types::Json(settings))
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn put_credit_settings(&self, settings: &CreditSettings) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = NOW()
            ",
        )
        .bind(CREDIT_SETTINGS_KEY)
        .bind(sqlx::types::Json(settings))
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn get_subscription_settings(&self) -> Result<Option<SubscriptionSettings>> {
        let row: Option<sqlx::types::Json<SubscriptionSettings>> =
            sqlx::query_scalar(r"SELECT value FROM settings WHERE key = $1")
                .bind(SUBSCRIPTION_SETTINGS_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(StorageError::Database)?;

        Ok(row.map(|json| json.0))
    }

    async fn init_subscription_settings(&self, settings: &SubscriptionSettings) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO NOTHING
            ",
        )
        .bind(SUBSCRIPTION_SETTINGS_KEY)
        .bind(sqlx::types::Json(settings))
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn put_subscription_settings(&self, settings: &SubscriptionSettings) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO settings (key, value)
            VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = NOW()
            ",
        )
        .bind(SUBSCRIPTION_SETTINGS_KEY)
        .bind(sqlx::types::Json(settings))
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }
}

#[async_trait]
impl FeedbackStorage for SqlxStorage {
    async fn record_feedback(&self, feedback: &Feedback) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO feedback (id, rating, comment, question_id, question, answer, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(feedback.id)
        .bind(feedback.rating)
        .bind(&feedback.comment)
        .bind(&feedback.question_id)
        .bind(&feedback.question)
        .bind(&feedback.answer)
        .bind(feedback.created_at)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn list_feedback(&self, limit: i64) -> Result<Vec<Feedback>> {
        let rows = sqlx::query_as::<_, FeedbackRow>(
            r"
            SELECT id, rating, comment, question_id, question, answer, created_at
            FROM feedback
            ORDER BY created_at DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(rows.into_iter().map(FeedbackRow::into_feedback).collect())
    }
}

#[async_trait]
impl UsageStorage for SqlxStorage {
    async fn record_usage(&self, entry: &UsageLogEntry) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO usage_log
                (id, account_id, provider, model, prompt_chars, has_image, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(entry.id)
        .bind(&entry.account_id)
        .bind(entry.provider)
        .bind(&entry.model)
        .bind(entry.prompt_chars)
        .bind(entry.has_image)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(())
    }

    async fn list_usage(&self, limit: i64) -> Result<Vec<UsageLogEntry>> {
        let rows = sqlx::query_as::<_, UsageRow>(
            r"
            SELECT id, account_id, provider, model, prompt_chars, has_image, created_at
            FROM usage_log
            ORDER BY created_at DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(rows.into_iter().map(UsageRow::into_entry).collect())
    }
}

/// Internal row type for `SQLx` queries.
#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    account_id: String,
    credits_remaining: Option<i64>,
    credits_total: Option<i64>,
    last_refill_date: Option<DateTime<Utc>>,
    sub_plan: Option<PlanId>,
    sub_status: Option<SubscriptionStatus>,
    sub_start_date: Option<DateTime<Utc>>,
    sub_end_date: Option<DateTime<Utc>>,
    questions_used: Option<i64>,
    questions_limit: Option<i64>,
    guest_claimed: bool,
    created_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self) -> Account {
        let credits = match (self.credits_remaining, self.credits_total, self.last_refill_date) {
            (Some(remaining), Some(total), Some(last_refill_date)) => Some(CreditBalance {
                remaining,
                total,
                last_refill_date,
            }),
            _ => None,
        };

        let subscription = match (
            self.sub_plan,
            self.sub_status,
            self.sub_start_date,
            self.sub_end_date,
            self.questions_used,
        ) {
            (Some(plan), Some(status), Some(start_date), Some(end_date), Some(questions_used)) => {
                Some(Subscription {
                    plan,
                    status,
                    start_date,
                    end_date,
                    questions_used,
                    questions_limit: self.questions_limit,
                })
            }
            _ => None,
        };

        Account {
            id: self.account_id,
            credits,
            subscription,
            guest_claimed: self.guest_claimed,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BalanceChangeRow {
    previous_balance: i64,
    new_balance: i64,
}

impl BalanceChangeRow {
    fn into_change(self) -> BalanceChange {
        BalanceChange {
            previous_balance: self.previous_balance,
            new_balance: self.new_balance,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    account_id: String,
    amount: i64,
    kind: TransactionKind,
    previous_balance: i64,
    new_balance: i64,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> CreditTransaction {
        CreditTransaction {
            id: self.id,
            account_id: self.account_id,
            amount: self.amount,
            kind: self.kind,
            previous_balance: self.previous_balance,
            new_balance: self.new_balance,
            note: self.note,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FeedbackRow {
    id: Uuid,
    rating: FeedbackRating,
    comment: String,
    question_id: Option<String>,
    question: Option<String>,
    answer: Option<String>,
    created_at: DateTime<Utc>,
}

impl FeedbackRow {
    fn into_feedback(self) -> Feedback {
        Feedback {
            id: self.id,
            rating: self.rating,
            comment: self.comment,
            question_id: self.question_id,
            question: self.question,
            answer: self.answer,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    id: Uuid,
    account_id: Option<String>,
    provider: Provider,
    model: String,
    prompt_chars: i64,
    has_image: bool,
    created_at: DateTime<Utc>,
}

impl UsageRow {
    fn into_entry(self) -> UsageLogEntry {
        UsageLogEntry {
            id: self.id,
            account_id: self.account_id,
            provider: self.provider,
            model: self.model,
            prompt_chars: self.prompt_chars,
            has_image: self.has_image,
            created_at: self.created_at,
        }
    }
}
