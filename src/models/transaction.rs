//! Append-only credit transaction records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a balance moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Credits granted (signup default, purchase, admin grant, guest merge).
    Add,
    /// Credits spent on a question.
    Use,
    /// Credits taken away (admin removal, migration zeroing).
    Remove,
    /// Periodic automatic top-up.
    Refill,
}

impl TransactionKind {
    /// Stable string form used in storage and JSON.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Use => "use",
            Self::Remove => "remove",
            Self::Refill => "refill",
        }
    }
}

/// Before/after pair reported by an atomic balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub previous_balance: i64,
    pub new_balance: i64,
}

/// One immutable entry in an account's ledger history.
///
/// Ordering by `created_at` reconstructs the balance history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: Uuid,
    pub account_id: String,
    /// Signed delta applied to the balance.
    pub amount: i64,
    pub kind: TransactionKind,
    pub previous_balance: i64,
    pub new_balance: i64,
    /// Free-text label, e.g. `credit_migration` or `guest_reconciliation`.
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Build a record for a mutation that just happened.
    #[must_use]
    pub fn record(
        account_id: &str,
        kind: TransactionKind,
        amount: i64,
        change: BalanceChange,
        note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            amount,
            kind,
            previous_balance: change.previous_balance,
            new_balance: change.new_balance,
            note,
            created_at: Utc::now(),
        }
    }
}

#[cfg(feature = "sqlx-storage")]
impl sqlx::Type<sqlx::Postgres> for TransactionKind {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

#[cfg(feature = "sqlx-storage")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for TransactionKind {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s.as_str() {
            "add" => Ok(Self::Add),
            "use" => Ok(Self::Use),
            "remove" => Ok(Self::Remove),
            "refill" => Ok(Self::Refill),
            other => Err(format!("unknown transaction kind: {other}").into()),
        }
    }
}

#[cfg(feature = "sqlx-storage")]
impl sqlx::Encode<'_, sqlx::Postgres> for TransactionKind {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serde() {
        let kind = TransactionKind::Use;
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"use\"");

        let parsed: TransactionKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TransactionKind::Use);
    }

    #[test]
    fn test_record_carries_balance_change() {
        let change = BalanceChange {
            previous_balance: 5,
            new_balance: 25,
        };
        let tx = CreditTransaction::record("u_1", TransactionKind::Add, 20, change, None);
        assert_eq!(tx.previous_balance, 5);
        assert_eq!(tx.new_balance, 25);
        assert_eq!(tx.amount, 20);
        assert!(tx.note.is_none());
    }

    #[test]
    fn test_record_keeps_note() {
        let change = BalanceChange {
            previous_balance: 120,
            new_balance: 0,
        };
        let tx = CreditTransaction::record(
            "u_1",
            TransactionKind::Remove,
            -120,
            change,
            Some("credit_migration".to_string()),
        );
        assert_eq!(tx.note.as_deref(), Some("credit_migration"));
    }
}
