//! Subscription types for Homework Helper accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription plan identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanId {
    /// Free plan (default).
    #[default]
    Free,
    /// Mid tier plan.
    Tier1,
    /// Top tier plan.
    Tier2,
}

impl PlanId {
    /// Stable string form used in storage and JSON.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Tier1 => "tier1",
            Self::Tier2 => "tier2",
        }
    }
}

/// Lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is live.
    #[default]
    Active,
    /// Cancelled by the user or an admin.
    Cancelled,
    /// Ran past its end date.
    Expired,
}

impl SubscriptionStatus {
    /// Stable string form used in storage and JSON.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

/// Subscription block on an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Plan this subscription grants.
    pub plan: PlanId,
    /// Current lifecycle status.
    pub status: SubscriptionStatus,
    /// When the current window opened.
    pub start_date: DateTime<Utc>,
    /// When the current window closes.
    pub end_date: DateTime<Utc>,
    /// Questions consumed in the current day.
    pub questions_used: i64,
    /// Daily question quota (None = unbounded).
    pub questions_limit: Option<i64>,
}

impl Subscription {
    /// Returns true if the subscription admits a question right now:
    /// status is active, the window has not closed, and quota remains.
    #[must_use]
    pub fn can_ask(&self, now: DateTime<Utc>) -> bool {
        if self.status != SubscriptionStatus::Active {
            return false;
        }
        if now > self.end_date {
            return false;
        }
        match self.questions_limit {
            Some(limit) => self.questions_used < limit,
            None => true,
        }
    }
}

#[cfg(feature = "sqlx-storage")]
impl sqlx::Type<sqlx::Postgres> for PlanId {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

#[cfg(feature = "sqlx-storage")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for PlanId {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s.as_str() {
            "free" => Ok(Self::Free),
            "tier1" => Ok(Self::Tier1),
            "tier2" => Ok(Self::Tier2),
            _ => Ok(Self::Free),
        }
    }
}

#[cfg(feature = "sqlx-storage")]
impl sqlx::Encode<'_, sqlx::Postgres> for PlanId {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

#[cfg(feature = "sqlx-storage")]
impl sqlx::Type<sqlx::Postgres> for SubscriptionStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

#[cfg(feature = "sqlx-storage")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for SubscriptionStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s.as_str() {
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            _ => Ok(Self::Expired),
        }
    }
}

#[cfg(feature = "sqlx-storage")]
impl sqlx::Encode<'_, sqlx::Postgres> for SubscriptionStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn make_test_subscription() -> Subscription {
        Subscription {
            plan: PlanId::Tier1,
            status: SubscriptionStatus::Active,
            start_date: Utc::now() - Duration::days(1),
            end_date: Utc::now() + Duration::days(29),
            questions_used: 0,
            questions_limit: Some(50),
        }
    }

    #[test]
    fn test_plan_id_default() {
        let plan: PlanId = Default::default();
        assert_eq!(plan, PlanId::Free);
    }

    #[test]
    fn test_plan_id_serde() {
        let plan = PlanId::Tier2;
        let json = serde_json::to_string(&plan).unwrap();
        assert_eq!(json, "\"tier2\"");

        let parsed: PlanId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, PlanId::Tier2);
    }

    #[test]
    fn test_status_serde() {
        let status = SubscriptionStatus::Cancelled;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"cancelled\"");

        let parsed: SubscriptionStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, SubscriptionStatus::Cancelled);
    }

    #[test]
    fn test_can_ask_active_with_quota() {
        let sub = make_test_subscription();
        assert!(sub.can_ask(Utc::now()));
    }

    #[test]
    fn test_can_ask_fails_on_inactive_status() {
        let mut sub = make_test_subscription();
        sub.status = SubscriptionStatus::Cancelled;
        assert!(!sub.can_ask(Utc::now()));
    }

    #[test]
    fn test_can_ask_fails_past_end_date() {
        let mut sub = make_test_subscription();
        sub.end_date = Utc::now() - Duration::days(1);
        assert!(!sub.can_ask(Utc::now()));
    }

    #[test]
    fn test_can_ask_fails_on_exhausted_quota() {
        let mut sub = make_test_subscription();
        sub.questions_used = 50;
        assert!(!sub.can_ask(Utc::now()));
    }

    #[test]
    fn test_can_ask_unbounded_quota() {
        let mut sub = make_test_subscription();
        sub.questions_limit = None;
        sub.questions_used = 10_000;
        assert!(sub.can_ask(Utc::now()));
    }
}
