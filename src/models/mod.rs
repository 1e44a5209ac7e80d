//! Data models for the Homework Helper backend.

mod account;
mod feedback;
mod settings;
mod subscription;
mod transaction;
mod usage;

pub use account::{Account, CreditBalance};
pub use feedback::{Feedback, FeedbackRating, NewFeedback};
pub use settings::{
    CreditSettings, CreditSettingsPatch, PlanDefinition, PurchaseOption, SubscriptionSettings,
    SubscriptionSettingsPatch,
};
pub use subscription::{PlanId, Subscription, SubscriptionStatus};
pub use transaction::{BalanceChange, CreditTransaction, TransactionKind};
pub use usage::{Provider, UsageLogEntry};
