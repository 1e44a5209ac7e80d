//! Global settings singletons for credits and subscription plans.

use serde::{Deserialize, Serialize};

use super::subscription::PlanId;

/// Global credit accounting configuration.
///
/// Numeric ranges are not validated; admin updates are stored as written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditSettings {
    /// Starting balance for unauthenticated visitors.
    pub guest_credits: i64,
    /// Starting balance granted to a new account on the credits model.
    pub default_user_credits: i64,
    /// Credits added by one refill.
    pub refill_amount: i64,
    /// Whole days between refills.
    pub refill_period_days: i64,
    /// Balance ceiling for non-admin grants and refills.
    pub max_credits: i64,
    /// Purchase options shown to users, in display order.
    pub purchase_options: Vec<PurchaseOption>,
}

impl Default for CreditSettings {
    fn default() -> Self {
        Self {
            guest_credits: 5,
            default_user_credits: 20,
            refill_amount: 5,
            refill_period_days: 7,
            max_credits: 100,
            purchase_options: vec![
                PurchaseOption {
                    id: "starter".to_string(),
                    credits: 50,
                    price: 4.99,
                    currency: "USD".to_string(),
                    description: "Starter pack of 50 credits".to_string(),
                },
                PurchaseOption {
                    id: "plus".to_string(),
                    credits: 150,
                    price: 9.99,
                    currency: "USD".to_string(),
                    description: "150 credits for regular study".to_string(),
                },
                PurchaseOption {
                    id: "max".to_string(),
                    credits: 500,
                    price: 24.99,
                    currency: "USD".to_string(),
                    description: "500 credits for heavy use".to_string(),
                },
            ],
        }
    }
}

/// One purchasable credit bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOption {
    pub id: String,
    pub credits: i64,
    pub price: f64,
    pub currency: String,
    pub description: String,
}

/// Merge patch for [`CreditSettings`]; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreditSettingsPatch {
    pub guest_credits: Option<i64>,
    pub default_user_credits: Option<i64>,
    pub refill_amount: Option<i64>,
    pub refill_period_days: Option<i64>,
    pub max_credits: Option<i64>,
    pub purchase_options: Option<Vec<PurchaseOption>>,
}

impl CreditSettingsPatch {
    /// Apply the patch on top of the stored settings.
    pub fn apply(self, settings: &mut CreditSettings) {
        if let Some(v) = self.guest_credits {
            settings.guest_credits = v;
        }
        if let Some(v) = self.default_user_credits {
            settings.default_user_credits = v;
        }
        if let Some(v) = self.refill_amount {
            settings.refill_amount = v;
        }
        if let Some(v) = self.refill_period_days {
            settings.refill_period_days = v;
        }
        if let Some(v) = self.max_credits {
            settings.max_credits = v;
        }
        if let Some(v) = self.purchase_options {
            settings.purchase_options = v;
        }
    }
}

/// Global subscription plan configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    /// Available plans, in display order.
    pub plans: Vec<PlanDefinition>,
    /// Plan granted to new accounts.
    pub default_plan: PlanId,
    /// Trial window length for new accounts, in days.
    pub trial_days: i64,
}

impl SubscriptionSettings {
    /// Look up a plan definition by id.
    #[must_use]
    pub fn plan(&self, id: PlanId) -> Option<&PlanDefinition> {
        self.plans.iter().find(|p| p.id == id)
    }
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            plans: vec![
                PlanDefinition {
                    id: PlanId::Free,
                    name: "Basic".to_string(),
                    price: 0.0,
                    interval: "month".to_string(),
                    questions_per_day: Some(5),
                    subjects: vec!["math".to_string()],
                    ai_model: "gemini-2.0-flash".to_string(),
                    features: vec!["Step-by-step answers".to_string()],
                },
                PlanDefinition {
                    id: PlanId::Tier1,
                    name: "Student".to_string(),
                    price: 4.99,
                    interval: "month".to_string(),
                    questions_per_day: Some(50),
                    subjects: vec![
                        "math".to_string(),
                        "physics".to_string(),
                        "chemistry".to_string(),
                    ],
                    ai_model: "gemini-2.0-flash".to_string(),
                    features: vec![
                        "Step-by-step answers".to_string(),
                        "Image questions".to_string(),
                    ],
                },
                PlanDefinition {
                    id: PlanId::Tier2,
                    name: "Scholar".to_string(),
                    price: 9.99,
                    interval: "month".to_string(),
                    questions_per_day: None,
                    subjects: vec!["all".to_string()],
                    ai_model: "gemini-2.0-flash".to_string(),
                    features: vec![
                        "Step-by-step answers".to_string(),
                        "Image questions".to_string(),
                        "Unlimited questions".to_string(),
                    ],
                },
            ],
            default_plan: PlanId::Free,
            trial_days: 7,
        }
    }
}

/// One subscription plan as shown to users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDefinition {
    pub id: PlanId,
    pub name: String,
    pub price: f64,
    pub interval: String,
    /// Daily question quota granted by this plan (None = unbounded).
    pub questions_per_day: Option<i64>,
    pub subjects: Vec<String>,
    pub ai_model: String,
    pub features: Vec<String>,
}

/// Merge patch for [`SubscriptionSettings`]; absent fields are left
/// untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionSettingsPatch {
    pub plans: Option<Vec<PlanDefinition>>,
    pub default_plan: Option<PlanId>,
    pub trial_days: Option<i64>,
}

impl SubscriptionSettingsPatch {
    /// Apply the patch on top of the stored settings.
    pub fn apply(self, settings: &mut SubscriptionSettings) {
        if let Some(v) = self.plans {
            settings.plans = v;
        }
        if let Some(v) = self.default_plan {
            settings.default_plan = v;
        }
        if let Some(v) = self.trial_days {
            settings.trial_days = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_defaults() {
        let settings = CreditSettings::default();
        assert_eq!(settings.guest_credits, 5);
        assert_eq!(settings.max_credits, 100);
        assert_eq!(settings.purchase_options.len(), 3);
    }

    #[test]
    fn test_credit_patch_leaves_absent_fields() {
        let mut settings = CreditSettings::default();
        let patch: CreditSettingsPatch =
            serde_json::from_str(r#"{ "refill_amount": 10 }"#).unwrap();
        patch.apply(&mut settings);

        assert_eq!(settings.refill_amount, 10);
        assert_eq!(settings.guest_credits, 5);
        assert_eq!(settings.max_credits, 100);
        assert_eq!(settings.purchase_options.len(), 3);
    }

    #[test]
    fn test_credit_patch_accepts_negative_values() {
        let mut settings = CreditSettings::default();
        let patch = CreditSettingsPatch {
            refill_amount: Some(-3),
            ..Default::default()
        };
        patch.apply(&mut settings);
        assert_eq!(settings.refill_amount, -3);
    }

    #[test]
    fn test_subscription_defaults_have_all_plans() {
        let settings = SubscriptionSettings::default();
        assert_eq!(settings.default_plan, PlanId::Free);
        assert!(settings.plan(PlanId::Free).is_some());
        assert!(settings.plan(PlanId::Tier1).is_some());
        assert!(settings.plan(PlanId::Tier2).is_some());
        assert_eq!(
            settings.plan(PlanId::Tier2).unwrap().questions_per_day,
            None
        );
    }

    #[test]
    fn test_subscription_patch_leaves_absent_fields() {
        let mut settings = SubscriptionSettings::default();
        let patch: SubscriptionSettingsPatch =
            serde_json::from_str(r#"{ "trial_days": 14 }"#).unwrap();
        patch.apply(&mut settings);

        assert_eq!(settings.trial_days, 14);
        assert_eq!(settings.plans.len(), 3);
        assert_eq!(settings.default_plan, PlanId::Free);
    }
}
