//! Settings registry: lazily seeded singletons with merge-patch updates.
//!
//! Both documents exist at most once in storage. Reads seed the compiled
//! defaults on first touch, so callers always see a full document. Updates
//! merge a partial patch over the stored document and write the result back
//! whole; absent fields keep their stored values.

use tracing::info;

use crate::{
    error::Result,
    models::{CreditSettings, CreditSettingsPatch, SubscriptionSettings, SubscriptionSettingsPatch},
    storage::{SettingsStorage, Storage},
};

/// Read the credit settings, seeding defaults on first access.
pub async fn credit_settings(storage: &dyn Storage) -> Result<CreditSettings> {
    if let Some(settings) = storage.get_credit_settings().await? {
        return Ok(settings);
    }

    let defaults = CreditSettings::default();
    if storage.init_credit_settings(&defaults).await? {
        info!("seeded default credit settings");
        return Ok(defaults);
    }

    // A concurrent writer seeded first; read its document back.
    Ok(storage.get_credit_settings().await?.unwrap_or(defaults))
}

/// Read the subscription settings, seeding defaults on first access.
pub async fn subscription_settings(storage: &dyn Storage) -> Result<SubscriptionSettings> {
    if let Some(settings) = storage.get_subscription_settings().await? {
        return Ok(settings);
    }

    let defaults = SubscriptionSettings::default();
    if storage.init_subscription_settings(&defaults).await? {
        info!("seeded default subscription settings");
        return Ok(defaults);
    }

    Ok(storage
        .get_subscription_settings()
        .await?
        .unwrap_or(defaults))
}

/// Seed both settings documents if absent. Called once at startup so the
/// first request never races the seeding writes.
pub async fn ensure_defaults(storage: &dyn Storage) -> Result<()> {
    if storage
        .init_credit_settings(&CreditSettings::default())
        .await?
    {
        info!("seeded default credit settings");
    }
    if storage
        .init_subscription_settings(&SubscriptionSettings::default())
        .await?
    {
        info!("seeded default subscription settings");
    }
    Ok(())
}

/// Merge a patch over the stored credit settings and persist the result.
///
/// Values are stored as given; numeric ranges are not validated.
pub async fn update_credit_settings(
    storage: &dyn Storage,
    patch: CreditSettingsPatch,
) -> Result<CreditSettings> {
    let mut settings = credit_settings(storage).await?;
    patch.apply(&mut settings);
    storage.put_credit_settings(&settings).await?;
    Ok(settings)
}

/// Merge a patch over the stored subscription settings and persist the
/// result.
pub async fn update_subscription_settings(
    storage: &dyn Storage,
    patch: SubscriptionSettingsPatch,
) -> Result<SubscriptionSettings> {
    let mut settings = subscription_settings(storage).await?;
    patch.apply(&mut settings);
    storage.put_subscription_settings(&settings).await?;
    Ok(settings)
}
