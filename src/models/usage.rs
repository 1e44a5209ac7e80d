//! Usage log entries, appended once per proxied chat request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which LLM vendor served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Gemini,
    Groq,
}

impl Provider {
    /// Stable string form used in storage and JSON.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Groq => "groq",
        }
    }
}

/// One proxied chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLogEntry {
    pub id: Uuid,
    /// None for guest requests.
    pub account_id: Option<String>,
    pub provider: Provider,
    pub model: String,
    pub prompt_chars: i64,
    pub has_image: bool,
    pub created_at: DateTime<Utc>,
}

impl UsageLogEntry {
    /// Stamp a new entry for a request that just passed admission.
    #[must_use]
    pub fn record(
        account_id: Option<&str>,
        provider: Provider,
        model: &str,
        prompt_chars: usize,
        has_image: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: account_id.map(ToString::to_string),
            provider,
            model: model.to_string(),
            prompt_chars: prompt_chars as i64,
            has_image,
            created_at: Utc::now(),
        }
    }
}

#[cfg(feature = "sqlx-storage")]
impl sqlx::Type<sqlx::Postgres> for Provider {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

#[cfg(feature = "sqlx-storage")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Provider {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s.as_str() {
            "gemini" => Ok(Self::Gemini),
            "groq" => Ok(Self::Groq),
            other => Err(format!("unknown provider: {other}").into()),
        }
    }
}

#[cfg(feature = "sqlx-storage")]
impl sqlx::Encode<'_, sqlx::Postgres> for Provider {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}
