//! Feedback entries submitted after an answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Thumbs verdict on an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackRating {
    Helpful,
    NotHelpful,
}

impl FeedbackRating {
    /// Stable string form used in storage and JSON.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Helpful => "helpful",
            Self::NotHelpful => "not-helpful",
        }
    }
}

/// A stored feedback entry. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub rating: FeedbackRating,
    pub comment: String,
    pub question_id: Option<String>,
    pub question: Option<String>,
    pub answer: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Incoming feedback payload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewFeedback {
    pub rating: FeedbackRating,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
}

impl NewFeedback {
    /// Stamp the payload into a stored entry.
    #[must_use]
    pub fn into_feedback(self) -> Feedback {
        Feedback {
            id: Uuid::new_v4(),
            rating: self.rating,
            comment: self.comment,
            question_id: self.question_id,
            question: self.question,
            answer: self.answer,
            created_at: Utc::now(),
        }
    }
}

#[cfg(feature = "sqlx-storage")]
impl sqlx::Type<sqlx::Postgres> for FeedbackRating {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

#[cfg(feature = "sqlx-storage")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for FeedbackRating {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s.as_str() {
            "helpful" => Ok(Self::Helpful),
            "not-helpful" => Ok(Self::NotHelpful),
            other => Err(format!("unknown feedback rating: {other}").into()),
        }
    }
}

#[cfg(feature = "sqlx-storage")]
impl sqlx::Encode<'_, sqlx::Postgres> for FeedbackRating {
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
    fn test_rating_serde_kebab_case() {
        let json = serde_json::to_string(&FeedbackRating::NotHelpful).unwrap();
        assert_eq!(json, "\"not-helpful\"");

        let parsed: FeedbackRating = serde_json::from_str("\"helpful\"").unwrap();
        assert_eq!(parsed, FeedbackRating::Helpful);
    }

    #[test]
    fn test_new_feedback_minimal_payload() {
        let payload: NewFeedback = serde_json::from_str(r#"{ "rating": "helpful" }"#).unwrap();
        let feedback = payload.into_feedback();
        assert_eq!(feedback.rating, FeedbackRating::Helpful);
        assert!(feedback.comment.is_empty());
        assert!(feedback.question_id.is_none());
    }

    #[test]
    fn test_new_feedback_full_payload() {
        let payload: NewFeedback = serde_json::from_str(
            r#"{
                "rating": "not-helpful",
                "comment": "the steps skipped the substitution",
                "question_id": "q_9",
                "question": "Solve 2x + 1 = 5",
                "answer": "x = 2"
            }"#,
        )
        .unwrap();
        let feedback = payload.into_feedback();
        assert_eq!(feedback.rating, FeedbackRating::NotHelpful);
        assert_eq!(feedback.question_id.as_deref(), Some("q_9"));
    }
}
