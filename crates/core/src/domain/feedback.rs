use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Dislike => "dislike",
        }
    }
}

impl std::str::FromStr for Reaction {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "like" => Ok(Self::Like),
            "dislike" => Ok(Self::Dislike),
            other => Err(DomainError::InvariantViolation(format!("unknown reaction `{other}`"))),
        }
    }
}

/// One feedback submission against a bot reply, keyed by the reply's activity id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub message_id: String,
    pub reaction: Reaction,
    pub feedback_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FeedbackSummary {
    pub total_records: u64,
    pub likes: u64,
    pub dislikes: u64,
    pub like_ratio: Option<f64>,
}

impl FeedbackSummary {
    pub fn from_counts(likes: u64, dislikes: u64) -> Self {
        let total_records = likes + dislikes;
        let like_ratio =
            (total_records > 0).then(|| likes as f64 / total_records as f64);
        Self { total_records, likes, dislikes, like_ratio }
    }
}
