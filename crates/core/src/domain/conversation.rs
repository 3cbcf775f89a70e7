use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Model,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "model" | "assistant" => Ok(Self::Model),
            other => {
                Err(DomainError::InvariantViolation(format!("unknown message role `{other}`")))
            }
        }
    }
}

/// One observed chat message. Records are append-only and always belong to
/// exactly one conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub name: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub activity_id: String,
}

/// Fixed-width RFC 3339 form used for persisted timestamps, so that lexical
/// ordering in SQL matches chronological ordering. Nanosecond precision keeps
/// range bounds exact for `Utc::now()`-based windows.
pub fn storage_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_storage_timestamp(raw: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| {
            DomainError::InvariantViolation(format!("invalid stored timestamp `{raw}`: {error}"))
        })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{parse_storage_timestamp, storage_timestamp, MessageRole};

    #[test]
    fn storage_timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2025, 3, 9, 9, 5, 0).single().expect("valid date");
        let late = Utc.with_ymd_and_hms(2025, 3, 10, 17, 45, 30).single().expect("valid date");

        let early_raw = storage_timestamp(&early);
        let late_raw = storage_timestamp(&late);

        assert_eq!(early_raw, "2025-03-09T09:05:00.000000000Z");
        assert!(early_raw < late_raw);
        assert_eq!(parse_storage_timestamp(&late_raw).expect("parse"), late);
    }

    #[test]
    fn storage_timestamps_keep_sub_millisecond_order() {
        let base = Utc.with_ymd_and_hms(2025, 3, 9, 9, 5, 0).single().expect("valid date");
        let record = storage_timestamp(&(base + Duration::microseconds(100)));
        let bound = storage_timestamp(&(base + Duration::microseconds(500)));

        assert_eq!(record.len(), bound.len());
        assert!(record < bound);
        assert_eq!(
            parse_storage_timestamp(&bound).expect("parse"),
            base + Duration::microseconds(500)
        );
    }

    #[test]
    fn assistant_role_alias_maps_to_model() {
        assert_eq!("assistant".parse::<MessageRole>().expect("role"), MessageRole::Model);
        assert!("system".parse::<MessageRole>().is_err());
    }
}
