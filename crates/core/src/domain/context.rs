use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;

pub const DEFAULT_WINDOW_HOURS: i64 = 24;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
}

/// Inclusive time range used to scope history queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn trailing(now: DateTime<Utc>, hours: i64) -> Self {
        Self { start: now - Duration::hours(hours), end: now }
    }

    pub fn default_for(now: DateTime<Utc>) -> Self {
        Self::trailing(now, DEFAULT_WINDOW_HOURS)
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.start <= *timestamp && *timestamp <= self.end
    }

    pub fn describe(&self) -> String {
        format!(
            "{} to {}",
            self.start.format("%Y-%m-%d %H:%M UTC"),
            self.end.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

/// Per-message metadata assembled from an inbound activity. Built fresh for
/// every message and dropped once the reply is sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageContext {
    pub text: String,
    pub conversation_id: ConversationId,
    pub user_id: Option<String>,
    pub user_name: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub is_personal_chat: bool,
    pub activity_id: String,
    pub members: Vec<Member>,
    pub window: TimeWindow,
}

impl MessageContext {
    pub fn with_window(&self, window: TimeWindow) -> Self {
        Self { window, ..self.clone() }
    }

    pub fn chat_description(&self) -> String {
        if self.is_personal_chat {
            format!(
                "Context: This is a personal (1:1) chat with {} ({}).",
                self.user_name,
                self.user_id.as_deref().unwrap_or("unknown")
            )
        } else {
            "Context: This is a group conversation.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::TimeWindow;

    #[test]
    fn default_window_covers_trailing_day_inclusive() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).single().expect("valid date");
        let window = TimeWindow::default_for(now);

        assert_eq!(window.start, now - Duration::hours(24));
        assert!(window.contains(&window.start));
        assert!(window.contains(&now));
        assert!(!window.contains(&(now + Duration::milliseconds(1))));
    }
}
