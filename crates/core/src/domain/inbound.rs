use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::{ConversationId, MessageRecord, MessageRole};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Personal,
    GroupChat,
    Channel,
}

/// Platform-neutral view of an inbound chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub activity_id: String,
    pub conversation_id: ConversationId,
    pub conversation_kind: ConversationKind,
    pub user_id: Option<String>,
    pub user_name: String,
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub mentions_bot: bool,
    pub ai_generated: bool,
}

impl InboundMessage {
    pub fn is_personal(&self) -> bool {
        self.conversation_kind == ConversationKind::Personal
    }

    /// The bot answers every 1:1 message, and group messages only when mentioned.
    pub fn requires_response(&self) -> bool {
        self.is_personal() || self.mentions_bot
    }

    pub fn to_record(&self, observed_at: DateTime<Utc>) -> MessageRecord {
        MessageRecord {
            conversation_id: self.conversation_id.clone(),
            role: if self.ai_generated { MessageRole::Model } else { MessageRole::User },
            name: self.user_name.clone(),
            content: strip_mention_tags(&self.text),
            timestamp: self.timestamp.unwrap_or(observed_at),
            activity_id: self.activity_id.clone(),
        }
    }
}

/// Removes `<at>` / `</at>` mention markup while keeping the mentioned name.
pub fn strip_mention_tags(text: &str) -> String {
    text.replace("<at>", "").replace("</at>", "").trim().to_string()
}
