use serde::{Deserialize, Serialize};

use crate::domain::conversation::{ConversationId, MessageRecord};
use crate::errors::DomainError;

const ABSTRACT_MAX_CHARS: usize = 160;
const MAX_KEYWORDS: usize = 3;

/// A reference from a bot reply back to an original chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub position: usize,
    pub name: String,
    pub url: String,
    pub abstract_text: String,
    pub keywords: Vec<String>,
}

impl Citation {
    /// Builds a citation for `record`. Fails when the record carries no
    /// activity id, since no deep link can point at it.
    pub fn from_record(
        position: usize,
        record: &MessageRecord,
        keywords: &[String],
    ) -> Result<Self, DomainError> {
        let url = deep_link(&record.conversation_id, &record.activity_id)?;
        Ok(Self {
            position,
            name: format!("Message from {}", record.name),
            url,
            abstract_text: preview(&record.content, ABSTRACT_MAX_CHARS),
            keywords: keywords.iter().take(MAX_KEYWORDS).cloned().collect(),
        })
    }
}

/// Deep link that opens a specific message in the Teams client.
pub fn deep_link(
    conversation_id: &ConversationId,
    activity_id: &str,
) -> Result<String, DomainError> {
    let activity_id = activity_id.trim();
    if activity_id.is_empty() {
        return Err(DomainError::InvariantViolation(
            "cannot build a deep link for a message without an activity id".to_string(),
        ));
    }

    let context = urlencoding::encode(r#"{"contextType":"chat"}"#);
    Ok(format!(
        "https://teams.microsoft.com/l/message/{}/{}?context={}",
        urlencoding::encode(conversation_id.as_str()),
        urlencoding::encode(activity_id),
        context
    ))
}

/// Truncates on a character boundary, appending an ellipsis when shortened.
pub fn preview(content: &str, max_chars: usize) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let mut shortened: String = trimmed.chars().take(max_chars).collect();
    shortened.push_str("...");
    shortened
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{deep_link, preview, Citation};
    use crate::domain::conversation::{ConversationId, MessageRecord, MessageRole};
    use crate::errors::DomainError;

    fn record(activity_id: &str) -> MessageRecord {
        MessageRecord {
            conversation_id: ConversationId("19:abc@thread.v2".to_string()),
            role: MessageRole::User,
            name: "Priya".to_string(),
            content: "Budget review moved to Thursday".to_string(),
            timestamp: Utc::now(),
            activity_id: activity_id.to_string(),
        }
    }

    #[test]
    fn deep_link_encodes_conversation_and_context() {
        let link = deep_link(&ConversationId("19:abc@thread.v2".to_string()), "1712345678901")
            .expect("link");

        assert_eq!(
            link,
            "https://teams.microsoft.com/l/message/19%3Aabc%40thread.v2/1712345678901?context=%7B%22contextType%22%3A%22chat%22%7D"
        );
    }

    #[test]
    fn citation_requires_activity_id() {
        let error = Citation::from_record(1, &record(""), &[]).expect_err("missing id");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn citation_carries_preview_and_capped_keywords() {
        let keywords: Vec<String> =
            ["budget", "review", "thursday", "extra"].iter().map(|k| k.to_string()).collect();
        let citation = Citation::from_record(2, &record("1712345678901"), &keywords).expect("ok");

        assert_eq!(citation.position, 2);
        assert_eq!(citation.name, "Message from Priya");
        assert_eq!(citation.abstract_text, "Budget review moved to Thursday");
        assert_eq!(citation.keywords.len(), 3);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("  short ", 10), "short");
    }
}
