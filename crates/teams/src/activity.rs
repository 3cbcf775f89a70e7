use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use collaborator_core::{ConversationId, ConversationKind, InboundMessage, Reaction};

use crate::events::{FeedbackEvent, MessageEvent, TeamsEvent};

const AI_GENERATED_MARKER: &str = "AIGeneratedContent";
const SUBMIT_ACTION: &str = "message/submitAction";
const FEEDBACK_ACTION: &str = "feedback";
const DEFAULT_USER_NAME: &str = "User";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActivityError {
    #[error("activity payload is not valid JSON: {0}")]
    Malformed(String),
    #[error("activity is missing `{0}`")]
    MissingField(&'static str),
    #[error("feedback payload is invalid: {0}")]
    InvalidFeedback(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aad_object_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// The subset of a Bot Framework activity the bot reads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Where replies to an activity are sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationReference {
    pub service_url: String,
    pub conversation_id: ConversationId,
    pub activity_id: String,
    pub bot_id: Option<String>,
}

impl Activity {
    pub fn parse(body: &[u8]) -> Result<Self, ActivityError> {
        serde_json::from_slice(body).map_err(|error| ActivityError::Malformed(error.to_string()))
    }

    pub fn to_event(&self) -> Result<TeamsEvent, ActivityError> {
        match self.kind.as_str() {
            "message" => Ok(TeamsEvent::Message(MessageEvent {
                inbound: self.to_inbound()?,
                reference: self.reference()?,
            })),
            "invoke" if self.is_feedback_submit() => {
                Ok(TeamsEvent::FeedbackSubmit(self.to_feedback()?))
            }
            other => Ok(TeamsEvent::Unsupported { activity_type: other.to_string() }),
        }
    }

    pub fn reference(&self) -> Result<ConversationReference, ActivityError> {
        let service_url = self
            .service_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(ActivityError::MissingField("serviceUrl"))?;
        Ok(ConversationReference {
            service_url: service_url.trim_end_matches('/').to_string(),
            conversation_id: self.conversation_id()?,
            activity_id: self.id.clone().unwrap_or_default(),
            bot_id: self.recipient.as_ref().map(|recipient| recipient.id.clone()),
        })
    }

    pub fn conversation_kind(&self) -> ConversationKind {
        let Some(conversation) = &self.conversation else {
            return ConversationKind::Personal;
        };
        match conversation.conversation_type.as_deref() {
            Some("personal") => ConversationKind::Personal,
            Some("channel") => ConversationKind::Channel,
            Some(_) => ConversationKind::GroupChat,
            None if conversation.is_group.unwrap_or(false) => ConversationKind::GroupChat,
            None => ConversationKind::Personal,
        }
    }

    /// True when a mention entity names the bot. Without a recipient any
    /// mention counts.
    pub fn mentions_bot(&self) -> bool {
        let bot_id = self.recipient.as_ref().map(|recipient| recipient.id.as_str());
        self.entities.iter().any(|entity| {
            entity.get("type").and_then(Value::as_str) == Some("mention")
                && match bot_id {
                    Some(bot_id) => {
                        entity.pointer("/mentioned/id").and_then(Value::as_str) == Some(bot_id)
                    }
                    None => true,
                }
        })
    }

    pub fn is_ai_generated(&self) -> bool {
        self.entities.iter().any(|entity| match entity.get("additionalType") {
            Some(Value::String(kind)) => kind.contains(AI_GENERATED_MARKER),
            Some(Value::Array(kinds)) => kinds
                .iter()
                .filter_map(Value::as_str)
                .any(|kind| kind.contains(AI_GENERATED_MARKER)),
            _ => false,
        })
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|timestamp| timestamp.with_timezone(&Utc))
    }

    fn conversation_id(&self) -> Result<ConversationId, ActivityError> {
        self.conversation
            .as_ref()
            .map(|conversation| conversation.id.trim())
            .filter(|id| !id.is_empty())
            .map(ConversationId::from)
            .ok_or(ActivityError::MissingField("conversation.id"))
    }

    fn to_inbound(&self) -> Result<InboundMessage, ActivityError> {
        let from = self.from.as_ref();
        Ok(InboundMessage {
            activity_id: self.id.clone().ok_or(ActivityError::MissingField("id"))?,
            conversation_id: self.conversation_id()?,
            conversation_kind: self.conversation_kind(),
            user_id: from.map(|account| account.id.clone()),
            user_name: from
                .and_then(|account| account.name.clone())
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_NAME.to_string()),
            text: self.text.clone().unwrap_or_default(),
            timestamp: self.parsed_timestamp(),
            mentions_bot: self.mentions_bot(),
            ai_generated: self.is_ai_generated(),
        })
    }

    fn is_feedback_submit(&self) -> bool {
        self.name.as_deref() == Some(SUBMIT_ACTION)
            && self
                .value
                .as_ref()
                .and_then(|value| value.get("actionName"))
                .and_then(Value::as_str)
                == Some(FEEDBACK_ACTION)
    }

    fn to_feedback(&self) -> Result<FeedbackEvent, ActivityError> {
        let action = self
            .value
            .as_ref()
            .and_then(|value| value.get("actionValue"))
            .ok_or(ActivityError::MissingField("value.actionValue"))?;
        let reaction = action
            .get("reaction")
            .and_then(Value::as_str)
            .ok_or(ActivityError::MissingField("value.actionValue.reaction"))?
            .parse::<Reaction>()
            .map_err(|error| ActivityError::InvalidFeedback(error.to_string()))?;

        Ok(FeedbackEvent {
            activity_id: self.id.clone().unwrap_or_default(),
            reply_to_id: self.reply_to_id.clone().filter(|id| !id.trim().is_empty()),
            user_id: self.from.as_ref().map(|account| account.id.clone()),
            reaction,
            feedback_text: action.get("feedback").and_then(feedback_text),
        })
    }
}

/// Teams sends the free-text part as a JSON string like
/// `{"feedbackText":"..."}`. Plain strings are kept as they are.
fn feedback_text(raw: &Value) -> Option<String> {
    let text = match raw {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(object)) => {
                object.get("feedbackText").and_then(Value::as_str).map(str::to_string)
            }
            _ => Some(raw.clone()),
        },
        Value::Object(object) => {
            object.get("feedbackText").and_then(Value::as_str).map(str::to_string)
        }
        _ => None,
    };
    text.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use collaborator_core::{ConversationKind, MessageRole, Reaction};

    use super::{Activity, ActivityError};
    use crate::events::TeamsEvent;

    fn message(conversation: serde_json::Value, entities: serde_json::Value) -> Activity {
        serde_json::from_value(json!({
            "type": "message",
            "id": "1718119800000",
            "timestamp": "2025-06-11T15:30:00.1234567Z",
            "serviceUrl": "https://smba.trafficmanager.net/amer/",
            "channelId": "msteams",
            "from": { "id": "29:ana", "name": "Ana", "aadObjectId": "aad-ana" },
            "conversation": conversation,
            "recipient": { "id": "28:bot", "name": "Collaborator" },
            "text": "<at>Collaborator</at> summarize yesterday",
            "entities": entities,
        }))
        .expect("activity")
    }

    #[test]
    fn group_message_with_bot_mention_becomes_message_event() {
        let activity = message(
            json!({ "id": "19:team@thread.v2", "conversationType": "groupChat", "isGroup": true }),
            json!([{ "type": "mention", "mentioned": { "id": "28:bot", "name": "Collaborator" } }]),
        );

        let TeamsEvent::Message(event) = activity.to_event().expect("event") else {
            panic!("expected message event");
        };
        assert_eq!(event.inbound.conversation_kind, ConversationKind::GroupChat);
        assert!(event.inbound.mentions_bot);
        assert!(event.inbound.requires_response());
        assert_eq!(event.reference.service_url, "https://smba.trafficmanager.net/amer");
        assert_eq!(event.reference.bot_id.as_deref(), Some("28:bot"));
        assert!(event.inbound.timestamp.is_some());
    }

    #[test]
    fn mention_of_someone_else_does_not_wake_the_bot() {
        let activity = message(
            json!({ "id": "19:team@thread.v2", "conversationType": "channel" }),
            json!([{ "type": "mention", "mentioned": { "id": "29:ben" } }]),
        );
        assert!(!activity.mentions_bot());
        assert_eq!(activity.conversation_kind(), ConversationKind::Channel);
    }

    #[test]
    fn ai_generated_entity_marks_model_role() {
        let activity = message(
            json!({ "id": "a:personal", "conversationType": "personal" }),
            json!([{
                "type": "https://schema.org/Message",
                "additionalType": ["AIGeneratedContent"]
            }]),
        );
        let TeamsEvent::Message(event) = activity.to_event().expect("event") else {
            panic!("expected message event");
        };
        assert!(event.inbound.ai_generated);
        assert_eq!(event.inbound.to_record(chrono::Utc::now()).role, MessageRole::Model);
        assert!(event.inbound.is_personal());
    }

    #[test]
    fn feedback_invoke_carries_reaction_and_text() {
        let activity: Activity = serde_json::from_value(json!({
            "type": "invoke",
            "name": "message/submitAction",
            "id": "f-1",
            "replyToId": "1718119800001",
            "from": { "id": "29:ana" },
            "value": {
                "actionName": "feedback",
                "actionValue": {
                    "reaction": "dislike",
                    "feedback": "{\"feedbackText\":\"too long\"}"
                }
            }
        }))
        .expect("activity");

        let TeamsEvent::FeedbackSubmit(feedback) = activity.to_event().expect("event") else {
            panic!("expected feedback event");
        };
        assert_eq!(feedback.reaction, Reaction::Dislike);
        assert_eq!(feedback.reply_to_id.as_deref(), Some("1718119800001"));
        assert_eq!(feedback.feedback_text.as_deref(), Some("too long"));
    }

    #[test]
    fn other_activity_types_are_unsupported() {
        let activity: Activity =
            serde_json::from_value(json!({ "type": "conversationUpdate" })).expect("activity");
        assert_eq!(
            activity.to_event().expect("event"),
            TeamsEvent::Unsupported { activity_type: "conversationUpdate".to_string() }
        );
    }

    #[test]
    fn message_without_conversation_is_rejected() {
        let activity: Activity = serde_json::from_value(json!({
            "type": "message",
            "id": "1",
            "serviceUrl": "https://example.test",
        }))
        .expect("activity");
        assert_eq!(activity.to_event(), Err(ActivityError::MissingField("conversation.id")));
    }

    #[test]
    fn malformed_body_is_reported() {
        assert!(matches!(Activity::parse(b"{not json"), Err(ActivityError::Malformed(_))));
    }
}
