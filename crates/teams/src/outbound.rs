use serde::Serialize;
use serde_json::{json, Value};

use collaborator_core::Citation;

const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";
const ADAPTIVE_CARD_SCHEMA: &str = "http://adaptivecards.io/schemas/adaptive-card.json";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    pub content: Value,
}

/// A reply activity. Serializes to the body the connector expects.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub text_format: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(skip)]
    ai_generated: bool,
    #[serde(skip)]
    citations: Vec<Citation>,
}

impl OutboundMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            kind: "message".to_owned(),
            text: text.into(),
            text_format: "markdown".to_owned(),
            entities: Vec::new(),
            attachments: Vec::new(),
            channel_data: None,
            reply_to_id: None,
            ai_generated: false,
            citations: Vec::new(),
        }
    }

    pub fn typing() -> Self {
        Self { kind: "typing".to_owned(), text: String::new(), ..Self::new("") }
    }

    /// Adds the "AI generated" label shown by Teams.
    pub fn ai_generated(mut self) -> Self {
        self.ai_generated = true;
        self.rebuild_message_entity();
        self
    }

    /// Enables the thumbs up / down feedback buttons.
    pub fn with_feedback(mut self) -> Self {
        let mut channel_data = self.channel_data.take().unwrap_or_else(|| json!({}));
        channel_data["feedbackLoopEnabled"] = json!(true);
        self.channel_data = Some(channel_data);
        self
    }

    /// Appends one ` [n]` marker per citation and records the matching claims.
    pub fn with_citations(mut self, citations: &[Citation]) -> Self {
        for citation in citations {
            let position = self.citations.len() + 1;
            self.text.push_str(&format!(" [{position}]"));
            self.citations.push(Citation { position, ..citation.clone() });
        }
        self.rebuild_message_entity();
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn reply_to(mut self, activity_id: impl Into<String>) -> Self {
        let activity_id = activity_id.into();
        self.reply_to_id = (!activity_id.is_empty()).then_some(activity_id);
        self
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn is_ai_generated(&self) -> bool {
        self.ai_generated
    }

    fn rebuild_message_entity(&mut self) {
        self.entities.retain(|entity| entity["type"] != "https://schema.org/Message");
        if !self.ai_generated && self.citations.is_empty() {
            return;
        }

        let mut entity = json!({
            "type": "https://schema.org/Message",
            "@type": "Message",
            "@context": "https://schema.org",
            "@id": "",
        });
        if self.ai_generated {
            entity["additionalType"] = json!(["AIGeneratedContent"]);
        }
        if !self.citations.is_empty() {
            entity["citation"] = Value::Array(self.citations.iter().map(claim).collect());
        }
        self.entities.push(entity);
    }
}

fn claim(citation: &Citation) -> Value {
    json!({
        "@type": "Claim",
        "position": citation.position,
        "appearance": {
            "@type": "DigitalDocument",
            "name": citation.name,
            "url": citation.url,
            "abstract": citation.abstract_text,
            "keywords": citation.keywords,
        }
    })
}

/// Adaptive Card listing cited messages, each with a button that opens it.
pub fn citation_card(citations: &[Citation]) -> Attachment {
    let mut body = vec![json!({
        "type": "TextBlock",
        "text": "Referenced messages",
        "weight": "Bolder",
        "size": "Medium",
    })];
    for citation in citations {
        body.push(json!({
            "type": "Container",
            "separator": true,
            "items": [
                {
                    "type": "TextBlock",
                    "text": format!("[{}] {}", citation.position, citation.name),
                    "weight": "Bolder",
                    "wrap": true,
                },
                {
                    "type": "TextBlock",
                    "text": citation.abstract_text,
                    "isSubtle": true,
                    "wrap": true,
                }
            ],
            "selectAction": { "type": "Action.OpenUrl", "url": citation.url },
        }));
    }
    let actions: Vec<Value> = citations
        .iter()
        .map(|citation| {
            json!({
                "type": "Action.OpenUrl",
                "title": format!("Open [{}]", citation.position),
                "url": citation.url,
            })
        })
        .collect();

    Attachment {
        content_type: ADAPTIVE_CARD_CONTENT_TYPE.to_owned(),
        content: json!({
            "type": "AdaptiveCard",
            "$schema": ADAPTIVE_CARD_SCHEMA,
            "version": "1.5",
            "body": body,
            "actions": actions,
        }),
    }
}

/// The reply sent for a manager answer: AI label, feedback buttons and,
/// when there are citations, markers plus a card linking the sources.
pub fn finalize_response(text: &str, citations: &[Citation]) -> OutboundMessage {
    let message =
        OutboundMessage::new(text).ai_generated().with_feedback().with_citations(citations);
    if citations.is_empty() {
        return message;
    }
    let card = citation_card(message.citations());
    message.with_attachment(card)
}

#[cfg(test)]
mod tests {
    use collaborator_core::Citation;

    use super::{citation_card, finalize_response, OutboundMessage};

    fn citation(position: usize, name: &str) -> Citation {
        Citation {
            position,
            name: format!("Message from {name}"),
            url: format!("https://teams.microsoft.com/l/message/c/{position}"),
            abstract_text: "Budget review moved".to_owned(),
            keywords: vec!["budget".to_owned()],
        }
    }

    #[test]
    fn plain_reply_has_no_entities() {
        let body = serde_json::to_value(OutboundMessage::new("hi")).expect("serialize");
        assert_eq!(body["type"], "message");
        assert_eq!(body["text"], "hi");
        assert!(body.get("entities").is_none());
        assert!(body.get("channelData").is_none());
    }

    #[test]
    fn finalized_reply_marks_citations_in_order() {
        let message =
            finalize_response("Ana moved the review.", &[citation(4, "Ana"), citation(9, "Ben")]);

        assert_eq!(message.text, "Ana moved the review. [1] [2]");
        let body = serde_json::to_value(&message).expect("serialize");
        assert_eq!(body["channelData"]["feedbackLoopEnabled"], true);
        assert_eq!(body["entities"][0]["additionalType"][0], "AIGeneratedContent");
        assert_eq!(body["entities"][0]["citation"][1]["position"], 2);
        assert_eq!(
            body["entities"][0]["citation"][1]["appearance"]["name"],
            "Message from Ben"
        );
        assert_eq!(
            body["attachments"][0]["contentType"],
            "application/vnd.microsoft.card.adaptive"
        );
    }

    #[test]
    fn finalized_reply_without_citations_has_no_card() {
        let message = finalize_response("Nothing found.", &[]);
        assert_eq!(message.text, "Nothing found.");
        assert!(message.attachments.is_empty());
        assert!(message.is_ai_generated());
        assert_eq!(message.entities.len(), 1);
    }

    #[test]
    fn citation_card_links_every_source() {
        let card = citation_card(&[citation(1, "Ana")]);
        assert_eq!(card.content["version"], "1.5");
        assert_eq!(card.content["actions"][0]["type"], "Action.OpenUrl");
        assert_eq!(card.content["actions"][0]["url"], "https://teams.microsoft.com/l/message/c/1");
    }

    #[test]
    fn typing_activity_serializes_type_only_content() {
        let body = serde_json::to_value(OutboundMessage::typing()).expect("serialize");
        assert_eq!(body["type"], "typing");
    }
}
