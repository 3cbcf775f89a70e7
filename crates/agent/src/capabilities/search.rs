use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use collaborator_core::citation::preview;
use collaborator_core::{ConversationId, MessageContext, TimeWindow};
use collaborator_db::{MessageFilter, MessageRepository};

use super::{string_list_arg, timestamp_arg, CapabilitySettings};
use crate::capability::{Capability, CitationCollector};
use crate::llm::LlmClient;
use crate::prompt::Prompt;
use crate::tools::{Parameter, Tool, ToolRegistry, ToolSchema};

const INSTRUCTIONS: &str = "You are the Search capability of Collaborator. You help users find \
specific conversations or messages in their chat history.\n\n\
You can find conversations between specific people, messages about a topic, messages from a \
time period and messages containing keywords. Time ranges have already been calculated for you.\n\n\
Use search_messages to query the history. Its results link back to the original messages and \
those links are shown to the user as citations.\n\n\
<RESPONSE FORMAT>\n\
Write a short conversational summary of what was found, mentioning who said it and when. \
If nothing was found, suggest broader keywords or a wider time range.";

const PREVIEW_CHARS: usize = 100;
pub const NO_MATCHES: &str = "No matching messages found.";

pub struct SearchCapability {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn MessageRepository>,
    settings: CapabilitySettings,
}

impl SearchCapability {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn MessageRepository>,
        settings: CapabilitySettings,
    ) -> Self {
        Self { llm, store, settings }
    }
}

#[async_trait]
impl Capability for SearchCapability {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "finding or searching for messages and conversations by keyword, participant or time, \
         show me, where or when did someone say something, links to original messages"
    }

    fn keywords(&self) -> &[&'static str] {
        &["find", "search", "look for", "locate", "show me", "where did", "when did"]
    }

    fn create_prompt(&self, context: &MessageContext, citations: CitationCollector) -> Prompt {
        let mut tools = ToolRegistry::new();
        tools.register(SearchMessagesTool {
            store: self.store.clone(),
            conversation_id: context.conversation_id.clone(),
            window: context.window,
            default_max_results: self.settings.max_search_results,
            citations,
        });

        let instructions = format!(
            "{INSTRUCTIONS}\n\nTime window: {}\n{}",
            context.window.describe(),
            context.chat_description()
        );
        Prompt::new(self.name(), instructions, self.settings.model.clone())
            .with_tools(tools)
            .with_max_tool_rounds(self.settings.max_tool_rounds)
    }

    fn llm(&self) -> Arc<dyn LlmClient> {
        self.llm.clone()
    }
}

struct SearchMessagesTool {
    store: Arc<dyn MessageRepository>,
    conversation_id: ConversationId,
    window: TimeWindow,
    default_max_results: u32,
    citations: CitationCollector,
}

#[async_trait]
impl Tool for SearchMessagesTool {
    fn name(&self) -> &str {
        "search_messages"
    }

    fn description(&self) -> &str {
        "Search the conversation history by keywords, participants and time range. \
         Returns the newest matches first with links to the original messages."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            Parameter::string_array("keywords", "Words to look for in message content").required(),
            Parameter::string_array("participants", "Names of people who wrote the messages"),
            Parameter::string("start_time", "RFC 3339 start of the search range"),
            Parameter::string("end_time", "RFC 3339 end of the search range"),
            Parameter::integer("max_results", "Maximum number of matches").range(1.0, 50.0),
        ])
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let keywords = string_list_arg(&input, "keywords");
        let window = TimeWindow::new(
            timestamp_arg(&input, "start_time").unwrap_or(self.window.start),
            timestamp_arg(&input, "end_time").unwrap_or(self.window.end),
        );
        let max_results = input
            .get("max_results")
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
            .or(Some(self.default_max_results));
        let filter = MessageFilter::new(window)
            .with_keywords(keywords.clone())
            .with_participants(string_list_arg(&input, "participants"))
            .with_max_results(max_results);

        let records = match self.store.filtered_messages(&self.conversation_id, &filter).await {
            Ok(records) => records,
            Err(error) => {
                warn!(
                    event_name = "agent.store.read_failed",
                    conversation_id = %self.conversation_id,
                    error = %error,
                    "treating failed search as empty"
                );
                Vec::new()
            }
        };
        if records.is_empty() {
            return Ok(Value::String(NO_MATCHES.to_string()));
        }

        let mut lines = Vec::with_capacity(records.len());
        for record in &records {
            let when = record.timestamp.format("%Y-%m-%d %H:%M UTC");
            let quote = preview(&record.content, PREVIEW_CHARS);
            let line = match self.citations.cite(record, &keywords).await {
                Some(citation) => {
                    format!("• [{}]({}) at {when}: \"{quote}\"", record.name, citation.url)
                }
                None => format!("• {} at {when}: \"{quote}\"", record.name),
            };
            lines.push(line);
        }
        Ok(Value::String(format!(
            "Found {} matching message(s):\n{}",
            records.len(),
            lines.join("\n")
        )))
    }
}
