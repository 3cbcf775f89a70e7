use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use collaborator_core::{ConversationId, MessageContext, TimeWindow};
use collaborator_db::MessageRepository;

use super::{load_window, transcript, CapabilitySettings};
use crate::capability::{Capability, CitationCollector};
use crate::llm::LlmClient;
use crate::prompt::Prompt;
use crate::tools::{Parameter, Tool, ToolRegistry, ToolSchema};

const INSTRUCTIONS: &str = "You are the Summarizer capability of Collaborator. You analyze \
conversations between groups of people and produce short summaries with attribution.\n\n\
<INSTRUCTIONS>\n\
1. Call summarize_conversation to load the messages of the requested time window. The window \
has already been calculated for you.\n\
2. Use get_recent_messages when the user asks about only the last few messages.\n\
3. Identify participants and topics.\n\
4. Return a brief summary. Use bullet points for main topics and name the participants who \
raised each point.\n\
5. If there are no messages, say so plainly.";

const DEFAULT_RECENT_LIMIT: u32 = 5;

pub struct SummarizerCapability {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn MessageRepository>,
    settings: CapabilitySettings,
}

impl SummarizerCapability {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn MessageRepository>,
        settings: CapabilitySettings,
    ) -> Self {
        Self { llm, store, settings }
    }
}

#[async_trait]
impl Capability for SummarizerCapability {
    fn name(&self) -> &str {
        "summarizer"
    }

    fn description(&self) -> &str {
        "conversation summaries, recaps and overviews, what happened or was discussed, \
         participant insights and catching up on message history"
    }

    fn keywords(&self) -> &[&'static str] {
        &["summar", "recap", "overview", "what happened", "catch me up", "what did we discuss"]
    }

    fn create_prompt(&self, context: &MessageContext, _citations: CitationCollector) -> Prompt {
        let mut tools = ToolRegistry::new();
        tools.register(SummarizeConversationTool {
            store: self.store.clone(),
            conversation_id: context.conversation_id.clone(),
            window: context.window,
        });
        tools.register(RecentMessagesTool {
            store: self.store.clone(),
            conversation_id: context.conversation_id.clone(),
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

struct SummarizeConversationTool {
    store: Arc<dyn MessageRepository>,
    conversation_id: ConversationId,
    window: TimeWindow,
}

#[async_trait]
impl Tool for SummarizeConversationTool {
    fn name(&self) -> &str {
        "summarize_conversation"
    }

    fn description(&self) -> &str {
        "Load every message of the conversation inside the current time window, oldest first."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::default()
    }

    async fn execute(&self, _input: Value) -> Result<Value> {
        let records = load_window(self.store.as_ref(), &self.conversation_id, &self.window).await;
        let mut payload = transcript(&records, false);
        payload["timespan"] = json!(self.window.describe());
        Ok(payload)
    }
}

struct RecentMessagesTool {
    store: Arc<dyn MessageRepository>,
    conversation_id: ConversationId,
}

#[async_trait]
impl Tool for RecentMessagesTool {
    fn name(&self) -> &str {
        "get_recent_messages"
    }

    fn description(&self) -> &str {
        "Load the most recent messages of the conversation regardless of time window."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![Parameter::integer("limit", "How many messages to load (default 5)")
            .range(1.0, 20.0)])
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let limit = input
            .get("limit")
            .and_then(Value::as_u64)
            .and_then(|limit| u32::try_from(limit).ok())
            .unwrap_or(DEFAULT_RECENT_LIMIT);
        let records = match self.store.recent_messages(&self.conversation_id, limit).await {
            Ok(records) => records,
            Err(error) => {
                warn!(
                    event_name = "agent.store.read_failed",
                    conversation_id = %self.conversation_id,
                    error = %error,
                    "treating unreadable history as empty"
                );
                Vec::new()
            }
        };
        Ok(transcript(&records, false))
    }
}
