//! Built-in capabilities and the helpers their tools share.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::warn;

use collaborator_core::config::{AgentConfig, LlmConfig};
use collaborator_core::{ConversationId, MessageRecord, TimeWindow};
use collaborator_db::{ActionItemRepository, MessageRepository};

use crate::capability::{CapabilityError, CapabilityRegistry};
use crate::llm::LlmClient;

pub mod action_items;
pub mod search;
pub mod summarizer;

pub use action_items::ActionItemsCapability;
pub use search::SearchCapability;
pub use summarizer::SummarizerCapability;

#[derive(Clone, Debug)]
pub struct CapabilitySettings {
    pub model: String,
    pub max_tool_rounds: u32,
    pub max_search_results: u32,
}

impl CapabilitySettings {
    pub fn from_config(llm: &LlmConfig, agent: &AgentConfig) -> Self {
        Self {
            model: llm.capability_model.clone(),
            max_tool_rounds: agent.max_tool_rounds,
            max_search_results: agent.max_search_results,
        }
    }
}

/// Registry with summarizer, action_items and search, in that order.
pub fn standard_registry(
    llm: Arc<dyn LlmClient>,
    messages: Arc<dyn MessageRepository>,
    action_items: Arc<dyn ActionItemRepository>,
    settings: CapabilitySettings,
) -> Result<CapabilityRegistry, CapabilityError> {
    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(SummarizerCapability::new(
        llm.clone(),
        messages.clone(),
        settings.clone(),
    )))?;
    registry.register(Arc::new(ActionItemsCapability::new(
        llm.clone(),
        messages.clone(),
        action_items,
        settings.clone(),
    )))?;
    registry.register(Arc::new(SearchCapability::new(llm, messages, settings)))?;
    Ok(registry)
}

/// Messages in `window`, or nothing when the store cannot be read.
pub(crate) async fn load_window(
    store: &dyn MessageRepository,
    conversation_id: &ConversationId,
    window: &TimeWindow,
) -> Vec<MessageRecord> {
    match store.messages_in_range(conversation_id, window).await {
        Ok(records) => records,
        Err(error) => {
            warn!(
                event_name = "agent.store.read_failed",
                conversation_id = %conversation_id,
                error = %error,
                "treating unreadable history as empty"
            );
            Vec::new()
        }
    }
}

pub(crate) fn transcript(records: &[MessageRecord], include_role: bool) -> Value {
    let messages: Vec<Value> = records
        .iter()
        .map(|record| {
            let mut entry = json!({
                "timestamp": record.timestamp.to_rfc3339(),
                "name": record.name,
                "content": record.content,
            });
            if include_role {
                entry["role"] = json!(record.role.as_str());
            }
            entry
        })
        .collect();
    json!({ "message_count": messages.len(), "messages": messages })
}

pub(crate) fn string_arg<'a>(input: &'a Value, key: &str) -> Option<&'a str> {
    input.get(key).and_then(Value::as_str).map(str::trim).filter(|value| !value.is_empty())
}

pub(crate) fn string_list_arg(input: &Value, key: &str) -> Vec<String> {
    input
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

pub(crate) fn timestamp_arg(input: &Value, key: &str) -> Option<DateTime<Utc>> {
    string_arg(input, key)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|timestamp| timestamp.with_timezone(&Utc))
}
