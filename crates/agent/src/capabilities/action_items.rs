use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use collaborator_core::{
    parse_time_phrase, ActionItemFilter, ActionItemPriority, ActionItemStatus, ConversationId,
    Member, MessageContext, NewActionItem, TimeWindow,
};
use collaborator_db::{ActionItemRepository, MessageRepository};

use super::{load_window, string_arg, transcript, CapabilitySettings};
use crate::capability::{Capability, CitationCollector};
use crate::llm::LlmClient;
use crate::prompt::Prompt;
use crate::tools::{Parameter, Tool, ToolRegistry, ToolSchema};

const INSTRUCTIONS: &str = "You are the Action Items capability of Collaborator. You find the \
tasks people committed to in team conversations and keep track of them.\n\n\
<INSTRUCTIONS>\n\
1. Call generate_action_items to read the conversation for the current time window.\n\
2. Look for commitments such as \"I'll take care of this\", \"can you follow up on\", \
\"let's finish this by tomorrow\" or \"assign this to Alex\".\n\
3. Use get_chat_members to match people to their ids before assigning work.\n\
4. Use create_action_item only when the user asks you to create or assign a task.\n\
5. Use list_action_items and update_action_item to report on or change existing items.\n\n\
<OUTPUT FORMAT>\n\
A plain bullet list. Each item names the task and, when known, the person responsible.\n\
Do not assign a task to anyone unless the conversation suggests it.";

pub struct ActionItemsCapability {
    llm: Arc<dyn LlmClient>,
    messages: Arc<dyn MessageRepository>,
    items: Arc<dyn ActionItemRepository>,
    settings: CapabilitySettings,
}

impl ActionItemsCapability {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        messages: Arc<dyn MessageRepository>,
        items: Arc<dyn ActionItemRepository>,
        settings: CapabilitySettings,
    ) -> Self {
        Self { llm, messages, items, settings }
    }
}

#[async_trait]
impl Capability for ActionItemsCapability {
    fn name(&self) -> &str {
        "action_items"
    }

    fn description(&self) -> &str {
        "action items, tasks, to-dos, next steps, follow-ups, assigning work, \
         task status updates and personal queries like my tasks"
    }

    fn keywords(&self) -> &[&'static str] {
        &["action item", "task", "to-do", "todo", "next step", "follow-up", "follow up", "assign"]
    }

    fn create_prompt(&self, context: &MessageContext, _citations: CitationCollector) -> Prompt {
        let conversation_id = context.conversation_id.clone();
        let default_assignee = context
            .is_personal_chat
            .then(|| context.user_id.clone().unwrap_or_else(|| context.user_name.clone()));

        let mut tools = ToolRegistry::new();
        tools.register(GenerateActionItemsTool {
            store: self.messages.clone(),
            conversation_id: conversation_id.clone(),
            window: context.window,
        });
        tools.register(ChatMembersTool { members: context.members.clone() });
        tools.register(CreateActionItemTool {
            items: self.items.clone(),
            conversation_id: conversation_id.clone(),
            assigned_by: context.user_name.clone(),
            default_assignee,
            now: context.received_at,
        });
        tools.register(ListActionItemsTool {
            items: self.items.clone(),
            conversation_id: conversation_id.clone(),
        });
        tools.register(UpdateActionItemTool { items: self.items.clone(), conversation_id });

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

struct GenerateActionItemsTool {
    store: Arc<dyn MessageRepository>,
    conversation_id: ConversationId,
    window: TimeWindow,
}

#[async_trait]
impl Tool for GenerateActionItemsTool {
    fn name(&self) -> &str {
        "generate_action_items"
    }

    fn description(&self) -> &str {
        "Load the conversation for the current time window so action items can be extracted."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::default()
    }

    async fn execute(&self, _input: Value) -> Result<Value> {
        let records = load_window(self.store.as_ref(), &self.conversation_id, &self.window).await;
        Ok(transcript(&records, true))
    }
}

struct ChatMembersTool {
    members: Vec<Member>,
}

#[async_trait]
impl Tool for ChatMembersTool {
    fn name(&self) -> &str {
        "get_chat_members"
    }

    fn description(&self) -> &str {
        "List the members of this conversation with their ids."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::default()
    }

    async fn execute(&self, _input: Value) -> Result<Value> {
        Ok(json!({ "member_count": self.members.len(), "members": self.members }))
    }
}

struct CreateActionItemTool {
    items: Arc<dyn ActionItemRepository>,
    conversation_id: ConversationId,
    assigned_by: String,
    default_assignee: Option<String>,
    now: DateTime<Utc>,
}

impl CreateActionItemTool {
    /// Accepts an RFC 3339 timestamp or a time phrase, which resolves to the
    /// end of the window it names.
    fn due_date(&self, raw: &str) -> Result<DateTime<Utc>> {
        if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
            return Ok(timestamp.with_timezone(&Utc));
        }
        let window = parse_time_phrase(raw, self.now)?;
        Ok(window.end)
    }
}

#[async_trait]
impl Tool for CreateActionItemTool {
    fn name(&self) -> &str {
        "create_action_item"
    }

    fn description(&self) -> &str {
        "Create a new action item and assign it to a conversation member."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            Parameter::string("title", "Short title of the task").required(),
            Parameter::string("description", "What needs to be done").required(),
            Parameter::string(
                "assigned_to",
                "Member id or name of the assignee. Defaults to the requester in personal chats.",
            ),
            Parameter::string("priority", "Task priority")
                .required()
                .one_of(&ActionItemPriority::ALL),
            Parameter::string("due_date", "Due date as RFC 3339 or a phrase such as \"tomorrow\""),
        ])
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let assigned_to = string_arg(&input, "assigned_to")
            .map(str::to_string)
            .or_else(|| self.default_assignee.clone())
            .ok_or_else(|| anyhow!("assigned_to is required outside personal chats"))?;
        let priority =
            ActionItemPriority::from_str(string_arg(&input, "priority").unwrap_or_default())?;
        let due_date = string_arg(&input, "due_date").map(|raw| self.due_date(raw)).transpose()?;

        let item = self
            .items
            .create(NewActionItem {
                conversation_id: self.conversation_id.clone(),
                title: string_arg(&input, "title").unwrap_or_default().to_string(),
                description: string_arg(&input, "description").unwrap_or_default().to_string(),
                assigned_to,
                assigned_by: self.assigned_by.clone(),
                priority,
                due_date,
            })
            .await?;

        info!(
            event_name = "agent.action_item.created",
            conversation_id = %self.conversation_id,
            action_item_id = item.id,
            "created action item"
        );
        Ok(json!({ "status": "success", "action_item": item }))
    }
}

struct ListActionItemsTool {
    items: Arc<dyn ActionItemRepository>,
    conversation_id: ConversationId,
}

#[async_trait]
impl Tool for ListActionItemsTool {
    fn name(&self) -> &str {
        "list_action_items"
    }

    fn description(&self) -> &str {
        "List action items of this conversation, optionally filtered by assignee or status."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            Parameter::string("assigned_to", "Part of the assignee id or name"),
            Parameter::string("status", "Only items in this status").one_of(&ActionItemStatus::ALL),
        ])
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let filter = ActionItemFilter {
            assigned_to: string_arg(&input, "assigned_to").map(str::to_string),
            status: string_arg(&input, "status").map(ActionItemStatus::from_str).transpose()?,
        };
        let items = match self.items.list(&self.conversation_id, &filter).await {
            Ok(items) => items,
            Err(error) => {
                warn!(
                    event_name = "agent.store.read_failed",
                    conversation_id = %self.conversation_id,
                    error = %error,
                    "treating unreadable action items as empty"
                );
                Vec::new()
            }
        };
        Ok(json!({ "count": items.len(), "action_items": items }))
    }
}

struct UpdateActionItemTool {
    items: Arc<dyn ActionItemRepository>,
    conversation_id: ConversationId,
}

#[async_trait]
impl Tool for UpdateActionItemTool {
    fn name(&self) -> &str {
        "update_action_item"
    }

    fn description(&self) -> &str {
        "Change the status of an existing action item."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            Parameter::integer("action_item_id", "Id of the action item").required(),
            Parameter::string("new_status", "The new status")
                .required()
                .one_of(&ActionItemStatus::ALL),
        ])
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let id = input
            .get("action_item_id")
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow!("action_item_id must be an integer"))?;
        let status =
            ActionItemStatus::from_str(string_arg(&input, "new_status").unwrap_or_default())?;

        match self.items.update_status(&self.conversation_id, id, status).await? {
            Some(item) => Ok(json!({ "status": "success", "action_item": item })),
            None => Ok(json!({
                "status": "error",
                "message": format!("action item {id} was not found in this conversation"),
            })),
        }
    }
}
