//! The manager decides which capability answers a message.
//!
//! In delegation mode the manager model sees one `delegate_to_<name>` tool per
//! registered capability plus `calculate_time_range` and
//! `clear_conversation_history`. Tool calls of a turn share a [`TurnState`]
//! that is created for the turn and read back once the model answers.
//!
//! In the router modes a [`Router`] picks the capability up front and the
//! manager delegates directly, pre-resolving any time phrase in the text.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{info, warn};

use collaborator_core::config::{AgentConfig, DispatchMode, LlmConfig};
use collaborator_core::{
    find_time_phrase, parse_time_phrase, Citation, ConversationId, MessageContext, TimeWindow,
};
use collaborator_db::MessageRepository;

use crate::capabilities::{string_arg, timestamp_arg};
use crate::capability::{Capability, CapabilityRegistry};
use crate::instructions::{
    delegate_tool_name, render_capability_overview, render_manager_instructions, render_turn_input,
};
use crate::llm::LlmClient;
use crate::prompt::Prompt;
use crate::router::{KeywordRouter, LlmRouter, Router};
use crate::tools::{Parameter, Tool, ToolRegistry, ToolSchema};

pub const APOLOGY_PREFIX: &str = "Sorry, I encountered an error processing your request";

#[derive(Clone, Debug)]
pub struct ManagerSettings {
    pub model: String,
    pub max_tool_rounds: u32,
    pub dispatch: DispatchMode,
}

impl ManagerSettings {
    pub fn from_config(llm: &LlmConfig, agent: &AgentConfig) -> Self {
        Self {
            model: llm.manager_model.clone(),
            max_tool_rounds: agent.max_tool_rounds,
            dispatch: agent.dispatch,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManagerResult {
    pub response: String,
    pub delegated_capability: Option<String>,
    pub citations: Vec<Citation>,
}

impl ManagerResult {
    pub fn text(response: impl Into<String>) -> Self {
        Self { response: response.into(), ..Self::default() }
    }

    pub fn apology(detail: impl std::fmt::Display) -> Self {
        Self::text(format!("{APOLOGY_PREFIX}: {detail}"))
    }
}

/// Everything the manager's tools learn during one turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnState {
    pub window: TimeWindow,
    pub delegated_capability: Option<String>,
    pub citations: Vec<Citation>,
}

impl TurnState {
    pub fn new(window: TimeWindow) -> Self {
        Self { window, delegated_capability: None, citations: Vec::new() }
    }

    /// Appends citations, renumbering them after the ones already held.
    pub fn merge_citations(&mut self, citations: Vec<Citation>) {
        for mut citation in citations {
            citation.position = self.citations.len() + 1;
            self.citations.push(citation);
        }
    }
}

type SharedTurn = Arc<Mutex<TurnState>>;

pub struct Manager {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn MessageRepository>,
    registry: CapabilityRegistry,
    settings: ManagerSettings,
    router: Option<Arc<dyn Router>>,
    instructions: String,
}

impl Manager {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn MessageRepository>,
        registry: CapabilityRegistry,
        settings: ManagerSettings,
    ) -> Self {
        let descriptors = registry.descriptors();
        let router: Option<Arc<dyn Router>> = match settings.dispatch {
            DispatchMode::Delegation => None,
            DispatchMode::Keyword => Some(Arc::new(KeywordRouter::from_registry(&registry))),
            DispatchMode::LlmRouter => Some(Arc::new(LlmRouter::new(
                llm.clone(),
                settings.model.clone(),
                descriptors.clone(),
            ))),
        };

        Self {
            instructions: render_manager_instructions(&descriptors),
            llm,
            store,
            registry,
            settings,
            router,
        }
    }

    /// Replaces the router used by the router dispatch modes.
    pub fn with_router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    /// Never fails: errors become an apology addressed to the user.
    pub async fn process_request(&self, context: &MessageContext) -> ManagerResult {
        let outcome = match self.settings.dispatch {
            DispatchMode::Delegation => self.delegate(context).await,
            DispatchMode::Keyword | DispatchMode::LlmRouter => self.route(context).await,
        };

        match outcome {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    event_name = "agent.manager.failed",
                    correlation_id = %context.activity_id,
                    conversation_id = %context.conversation_id,
                    error = %error,
                    "manager could not complete the turn"
                );
                ManagerResult::apology(error)
            }
        }
    }

    async fn delegate(&self, context: &MessageContext) -> Result<ManagerResult> {
        let turn: SharedTurn = Arc::new(Mutex::new(TurnState::new(context.window)));
        let prompt = Prompt::new("manager", self.instructions.clone(), self.settings.model.clone())
            .with_tools(self.manager_tools(context, &turn))
            .with_max_tool_rounds(self.settings.max_tool_rounds);

        let response = prompt.send(self.llm.as_ref(), &render_turn_input(context)).await?;
        let state = turn.lock().await.clone();
        Ok(ManagerResult {
            response,
            delegated_capability: state.delegated_capability,
            citations: state.citations,
        })
    }

    fn manager_tools(&self, context: &MessageContext, turn: &SharedTurn) -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(CalculateTimeRangeTool { turn: turn.clone(), now: context.received_at });
        tools.register(ClearHistoryTool {
            store: self.store.clone(),
            conversation_id: context.conversation_id.clone(),
        });
        for definition in self.registry.iter() {
            tools.register(DelegateTool {
                tool_name: delegate_tool_name(&definition.name),
                description: format!(
                    "Delegate to the {} capability: {}",
                    definition.name, definition.description
                ),
                capability: definition.handler.clone(),
                context: context.clone(),
                turn: turn.clone(),
            });
        }
        tools
    }

    async fn route(&self, context: &MessageContext) -> Result<ManagerResult> {
        let router = self.router.as_ref().ok_or_else(|| anyhow!("no router configured"))?;
        let overview =
            || ManagerResult::text(render_capability_overview(&self.registry.descriptors()));

        let Some(name) = router.route(&context.text).await else {
            return Ok(overview());
        };
        let Some(definition) = self.registry.get(&name) else {
            return Ok(overview());
        };

        let window = find_time_phrase(&context.text)
            .and_then(|phrase| parse_time_phrase(&phrase, context.received_at).ok())
            .unwrap_or(context.window);
        info!(
            event_name = "agent.manager.routed",
            correlation_id = %context.activity_id,
            capability = %name,
            window = %window.describe(),
            "routing directly to capability"
        );

        let result = definition.handler.process_request(&context.with_window(window)).await;
        let mut turn = TurnState::new(window);
        turn.merge_citations(result.citations);
        Ok(ManagerResult {
            response: result.response,
            delegated_capability: Some(name),
            citations: turn.citations,
        })
    }
}

struct CalculateTimeRangeTool {
    turn: SharedTurn,
    now: DateTime<Utc>,
}

#[async_trait]
impl Tool for CalculateTimeRangeTool {
    fn name(&self) -> &str {
        "calculate_time_range"
    }

    fn description(&self) -> &str {
        "Convert a natural language time phrase such as \"yesterday\", \"last week\" or \
         \"2 hours ago\" into exact UTC timestamps. Call this before delegating any request \
         that mentions a time period."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![Parameter::string(
            "time_phrase",
            "The exact time phrase from the user's message",
        )
        .required()])
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let phrase = string_arg(&input, "time_phrase").unwrap_or_default();
        match parse_time_phrase(phrase, self.now) {
            Ok(window) => {
                self.turn.lock().await.window = window;
                Ok(json!({
                    "status": "success",
                    "calculated_start_time": window.start.to_rfc3339(),
                    "calculated_end_time": window.end.to_rfc3339(),
                    "timespan_description": format!("{phrase} ({})", window.describe()),
                }))
            }
            Err(error) => Ok(json!({ "status": "error", "message": error.to_string() })),
        }
    }
}

struct ClearHistoryTool {
    store: Arc<dyn MessageRepository>,
    conversation_id: ConversationId,
}

#[async_trait]
impl Tool for ClearHistoryTool {
    fn name(&self) -> &str {
        "clear_conversation_history"
    }

    fn description(&self) -> &str {
        "Delete every stored message of this conversation. Only call this when the user \
         explicitly asks to clear or reset the history."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::default()
    }

    async fn execute(&self, _input: Value) -> Result<Value> {
        let deleted = self.store.clear_conversation(&self.conversation_id).await?;
        info!(
            event_name = "agent.history.cleared",
            conversation_id = %self.conversation_id,
            deleted,
            "cleared conversation history"
        );
        Ok(json!({
            "status": "success",
            "deleted_messages": deleted,
            "message": "The conversation history has been cleared.",
        }))
    }
}

struct DelegateTool {
    tool_name: String,
    description: String,
    capability: Arc<dyn Capability>,
    context: MessageContext,
    turn: SharedTurn,
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(vec![
            Parameter::string("calculated_start_time", "RFC 3339 start from calculate_time_range"),
            Parameter::string("calculated_end_time", "RFC 3339 end from calculate_time_range"),
            Parameter::string("timespan_description", "Readable description of the time span"),
        ])
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let explicit = match (
            timestamp_arg(&input, "calculated_start_time"),
            timestamp_arg(&input, "calculated_end_time"),
        ) {
            (Some(start), Some(end)) if start <= end => Some(TimeWindow::new(start, end)),
            _ => None,
        };
        let window = match explicit {
            Some(window) => window,
            None => self.turn.lock().await.window,
        };

        let name = self.capability.name().to_string();
        info!(
            event_name = "agent.manager.delegated",
            correlation_id = %self.context.activity_id,
            capability = %name,
            window = %window.describe(),
            "delegating to capability"
        );
        let result = self.capability.process_request(&self.context.with_window(window)).await;

        let mut turn = self.turn.lock().await;
        turn.delegated_capability = Some(name.clone());
        turn.merge_citations(result.citations);
        match result.error {
            Some(error) => Ok(Value::String(format!("Error in {name} capability: {error}"))),
            None => Ok(Value::String(result.response)),
        }
    }
}
