use anyhow::{bail, Result};
use tracing::debug;

use crate::llm::{ChatCompletion, ChatMessage, ChatRequest, LlmClient};
use crate::tools::ToolRegistry;

pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

/// A system instruction plus the tools a model may call while answering.
pub struct Prompt {
    name: String,
    instructions: String,
    model: String,
    tools: ToolRegistry,
    max_tool_rounds: u32,
}

impl Prompt {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            model: model.into(),
            tools: ToolRegistry::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: u32) -> Self {
        self.max_tool_rounds = max_tool_rounds.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Sends `input` and executes requested tool calls until the model
    /// answers in text or the round budget runs out.
    pub async fn send(&self, llm: &dyn LlmClient, input: &str) -> Result<String> {
        let mut messages =
            vec![ChatMessage::system(self.instructions.clone()), ChatMessage::user(input)];
        let definitions = self.tools.definitions();

        for round in 0..=self.max_tool_rounds {
            let request = ChatRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                tools: definitions.clone(),
            };
            let calls = match llm.complete(request).await? {
                ChatCompletion::Text(text) => return Ok(text),
                ChatCompletion::ToolCalls(calls) => calls,
            };
            if round == self.max_tool_rounds {
                break;
            }

            messages.push(ChatMessage::assistant_tool_calls(calls.clone()));
            for call in calls {
                debug!(
                    event_name = "agent.prompt.tool_call",
                    prompt = %self.name,
                    round,
                    tool = %call.name,
                    "model requested tool"
                );
                let result = self.tools.invoke(&call.name, &call.arguments).await;
                messages.push(ChatMessage::tool_result(call.id, result));
            }
        }

        bail!(
            "prompt `{}` exceeded {} tool rounds without an answer",
            self.name,
            self.max_tool_rounds
        )
    }
}
