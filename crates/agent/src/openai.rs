//! Chat-completions client for OpenAI and Azure OpenAI deployments.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use collaborator_core::config::{LlmConfig, LlmProvider};

use crate::llm::{ChatCompletion, ChatMessage, ChatRequest, ChatRole, LlmClient, ToolCall};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    http: Client,
    provider: LlmProvider,
    base_url: String,
    api_version: Option<String>,
    api_key: SecretString,
}

impl OpenAiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("llm.api_key is required to reach the model provider"))?;
        let base_url = match (config.provider, config.base_url.as_deref()) {
            (_, Some(url)) => url.trim_end_matches('/').to_string(),
            (LlmProvider::OpenAi, None) => OPENAI_BASE_URL.to_string(),
            (LlmProvider::AzureOpenAi, None) => bail!("llm.base_url is required for azure_openai"),
        };
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build llm http client")?;

        Ok(Self {
            http,
            provider: config.provider,
            base_url,
            api_version: config.api_version.clone(),
            api_key,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        match self.provider {
            LlmProvider::OpenAi => format!("{}/chat/completions", self.base_url),
            LlmProvider::AzureOpenAi => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url,
                model,
                self.api_version.as_deref().unwrap_or_default()
            ),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion> {
        let url = self.endpoint(&request.model);
        let body = WireRequest::from(&request);
        debug!(
            event_name = "llm.request",
            provider = self.provider.as_str(),
            model = %request.model,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            "sending chat completion request"
        );

        let builder = self.http.post(&url).json(&body);
        let builder = match self.provider {
            LlmProvider::OpenAi => builder.bearer_auth(self.api_key.expose_secret()),
            LlmProvider::AzureOpenAi => builder.header("api-key", self.api_key.expose_secret()),
        };
        let response = builder.send().await.context("chat completion request failed")?;

        let status = response.status();
        let text = response.text().await.context("failed to read chat completion body")?;
        if !status.is_success() {
            bail!("{} API error ({}): {}", self.provider.as_str(), status, error_message(&text));
        }

        parse_completion(&text)
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: ChatRole,
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

fn function_kind() -> String {
    "function".to_string()
}

impl From<&ChatRequest> for WireRequest {
    fn from(request: &ChatRequest) -> Self {
        Self {
            model: request.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            tools: request
                .tools
                .iter()
                .map(|tool| WireTool {
                    kind: "function",
                    function: WireFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
        }
    }
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: function_kind(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.clone(),
        }
    }
}

fn parse_completion(body: &str) -> Result<ChatCompletion> {
    let response: WireResponse =
        serde_json::from_str(body).context("failed to parse chat completion response")?;
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| anyhow!("chat completion returned no choices"))?;

    if !message.tool_calls.is_empty() {
        let calls = message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();
        return Ok(ChatCompletion::ToolCalls(calls));
    }

    Ok(ChatCompletion::Text(message.content.unwrap_or_default()))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value.pointer("/error/message").and_then(Value::as_str).map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}
