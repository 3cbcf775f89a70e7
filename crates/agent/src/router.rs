use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::capability::CapabilityRegistry;
use crate::instructions::CapabilityDescriptor;
use crate::llm::{ChatCompletion, ChatMessage, ChatRequest, LlmClient};

/// Picks the capability that should handle a message, if any.
#[async_trait]
pub trait Router: Send + Sync {
    async fn route(&self, text: &str) -> Option<String>;
}

/// Case-insensitive substring matching over each capability's keywords.
/// Capabilities are tried in registration order.
pub struct KeywordRouter {
    routes: Vec<(String, Vec<String>)>,
}

impl KeywordRouter {
    pub fn new(routes: Vec<(String, Vec<String>)>) -> Self {
        let routes = routes
            .into_iter()
            .map(|(name, keywords)| {
                (name, keywords.into_iter().map(|keyword| keyword.to_lowercase()).collect())
            })
            .collect();
        Self { routes }
    }

    pub fn from_registry(registry: &CapabilityRegistry) -> Self {
        Self::new(
            registry
                .iter()
                .map(|definition| {
                    let keywords =
                        definition.handler.keywords().iter().map(|k| k.to_string()).collect();
                    (definition.name.clone(), keywords)
                })
                .collect(),
        )
    }

    pub fn route_text(&self, text: &str) -> Option<String> {
        let text = text.to_lowercase();
        self.routes
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|keyword| text.contains(keyword.as_str())))
            .map(|(name, _)| name.clone())
    }
}

#[async_trait]
impl Router for KeywordRouter {
    async fn route(&self, text: &str) -> Option<String> {
        self.route_text(text)
    }
}

/// One-shot classification by the model.
pub struct LlmRouter {
    llm: Arc<dyn LlmClient>,
    model: String,
    capabilities: Vec<CapabilityDescriptor>,
}

impl LlmRouter {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        capabilities: Vec<CapabilityDescriptor>,
    ) -> Self {
        Self { llm, model: model.into(), capabilities }
    }

    fn instructions(&self) -> String {
        let listing: Vec<String> = self
            .capabilities
            .iter()
            .map(|capability| format!("- {}: {}", capability.name, capability.routing_hint))
            .collect();
        format!(
            "Classify the user's message. Reply with exactly one capability name from the list \
             below, or `none` if no capability fits. Reply with the name only.\n\n{}",
            listing.join("\n")
        )
    }

    fn parse(&self, reply: &str) -> Option<String> {
        let answer = reply
            .trim()
            .trim_matches(|c: char| c == '`' || c == '"' || c == '\'' || c == '.')
            .to_lowercase();
        self.capabilities
            .iter()
            .find(|capability| capability.name == answer)
            .map(|capability| capability.name.clone())
    }
}

#[async_trait]
impl Router for LlmRouter {
    async fn route(&self, text: &str) -> Option<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(self.instructions()), ChatMessage::user(text)],
            tools: Vec::new(),
        };
        match self.llm.complete(request).await {
            Ok(ChatCompletion::Text(reply)) => {
                let route = self.parse(&reply);
                debug!(
                    event_name = "agent.router.classified",
                    reply = %reply,
                    route = ?route,
                    "classified message"
                );
                route
            }
            Ok(ChatCompletion::ToolCalls(_)) => {
                warn!(
                    event_name = "agent.router.unexpected_tool_call",
                    "router model requested tools"
                );
                None
            }
            Err(error) => {
                warn!(
                    event_name = "agent.router.failed",
                    error = %error,
                    "router classification failed"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;

    use super::{KeywordRouter, LlmRouter, Router};
    use crate::instructions::CapabilityDescriptor;
    use crate::llm::{ChatCompletion, ChatRequest, LlmClient};

    struct FixedReply(&'static str);

    #[async_trait]
    impl LlmClient for FixedReply {
        async fn complete(&self, _request: ChatRequest) -> Result<ChatCompletion> {
            Ok(ChatCompletion::Text(self.0.to_string()))
        }
    }

    fn routes() -> Vec<(String, Vec<String>)> {
        vec![
            ("summarizer".to_string(), vec!["summar".to_string(), "recap".to_string()]),
            ("search".to_string(), vec!["find".to_string(), "Summary Of".to_string()]),
        ]
    }

    fn descriptors() -> Vec<CapabilityDescriptor> {
        ["summarizer", "search"]
            .iter()
            .map(|name| CapabilityDescriptor {
                name: name.to_string(),
                routing_hint: String::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn first_registered_match_wins() {
        let router = KeywordRouter::new(routes());
        assert_eq!(
            router.route("Find the SUMMARY of yesterday").await.as_deref(),
            Some("summarizer")
        );
        assert_eq!(router.route("find the deck").await.as_deref(), Some("search"));
        assert_eq!(router.route("hello there").await, None);
    }

    #[tokio::test]
    async fn llm_router_accepts_only_registered_names() {
        let known = LlmRouter::new(Arc::new(FixedReply(" `Search`.\n")), "m", descriptors());
        assert_eq!(known.route("where is the deck").await.as_deref(), Some("search"));

        let unknown = LlmRouter::new(Arc::new(FixedReply("weather")), "m", descriptors());
        assert_eq!(unknown.route("is it raining").await, None);

        let none = LlmRouter::new(Arc::new(FixedReply("none")), "m", descriptors());
        assert_eq!(none.route("hi").await, None);
    }
}
