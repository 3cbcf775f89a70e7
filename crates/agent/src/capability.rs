use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use collaborator_core::{Citation, MessageContext, MessageRecord};

use crate::instructions::CapabilityDescriptor;
use crate::llm::LlmClient;
use crate::prompt::Prompt;

pub const EMPTY_RESPONSE: &str = "No response generated";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilityResult {
    pub response: String,
    pub error: Option<String>,
    pub citations: Vec<Citation>,
}

impl CapabilityResult {
    pub fn success(response: impl Into<String>, citations: Vec<Citation>) -> Self {
        let response = response.into();
        let response =
            if response.trim().is_empty() { EMPTY_RESPONSE.to_string() } else { response };
        Self { response, error: None, citations }
    }

    pub fn failure(capability: &str, error: impl ToString) -> Self {
        Self {
            response: format!(
                "Sorry, the {capability} capability could not complete this request."
            ),
            error: Some(error.to_string()),
            citations: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Citations gathered by a capability's tools during one request.
#[derive(Clone, Default)]
pub struct CitationCollector {
    citations: Arc<Mutex<Vec<Citation>>>,
}

impl CitationCollector {
    /// Cites `record`, numbering from 1 in collection order. Records without
    /// an activity id cannot be linked and are skipped.
    pub async fn cite(&self, record: &MessageRecord, keywords: &[String]) -> Option<Citation> {
        let mut citations = self.citations.lock().await;
        let citation = Citation::from_record(citations.len() + 1, record, keywords).ok()?;
        citations.push(citation.clone());
        Some(citation)
    }

    pub async fn take(&self) -> Vec<Citation> {
        std::mem::take(&mut *self.citations.lock().await)
    }
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    /// Routing hint shown to the manager model.
    fn description(&self) -> &str;

    /// Lowercase phrases for the keyword router.
    fn keywords(&self) -> &[&'static str];

    fn create_prompt(&self, context: &MessageContext, citations: CitationCollector) -> Prompt;

    fn llm(&self) -> Arc<dyn LlmClient>;

    async fn process_request(&self, context: &MessageContext) -> CapabilityResult {
        let citations = CitationCollector::default();
        let prompt = self.create_prompt(context, citations.clone());
        info!(
            event_name = "agent.capability.start",
            capability = self.name(),
            conversation_id = %context.conversation_id,
            window = %context.window.describe(),
            "running capability"
        );

        let llm = self.llm();
        match prompt.send(llm.as_ref(), &context.text).await {
            Ok(response) => CapabilityResult::success(response, citations.take().await),
            Err(error) => {
                warn!(
                    event_name = "agent.capability.failed",
                    capability = self.name(),
                    conversation_id = %context.conversation_id,
                    error = %error,
                    "capability failed"
                );
                CapabilityResult::failure(self.name(), error)
            }
        }
    }
}

#[derive(Clone)]
pub struct CapabilityDefinition {
    pub name: String,
    pub description: String,
    pub handler: Arc<dyn Capability>,
}

impl CapabilityDefinition {
    pub fn descriptor(&self) -> CapabilityDescriptor {
        CapabilityDescriptor { name: self.name.clone(), routing_hint: self.description.clone() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("capability `{0}` is already registered")]
    Duplicate(String),
    #[error("capability name `{0}` must be non-empty lowercase letters, digits or underscores")]
    InvalidName(String),
}

/// Registered capabilities in registration order.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    definitions: Vec<CapabilityDefinition>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Result<(), CapabilityError> {
        let name = capability.name().to_string();
        let valid = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(CapabilityError::InvalidName(name));
        }
        if self.get(&name).is_some() {
            return Err(CapabilityError::Duplicate(name));
        }

        self.definitions.push(CapabilityDefinition {
            description: capability.description().to_string(),
            name,
            handler: capability,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityDefinition> {
        self.definitions.iter().find(|definition| definition.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CapabilityDefinition> {
        self.definitions.iter()
    }

    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.definitions.iter().map(CapabilityDefinition::descriptor).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|definition| definition.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
