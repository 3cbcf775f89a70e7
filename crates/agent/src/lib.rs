//! Agent runtime for the Collaborator bot.
//!
//! A [`manager::Manager`] receives every message the bot answers and hands it
//! to one of the registered [`capability::Capability`] implementations:
//!
//! 1. **Context** (`context`) - build a `MessageContext` from the inbound message
//! 2. **Dispatch** (`manager`, `router`) - pick a capability by model function
//!    calling, keyword rules or one-shot classification
//! 3. **Capabilities** (`capabilities`) - summarizer, action items and search,
//!    each a prompt plus tools over the conversation store
//! 4. **Tools** (`tools`, `prompt`) - schema-checked functions run in a bounded
//!    request/tool-call loop
//!
//! The model only phrases answers. Time windows, storage queries and citation
//! links are computed deterministically by the tools.

pub mod capabilities;
pub mod capability;
pub mod context;
pub mod instructions;
pub mod llm;
pub mod manager;
pub mod openai;
pub mod prompt;
pub mod router;
pub mod tools;

pub use capability::{
    Capability, CapabilityDefinition, CapabilityError, CapabilityRegistry, CapabilityResult,
    CitationCollector,
};
pub use context::{MemberDirectory, MessageContextBuilder};
pub use llm::{ChatCompletion, ChatMessage, ChatRequest, LlmClient, ToolCall, ToolDefinition};
pub use manager::{Manager, ManagerResult, ManagerSettings, TurnState};
pub use openai::OpenAiClient;
pub use router::{KeywordRouter, LlmRouter, Router};
