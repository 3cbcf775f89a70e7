use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use collaborator_core::{InboundMessage, Reaction};

use crate::activity::ConversationReference;
use crate::outbound::OutboundMessage;

#[derive(Clone, Debug, PartialEq)]
pub enum TeamsEvent {
    Message(MessageEvent),
    FeedbackSubmit(FeedbackEvent),
    Unsupported { activity_type: String },
}

impl TeamsEvent {
    pub fn event_type(&self) -> TeamsEventType {
        match self {
            Self::Message(_) => TeamsEventType::Message,
            Self::FeedbackSubmit(_) => TeamsEventType::FeedbackSubmit,
            Self::Unsupported { .. } => TeamsEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TeamsEventType {
    Message,
    FeedbackSubmit,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MessageEvent {
    pub inbound: InboundMessage,
    pub reference: ConversationReference,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedbackEvent {
    pub activity_id: String,
    /// Id of the bot message the feedback is about.
    pub reply_to_id: Option<String>,
    pub user_id: Option<String>,
    pub reaction: Reaction,
    pub feedback_text: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum HandlerResult {
    Responded(OutboundMessage),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("message handler failure: {0}")]
    Message(String),
    #[error("feedback handler failure: {0}")]
    Feedback(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> TeamsEventType;
    async fn handle(
        &self,
        event: &TeamsEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<TeamsEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        event: &TeamsEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(event, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Handles a chat message. Returns the reply when the bot answered.
#[async_trait]
pub trait MessageService: Send + Sync {
    async fn handle_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<OutboundMessage>, EventHandlerError>;
}

pub struct MessageHandler<S> {
    service: S,
}

impl<S> MessageHandler<S>
where
    S: MessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MessageHandler<S>
where
    S: MessageService + 'static,
{
    fn event_type(&self) -> TeamsEventType {
        TeamsEventType::Message
    }

    async fn handle(
        &self,
        event: &TeamsEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let TeamsEvent::Message(event) = event else {
            return Ok(HandlerResult::Ignored);
        };

        let reply = self.service.handle_message(event, ctx).await?;
        Ok(match reply {
            Some(reply) => HandlerResult::Responded(reply),
            None => HandlerResult::Processed,
        })
    }
}

#[async_trait]
pub trait FeedbackService: Send + Sync {
    /// Returns `false` when the feedback could not be attributed to a message.
    async fn record_feedback(
        &self,
        event: &FeedbackEvent,
        ctx: &EventContext,
    ) -> Result<bool, EventHandlerError>;
}

pub struct FeedbackHandler<S> {
    service: S,
}

impl<S> FeedbackHandler<S>
where
    S: FeedbackService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for FeedbackHandler<S>
where
    S: FeedbackService + 'static,
{
    fn event_type(&self) -> TeamsEventType {
        TeamsEventType::FeedbackSubmit
    }

    async fn handle(
        &self,
        event: &TeamsEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let TeamsEvent::FeedbackSubmit(event) = event else {
            return Ok(HandlerResult::Ignored);
        };

        Ok(if self.service.record_feedback(event, ctx).await? {
            HandlerResult::Processed
        } else {
            HandlerResult::Ignored
        })
    }
}
