use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use collaborator_agent::{Manager, MemberDirectory, MessageContextBuilder};
use collaborator_core::domain::context::DEFAULT_WINDOW_HOURS;
use collaborator_core::{
    ConversationId, FeedbackRecord, Member, MessageRecord, MessageRole,
};
use collaborator_db::{FeedbackRepository, MessageRepository};
use collaborator_teams::events::{
    EventHandlerError, FeedbackEvent, FeedbackService, MessageEvent, MessageService,
};
use collaborator_teams::{
    finalize_response, ConversationClient, ConversationReference, EventContext, OutboundMessage,
};

/// Author name stored for the bot's own replies.
pub const BOT_NAME: &str = "Collaborator";

/// Member lookups for one conversation, answered by the connector.
struct ConnectorDirectory {
    connector: Arc<dyn ConversationClient>,
    reference: ConversationReference,
}

#[async_trait]
impl MemberDirectory for ConnectorDirectory {
    async fn list_members(&self, _conversation_id: &ConversationId) -> anyhow::Result<Vec<Member>> {
        Ok(self.connector.list_members(&self.reference).await?)
    }
}

pub struct TurnService {
    manager: Arc<Manager>,
    messages: Arc<dyn MessageRepository>,
    connector: Arc<dyn ConversationClient>,
    window_hours: i64,
}

impl TurnService {
    pub fn new(
        manager: Arc<Manager>,
        messages: Arc<dyn MessageRepository>,
        connector: Arc<dyn ConversationClient>,
    ) -> Self {
        Self { manager, messages, connector, window_hours: DEFAULT_WINDOW_HOURS }
    }

    pub fn with_window_hours(mut self, hours: i64) -> Self {
        self.window_hours = hours;
        self
    }

    async fn persist(&self, ctx: &EventContext, records: &[MessageRecord]) {
        if let Err(error) = self.messages.add_messages(records).await {
            warn!(
                event_name = "server.turn.persist_failed",
                correlation_id = %ctx.correlation_id,
                records = records.len(),
                error = %error,
                "could not store conversation messages"
            );
        }
    }
}

#[async_trait]
impl MessageService for TurnService {
    async fn handle_message(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<OutboundMessage>, EventHandlerError> {
        let inbound = &event.inbound;
        let received_at = Utc::now();
        let inbound_record = inbound.to_record(received_at);

        if !inbound.requires_response() {
            self.persist(ctx, &[inbound_record]).await;
            return Ok(None);
        }

        if let Err(error) = self.connector.send_typing(&event.reference).await {
            warn!(
                event_name = "server.turn.typing_failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "typing indicator was not delivered"
            );
        }

        let directory: Arc<dyn MemberDirectory> = Arc::new(ConnectorDirectory {
            connector: self.connector.clone(),
            reference: event.reference.clone(),
        });
        let context = MessageContextBuilder::new(Some(directory))
            .with_window_hours(self.window_hours)
            .build(inbound, received_at)
            .await;

        let result = self.manager.process_request(&context).await;
        let reply =
            finalize_response(&result.response, &result.citations).reply_to(&inbound.activity_id);

        let sent_id = match self.connector.send_activity(&event.reference, &reply).await {
            Ok(sent_id) => sent_id,
            Err(error) => {
                self.persist(ctx, &[inbound_record]).await;
                return Err(EventHandlerError::Message(error.to_string()));
            }
        };
        info!(
            event_name = "server.turn.replied",
            correlation_id = %ctx.correlation_id,
            conversation_id = %inbound.conversation_id,
            capability = result.delegated_capability.as_deref().unwrap_or("none"),
            citations = result.citations.len(),
            "reply sent"
        );

        let reply_record = MessageRecord {
            conversation_id: inbound.conversation_id.clone(),
            role: MessageRole::Model,
            name: BOT_NAME.to_owned(),
            content: result.response,
            timestamp: Utc::now(),
            activity_id: if sent_id.is_empty() { Uuid::new_v4().to_string() } else { sent_id },
        };
        self.persist(ctx, &[inbound_record, reply_record]).await;

        Ok(Some(reply))
    }
}

pub struct FeedbackRecorder {
    store: Arc<dyn FeedbackRepository>,
}

impl FeedbackRecorder {
    pub fn new(store: Arc<dyn FeedbackRepository>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl FeedbackService for FeedbackRecorder {
    async fn record_feedback(
        &self,
        event: &FeedbackEvent,
        ctx: &EventContext,
    ) -> Result<bool, EventHandlerError> {
        let Some(message_id) = &event.reply_to_id else {
            warn!(
                event_name = "server.feedback.unattributed",
                correlation_id = %ctx.correlation_id,
                "feedback arrived without replyToId; ignoring"
            );
            return Ok(false);
        };

        self.store
            .record(FeedbackRecord {
                message_id: message_id.clone(),
                reaction: event.reaction,
                feedback_text: event.feedback_text.clone(),
                created_at: Utc::now(),
            })
            .await
            .map_err(|error| EventHandlerError::Feedback(error.to_string()))?;
        info!(
            event_name = "server.feedback.recorded",
            correlation_id = %ctx.correlation_id,
            message_id = %message_id,
            reaction = event.reaction.as_str(),
            "feedback recorded"
        );
        Ok(true)
    }
}
