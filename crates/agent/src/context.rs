use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use collaborator_core::domain::context::DEFAULT_WINDOW_HOURS;
use collaborator_core::domain::inbound::strip_mention_tags;
use collaborator_core::{ConversationId, InboundMessage, Member, MessageContext, TimeWindow};

/// Source of conversation rosters, usually the platform connector.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    async fn list_members(&self, conversation_id: &ConversationId) -> Result<Vec<Member>>;
}

pub struct MessageContextBuilder {
    directory: Option<Arc<dyn MemberDirectory>>,
    window_hours: i64,
}

impl MessageContextBuilder {
    pub fn new(directory: Option<Arc<dyn MemberDirectory>>) -> Self {
        Self { directory, window_hours: DEFAULT_WINDOW_HOURS }
    }

    pub fn with_window_hours(mut self, hours: i64) -> Self {
        self.window_hours = hours;
        self
    }

    /// Never fails. Members are only looked up for messages the bot will
    /// answer, and a failing lookup leaves the member list empty.
    pub async fn build(&self, inbound: &InboundMessage, now: DateTime<Utc>) -> MessageContext {
        let members = match &self.directory {
            Some(directory) if inbound.requires_response() => {
                match directory.list_members(&inbound.conversation_id).await {
                    Ok(members) => members,
                    Err(error) => {
                        warn!(
                            event_name = "agent.context.members_unavailable",
                            correlation_id = %inbound.activity_id,
                            conversation_id = %inbound.conversation_id,
                            error = %error,
                            "continuing without conversation members"
                        );
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };

        MessageContext {
            text: strip_mention_tags(&inbound.text),
            conversation_id: inbound.conversation_id.clone(),
            user_id: inbound.user_id.clone(),
            user_name: inbound.user_name.clone(),
            timestamp: inbound.timestamp,
            received_at: now,
            is_personal_chat: inbound.is_personal(),
            activity_id: inbound.activity_id.clone(),
            members,
            window: TimeWindow::trailing(now, self.window_hours),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};

    use collaborator_core::{ConversationId, ConversationKind, InboundMessage, Member};

    use super::{MemberDirectory, MessageContextBuilder};

    #[derive(Default)]
    struct CountingDirectory {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MemberDirectory for CountingDirectory {
        async fn list_members(&self, _conversation_id: &ConversationId) -> Result<Vec<Member>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("connector unavailable");
            }
            Ok(vec![Member { id: "29:ana".to_string(), name: "Ana".to_string() }])
        }
    }

    fn inbound(kind: ConversationKind, mentions_bot: bool) -> InboundMessage {
        InboundMessage {
            activity_id: "act-1".to_string(),
            conversation_id: ConversationId("conv".to_string()),
            conversation_kind: kind,
            user_id: Some("29:ana".to_string()),
            user_name: "Ana".to_string(),
            text: "<at>Collaborator</at> summarize today".to_string(),
            timestamp: None,
            mentions_bot,
            ai_generated: false,
        }
    }

    #[tokio::test]
    async fn builds_default_window_and_members() {
        let directory = Arc::new(CountingDirectory::default());
        let builder = MessageContextBuilder::new(Some(directory.clone()));
        let now = Utc.with_ymd_and_hms(2025, 6, 11, 15, 30, 0).single().expect("valid date");

        let context = builder.build(&inbound(ConversationKind::GroupChat, true), now).await;

        assert_eq!(context.text, "Collaborator summarize today");
        assert_eq!(context.window.start, now - Duration::hours(24));
        assert_eq!(context.window.end, now);
        assert_eq!(context.members.len(), 1);
        assert!(!context.is_personal_chat);
    }

    #[tokio::test]
    async fn skips_lookup_for_unmentioned_group_messages() {
        let directory = Arc::new(CountingDirectory::default());
        let builder = MessageContextBuilder::new(Some(directory.clone()));

        let context = builder.build(&inbound(ConversationKind::Channel, false), Utc::now()).await;

        assert!(context.members.is_empty());
        assert_eq!(directory.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn directory_failure_yields_empty_members() {
        let directory = Arc::new(CountingDirectory { fail: true, ..Default::default() });
        let builder = MessageContextBuilder::new(Some(directory));

        let context = builder.build(&inbound(ConversationKind::Personal, false), Utc::now()).await;

        assert!(context.members.is_empty());
        assert!(context.is_personal_chat);
    }
}
