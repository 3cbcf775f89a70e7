use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use collaborator_core::domain::action_item::{
    ActionItem, ActionItemFilter, ActionItemStatus, NewActionItem,
};
use collaborator_core::domain::context::TimeWindow;
use collaborator_core::domain::conversation::{ConversationId, MessageRecord};
use collaborator_core::domain::feedback::{FeedbackRecord, FeedbackSummary, Reaction};

use super::{
    ActionItemRepository, FeedbackRepository, MessageFilter, MessageRepository, RepositoryError,
};

/// Messages are kept per conversation in insertion order; queries sort by
/// timestamp with insertion order as the tie-breaker, like the SQL store.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<HashMap<ConversationId, Vec<MessageRecord>>>,
}

impl InMemoryMessageRepository {
    async fn sorted(&self, conversation_id: &ConversationId) -> Vec<MessageRecord> {
        let messages = self.messages.read().await;
        let mut records = messages.get(conversation_id).cloned().unwrap_or_default();
        records.sort_by(|left, right| left.timestamp.cmp(&right.timestamp));
        records
    }
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn add_messages(&self, records: &[MessageRecord]) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        for record in records {
            messages.entry(record.conversation_id.clone()).or_default().push(record.clone());
        }
        Ok(())
    }

    async fn messages_in_range(
        &self,
        conversation_id: &ConversationId,
        window: &TimeWindow,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        Ok(self
            .sorted(conversation_id)
            .await
            .into_iter()
            .filter(|record| window.contains(&record.timestamp))
            .collect())
    }

    async fn filtered_messages(
        &self,
        conversation_id: &ConversationId,
        filter: &MessageFilter,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        Ok(self
            .sorted(conversation_id)
            .await
            .into_iter()
            .rev()
            .filter(|record| filter.matches(record))
            .take(filter.max_results as usize)
            .collect())
    }

    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        let records = self.sorted(conversation_id).await;
        let skip = records.len().saturating_sub(limit as usize);
        Ok(records.into_iter().skip(skip).collect())
    }

    async fn count_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<u64, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages.get(conversation_id).map_or(0, |records| records.len() as u64))
    }

    async fn clear_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<u64, RepositoryError> {
        let mut messages = self.messages.write().await;
        Ok(messages.remove(conversation_id).map_or(0, |records| records.len() as u64))
    }
}

#[derive(Default)]
pub struct InMemoryFeedbackRepository {
    records: RwLock<Vec<FeedbackRecord>>,
}

#[async_trait::async_trait]
impl FeedbackRepository for InMemoryFeedbackRepository {
    async fn record(&self, feedback: FeedbackRecord) -> Result<(), RepositoryError> {
        self.records.write().await.push(feedback);
        Ok(())
    }

    async fn list_for_message(
        &self,
        message_id: &str,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|record| record.message_id == message_id).cloned().collect())
    }

    async fn summary(&self) -> Result<FeedbackSummary, RepositoryError> {
        let records = self.records.read().await;
        let likes = records.iter().filter(|record| record.reaction == Reaction::Like).count();
        let dislikes = records.len() - likes;
        Ok(FeedbackSummary::from_counts(likes as u64, dislikes as u64))
    }

    async fn clear_all(&self) -> Result<u64, RepositoryError> {
        let mut records = self.records.write().await;
        let removed = records.len() as u64;
        records.clear();
        Ok(removed)
    }
}

#[derive(Default)]
pub struct InMemoryActionItemRepository {
    items: RwLock<Vec<ActionItem>>,
}

#[async_trait::async_trait]
impl ActionItemRepository for InMemoryActionItemRepository {
    async fn create(&self, item: NewActionItem) -> Result<ActionItem, RepositoryError> {
        let mut items = self.items.write().await;
        let now = Utc::now();
        let created = ActionItem {
            id: items.iter().map(|existing| existing.id).max().unwrap_or(0) + 1,
            conversation_id: item.conversation_id,
            title: item.title,
            description: item.description,
            assigned_to: item.assigned_to,
            assigned_by: item.assigned_by,
            status: ActionItemStatus::Pending,
            priority: item.priority,
            due_date: item.due_date,
            created_at: now,
            updated_at: now,
        };
        items.push(created.clone());
        Ok(created)
    }

    async fn list(
        &self,
        conversation_id: &ConversationId,
        filter: &ActionItemFilter,
    ) -> Result<Vec<ActionItem>, RepositoryError> {
        let items = self.items.read().await;
        Ok(items
            .iter()
            .filter(|item| &item.conversation_id == conversation_id && filter.matches(item))
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        conversation_id: &ConversationId,
        id: i64,
        status: ActionItemStatus,
    ) -> Result<Option<ActionItem>, RepositoryError> {
        let mut items = self.items.write().await;
        let Some(item) =
            items.iter_mut().find(|item| item.id == id && &item.conversation_id == conversation_id)
        else {
            return Ok(None);
        };
        item.status = status;
        item.updated_at = Utc::now();
        Ok(Some(item.clone()))
    }
}
