use async_trait::async_trait;
use thiserror::Error;

use collaborator_core::domain::action_item::{
    ActionItem, ActionItemFilter, ActionItemStatus, NewActionItem,
};
use collaborator_core::domain::context::TimeWindow;
use collaborator_core::domain::conversation::{ConversationId, MessageRecord};
use collaborator_core::domain::feedback::{FeedbackRecord, FeedbackSummary};

pub mod action_item;
pub mod feedback;
pub mod memory;
pub mod message;

pub use action_item::SqlActionItemRepository;
pub use feedback::SqlFeedbackRepository;
pub use memory::{
    InMemoryActionItemRepository, InMemoryFeedbackRepository, InMemoryMessageRepository,
};
pub use message::SqlMessageRepository;

pub const DEFAULT_MAX_RESULTS: u32 = 5;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Search constraints for [`MessageRepository::filtered_messages`].
///
/// Keywords match message content and participants match author names, both
/// as case-insensitive substrings. Terms inside a list are OR-ed together and
/// the two lists are AND-ed. An empty list places no constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageFilter {
    pub keywords: Vec<String>,
    pub participants: Vec<String>,
    pub window: TimeWindow,
    pub max_results: u32,
}

impl MessageFilter {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            keywords: Vec::new(),
            participants: Vec::new(),
            window,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants = participants.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_results(mut self, max_results: Option<u32>) -> Self {
        self.max_results = max_results.filter(|value| *value > 0).unwrap_or(DEFAULT_MAX_RESULTS);
        self
    }

    pub fn keyword_terms(&self) -> Vec<String> {
        normalize_terms(&self.keywords)
    }

    pub fn participant_terms(&self) -> Vec<String> {
        normalize_terms(&self.participants)
    }

    pub fn matches(&self, record: &MessageRecord) -> bool {
        if !self.window.contains(&record.timestamp) {
            return false;
        }
        let content = fold_case(&record.content);
        let name = fold_case(&record.name);
        let keywords = self.keyword_terms();
        let participants = self.participant_terms();

        let keyword_hit = keywords.is_empty() || keywords.iter().any(|term| content.contains(term));
        let participant_hit =
            participants.is_empty() || participants.iter().any(|term| name.contains(term));
        keyword_hit && participant_hit
    }
}

/// Unicode lowercase used on both sides of every search comparison. SQLite's
/// own `LOWER()` only folds ASCII, so the SQL store persists folded copies.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

fn normalize_terms(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|term| fold_case(term.trim()))
        .filter(|term| !term.is_empty())
        .collect()
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn add_messages(&self, records: &[MessageRecord]) -> Result<(), RepositoryError>;

    /// Messages with `start <= timestamp <= end`, oldest first.
    async fn messages_in_range(
        &self,
        conversation_id: &ConversationId,
        window: &TimeWindow,
    ) -> Result<Vec<MessageRecord>, RepositoryError>;

    /// Matching messages, newest first, capped at `filter.max_results`.
    async fn filtered_messages(
        &self,
        conversation_id: &ConversationId,
        filter: &MessageFilter,
    ) -> Result<Vec<MessageRecord>, RepositoryError>;

    /// The newest `limit` messages, returned oldest first.
    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, RepositoryError>;

    async fn count_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<u64, RepositoryError>;

    /// Deletes every message of the conversation and returns how many were removed.
    async fn clear_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    async fn record(&self, feedback: FeedbackRecord) -> Result<(), RepositoryError>;

    async fn list_for_message(
        &self,
        message_id: &str,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError>;

    async fn summary(&self) -> Result<FeedbackSummary, RepositoryError>;

    async fn clear_all(&self) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait ActionItemRepository: Send + Sync {
    async fn create(&self, item: NewActionItem) -> Result<ActionItem, RepositoryError>;

    async fn list(
        &self,
        conversation_id: &ConversationId,
        filter: &ActionItemFilter,
    ) -> Result<Vec<ActionItem>, RepositoryError>;

    /// Returns `None` when no item with `id` exists in the conversation.
    async fn update_status(
        &self,
        conversation_id: &ConversationId,
        id: i64,
        status: ActionItemStatus,
    ) -> Result<Option<ActionItem>, RepositoryError>;
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use collaborator_core::domain::context::TimeWindow;
    use collaborator_core::domain::conversation::{ConversationId, MessageRecord, MessageRole};

    use super::{MessageFilter, DEFAULT_MAX_RESULTS};

    fn record(name: &str, content: &str) -> MessageRecord {
        MessageRecord {
            conversation_id: ConversationId("conv".to_string()),
            role: MessageRole::User,
            name: name.to_string(),
            content: content.to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 2, 3, 10, 0, 0).single().expect("valid date"),
            activity_id: "a1".to_string(),
        }
    }

    fn window() -> TimeWindow {
        let end = Utc.with_ymd_and_hms(2025, 2, 4, 0, 0, 0).single().expect("valid date");
        TimeWindow::new(end - Duration::days(2), end)
    }

    #[test]
    fn blank_terms_place_no_constraint() {
        let filter = MessageFilter::new(window()).with_keywords(["  "]);
        assert!(filter.matches(&record("Ana", "anything at all")));
    }

    #[test]
    fn keywords_and_participants_are_both_required() {
        let filter = MessageFilter::new(window())
            .with_keywords(["BUDGET", "forecast"])
            .with_participants(["ana"]);

        assert!(filter.matches(&record("Ana Silva", "Budget review at 3")));
        assert!(!filter.matches(&record("Ben", "Budget review at 3")));
        assert!(!filter.matches(&record("Ana Silva", "lunch plans")));
    }

    #[test]
    fn zero_max_results_falls_back_to_default() {
        let filter = MessageFilter::new(window()).with_max_results(Some(0));
        assert_eq!(filter.max_results, DEFAULT_MAX_RESULTS);
    }
}
