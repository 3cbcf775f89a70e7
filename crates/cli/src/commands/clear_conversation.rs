use collaborator_core::ConversationId;
use collaborator_db::repositories::SqlMessageRepository;
use collaborator_db::{migrations, MessageRepository};
use serde_json::json;

use crate::commands::{with_database, CommandResult};

pub fn run(conversation_id: &str) -> CommandResult {
    let conversation_id = conversation_id.trim();
    if conversation_id.is_empty() {
        return CommandResult::failure(
            "clear-conversation",
            "invalid_argument",
            "conversation id must not be empty",
            1,
        );
    }
    let conversation = ConversationId::from(conversation_id);

    let result = with_database("clear-conversation", |pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        SqlMessageRepository::new(pool)
            .clear_conversation(&conversation)
            .await
            .map_err(|error| ("storage", error.to_string(), 6u8))
    });

    match result {
        Ok(deleted) => CommandResult::success_with_data(
            "clear-conversation",
            format!("deleted {deleted} message(s) from {conversation_id}"),
            Some(json!({ "conversation_id": conversation_id, "deleted_messages": deleted })),
        ),
        Err(failure) => failure,
    }
}
