use sqlx::Row;

use collaborator_core::domain::context::TimeWindow;
use collaborator_core::domain::conversation::{
    parse_storage_timestamp, storage_timestamp, ConversationId, MessageRecord, MessageRole,
};

use super::{fold_case, MessageFilter, MessageRepository, RepositoryError};
use crate::DbPool;

const MESSAGE_COLUMNS: &str = "conversation_id, role, name, content, activity_id, timestamp";

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<MessageRecord, RepositoryError> {
    let conversation_id: String =
        row.try_get("conversation_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role: String = row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let content: String =
        row.try_get("content").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let activity_id: String =
        row.try_get("activity_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let timestamp: String =
        row.try_get("timestamp").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(MessageRecord {
        conversation_id: ConversationId(conversation_id),
        role: role.parse::<MessageRole>().map_err(|e| RepositoryError::Decode(e.to_string()))?,
        name,
        content,
        timestamp: parse_storage_timestamp(&timestamp)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        activity_id,
    })
}

/// Escapes LIKE wildcards so user terms match literally (`ESCAPE '\'`).
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for character in term.chars() {
        if matches!(character, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped.push('%');
    escaped
}

/// `column` must be one of the `*_folded` columns written by `add_messages`.
fn any_like_clause(column: &str, count: usize) -> String {
    let clauses: Vec<String> =
        (0..count).map(|_| format!("{column} LIKE ? ESCAPE '\\'")).collect();
    format!("({})", clauses.join(" OR "))
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn add_messages(&self, records: &[MessageRecord]) -> Result<(), RepositoryError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "INSERT INTO messages
                    (conversation_id, role, name, content, name_folded, content_folded,
                     activity_id, timestamp)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(record.conversation_id.as_str())
            .bind(record.role.as_str())
            .bind(&record.name)
            .bind(&record.content)
            .bind(fold_case(&record.name))
            .bind(fold_case(&record.content))
            .bind(&record.activity_id)
            .bind(storage_timestamp(&record.timestamp))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn messages_in_range(
        &self,
        conversation_id: &ConversationId,
        window: &TimeWindow,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE conversation_id = ? AND timestamp >= ? AND timestamp <= ?
             ORDER BY timestamp ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(conversation_id.as_str())
            .bind(storage_timestamp(&window.start))
            .bind(storage_timestamp(&window.end))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn filtered_messages(
        &self,
        conversation_id: &ConversationId,
        filter: &MessageFilter,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        let keywords = filter.keyword_terms();
        let participants = filter.participant_terms();

        let mut where_clauses = vec![
            "conversation_id = ?".to_string(),
            "timestamp >= ?".to_string(),
            "timestamp <= ?".to_string(),
        ];
        if !keywords.is_empty() {
            where_clauses.push(any_like_clause("content_folded", keywords.len()));
        }
        if !participants.is_empty() {
            where_clauses.push(any_like_clause("name_folded", participants.len()));
        }

        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE {}
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&sql)
            .bind(conversation_id.as_str())
            .bind(storage_timestamp(&filter.window.start))
            .bind(storage_timestamp(&filter.window.end));
        for term in keywords.iter().chain(participants.iter()) {
            query = query.bind(like_pattern(term));
        }
        let rows = query.bind(i64::from(filter.max_results)).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE conversation_id = ?
             ORDER BY timestamp DESC, id DESC
             LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(conversation_id.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        let mut records = rows.iter().map(row_to_record).collect::<Result<Vec<_>, _>>()?;
        records.reverse();
        Ok(records)
    }

    async fn count_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<u64, RepositoryError> {
        let count = sqlx::query("SELECT COUNT(*) AS count FROM messages WHERE conversation_id = ?")
            .bind(conversation_id.as_str())
            .fetch_one(&self.pool)
            .await?
            .try_get::<i64, _>("count")
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
        Ok(count.max(0) as u64)
    }

    async fn clear_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(conversation_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
