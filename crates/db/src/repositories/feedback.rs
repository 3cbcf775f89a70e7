use sqlx::Row;

use collaborator_core::domain::conversation::{parse_storage_timestamp, storage_timestamp};
use collaborator_core::domain::feedback::{FeedbackRecord, FeedbackSummary, Reaction};

use super::{FeedbackRepository, RepositoryError};
use crate::DbPool;

pub struct SqlFeedbackRepository {
    pool: DbPool,
}

impl SqlFeedbackRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_feedback(row: &sqlx::sqlite::SqliteRow) -> Result<FeedbackRecord, RepositoryError> {
    let message_id: String =
        row.try_get("message_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let reaction: String =
        row.try_get("reaction").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let feedback_text: Option<String> =
        row.try_get("feedback_text").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(FeedbackRecord {
        message_id,
        reaction: reaction.parse::<Reaction>().map_err(|e| RepositoryError::Decode(e.to_string()))?,
        feedback_text,
        created_at: parse_storage_timestamp(&created_at)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
    })
}

#[async_trait::async_trait]
impl FeedbackRepository for SqlFeedbackRepository {
    async fn record(&self, feedback: FeedbackRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO feedback (message_id, reaction, feedback_text, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&feedback.message_id)
        .bind(feedback.reaction.as_str())
        .bind(&feedback.feedback_text)
        .bind(storage_timestamp(&feedback.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_message(
        &self,
        message_id: &str,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT message_id, reaction, feedback_text, created_at
             FROM feedback
             WHERE message_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_feedback).collect()
    }

    async fn summary(&self) -> Result<FeedbackSummary, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                 COALESCE(SUM(CASE WHEN reaction = 'like' THEN 1 ELSE 0 END), 0) AS likes,
                 COALESCE(SUM(CASE WHEN reaction = 'dislike' THEN 1 ELSE 0 END), 0) AS dislikes
             FROM feedback",
        )
        .fetch_one(&self.pool)
        .await?;

        let likes: i64 =
            row.try_get("likes").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let dislikes: i64 =
            row.try_get("dislikes").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(FeedbackSummary::from_counts(likes.max(0) as u64, dislikes.max(0) as u64))
    }

    async fn clear_all(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM feedback").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
