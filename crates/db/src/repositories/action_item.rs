use chrono::Utc;
use sqlx::Row;

use collaborator_core::domain::action_item::{
    ActionItem, ActionItemFilter, ActionItemPriority, ActionItemStatus, NewActionItem,
};
use collaborator_core::domain::conversation::{
    parse_storage_timestamp, storage_timestamp, ConversationId,
};

use super::{ActionItemRepository, RepositoryError};
use crate::DbPool;

const ACTION_ITEM_COLUMNS: &str = "id, conversation_id, title, description, assigned_to, \
     assigned_by, status, priority, due_date, created_at, updated_at";

pub struct SqlActionItemRepository {
    pool: DbPool,
}

impl SqlActionItemRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find(
        &self,
        conversation_id: &ConversationId,
        id: i64,
    ) -> Result<Option<ActionItem>, RepositoryError> {
        let sql = format!(
            "SELECT {ACTION_ITEM_COLUMNS} FROM action_items WHERE conversation_id = ? AND id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(conversation_id.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_action_item).transpose()
    }
}

fn decode<T>(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_action_item(row: &sqlx::sqlite::SqliteRow) -> Result<ActionItem, RepositoryError> {
    let status: String = decode(row, "status")?;
    let priority: String = decode(row, "priority")?;
    let due_date: Option<String> = decode(row, "due_date")?;
    let created_at: String = decode(row, "created_at")?;
    let updated_at: String = decode(row, "updated_at")?;
    let to_decode_error =
        |e: collaborator_core::DomainError| RepositoryError::Decode(e.to_string());

    Ok(ActionItem {
        id: decode(row, "id")?,
        conversation_id: ConversationId(decode(row, "conversation_id")?),
        title: decode(row, "title")?,
        description: decode(row, "description")?,
        assigned_to: decode(row, "assigned_to")?,
        assigned_by: decode(row, "assigned_by")?,
        status: status.parse::<ActionItemStatus>().map_err(to_decode_error)?,
        priority: priority.parse::<ActionItemPriority>().map_err(to_decode_error)?,
        due_date: due_date
            .as_deref()
            .map(parse_storage_timestamp)
            .transpose()
            .map_err(to_decode_error)?,
        created_at: parse_storage_timestamp(&created_at).map_err(to_decode_error)?,
        updated_at: parse_storage_timestamp(&updated_at).map_err(to_decode_error)?,
    })
}

#[async_trait::async_trait]
impl ActionItemRepository for SqlActionItemRepository {
    async fn create(&self, item: NewActionItem) -> Result<ActionItem, RepositoryError> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO action_items
                (conversation_id, title, description, assigned_to, assigned_by,
                 status, priority, due_date, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(item.conversation_id.as_str())
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.assigned_to)
        .bind(&item.assigned_by)
        .bind(ActionItemStatus::Pending.as_str())
        .bind(item.priority.as_str())
        .bind(item.due_date.as_ref().map(storage_timestamp))
        .bind(storage_timestamp(&now))
        .bind(storage_timestamp(&now))
        .execute(&self.pool)
        .await?;

        Ok(ActionItem {
            id: result.last_insert_rowid(),
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
        })
    }

    async fn list(
        &self,
        conversation_id: &ConversationId,
        filter: &ActionItemFilter,
    ) -> Result<Vec<ActionItem>, RepositoryError> {
        let sql = format!(
            "SELECT {ACTION_ITEM_COLUMNS}
             FROM action_items
             WHERE conversation_id = ?
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql).bind(conversation_id.as_str()).fetch_all(&self.pool).await?;

        let items = rows.iter().map(row_to_action_item).collect::<Result<Vec<_>, _>>()?;
        Ok(items.into_iter().filter(|item| filter.matches(item)).collect())
    }

    async fn update_status(
        &self,
        conversation_id: &ConversationId,
        id: i64,
        status: ActionItemStatus,
    ) -> Result<Option<ActionItem>, RepositoryError> {
        let result = sqlx::query(
            "UPDATE action_items SET status = ?, updated_at = ?
             WHERE conversation_id = ? AND id = ?",
        )
        .bind(status.as_str())
        .bind(storage_timestamp(&Utc::now()))
        .bind(conversation_id.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find(conversation_id, id).await
    }
}
