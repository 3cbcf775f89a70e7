use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionItemStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl ActionItemStatus {
    pub const ALL: [&'static str; 4] = ["pending", "in_progress", "completed", "cancelled"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ActionItemStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown action item status `{other}`"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionItemPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl ActionItemPriority {
    pub const ALL: [&'static str; 4] = ["low", "medium", "high", "urgent"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::str::FromStr for ActionItemPriority {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown action item priority `{other}`"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewActionItem {
    pub conversation_id: ConversationId,
    pub title: String,
    pub description: String,
    pub assigned_to: String,
    pub assigned_by: String,
    pub priority: ActionItemPriority,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: i64,
    pub conversation_id: ConversationId,
    pub title: String,
    pub description: String,
    pub assigned_to: String,
    pub assigned_by: String,
    pub status: ActionItemStatus,
    pub priority: ActionItemPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionItemFilter {
    pub assigned_to: Option<String>,
    pub status: Option<ActionItemStatus>,
}

impl ActionItemFilter {
    pub fn matches(&self, item: &ActionItem) -> bool {
        let assignee_matches = self.assigned_to.as_deref().map_or(true, |assignee| {
            item.assigned_to.to_lowercase().contains(&assignee.to_lowercase())
        });
        let status_matches = self.status.map_or(true, |status| item.status == status);
        assignee_matches && status_matches
    }
}
