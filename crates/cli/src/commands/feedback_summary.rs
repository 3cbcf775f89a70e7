use collaborator_db::repositories::SqlFeedbackRepository;
use collaborator_db::{migrations, FeedbackRepository};

use crate::commands::{with_database, CommandResult};

pub fn run() -> CommandResult {
    let result = with_database("feedback-summary", |pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        SqlFeedbackRepository::new(pool)
            .summary()
            .await
            .map_err(|error| ("storage", error.to_string(), 6u8))
    });

    let summary = match result {
        Ok(summary) => summary,
        Err(failure) => return failure,
    };

    let ratio = summary
        .like_ratio
        .map(|ratio| format!("{:.0}% positive", ratio * 100.0))
        .unwrap_or_else(|| "no feedback yet".to_string());
    let message = format!(
        "{} feedback record(s): {} like(s), {} dislike(s), {ratio}",
        summary.total_records, summary.likes, summary.dislikes
    );
    CommandResult::success_with_data(
        "feedback-summary",
        message,
        serde_json::to_value(&summary).ok(),
    )
}
