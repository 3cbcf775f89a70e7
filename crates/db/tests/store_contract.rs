use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use collaborator_core::domain::action_item::{
    ActionItemFilter, ActionItemPriority, ActionItemStatus, NewActionItem,
};
use collaborator_core::domain::context::TimeWindow;
use collaborator_core::domain::conversation::{ConversationId, MessageRecord, MessageRole};
use collaborator_core::domain::feedback::{FeedbackRecord, Reaction};
use collaborator_db::repositories::{
    ActionItemRepository, FeedbackRepository, InMemoryActionItemRepository,
    InMemoryFeedbackRepository, InMemoryMessageRepository, MessageFilter, MessageRepository,
    SqlActionItemRepository, SqlFeedbackRepository, SqlMessageRepository,
};
use collaborator_db::{connect_with_settings, migrations, DbPool};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 20, 9, 0, 0).single().expect("valid date")
}

fn conversation() -> ConversationId {
    ConversationId("19:team-standup@thread.v2".to_string())
}

fn message(minutes: i64, name: &str, content: &str) -> MessageRecord {
    MessageRecord {
        conversation_id: conversation(),
        role: MessageRole::User,
        name: name.to_string(),
        content: content.to_string(),
        timestamp: base() + Duration::minutes(minutes),
        activity_id: format!("act-{minutes}"),
    }
}

async fn migrated_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrate");
    pool
}

async fn message_stores() -> Vec<(&'static str, Arc<dyn MessageRepository>)> {
    let sql: Arc<dyn MessageRepository> =
        Arc::new(SqlMessageRepository::new(migrated_pool().await));
    let memory: Arc<dyn MessageRepository> = Arc::new(InMemoryMessageRepository::default());
    vec![("sql", sql), ("memory", memory)]
}

#[tokio::test]
async fn range_queries_are_inclusive_and_ascending() {
    for (label, store) in message_stores().await {
        store
            .add_messages(&[
                message(30, "Ana", "third"),
                message(0, "Ana", "first"),
                message(15, "Ben", "second"),
                message(90, "Ben", "outside"),
            ])
            .await
            .expect("add");

        let window = TimeWindow::new(base(), base() + Duration::minutes(30));
        let records = store.messages_in_range(&conversation(), &window).await.expect("range");
        let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();

        assert_eq!(contents, vec!["first", "second", "third"], "{label}");
        assert!(records.iter().all(|r| window.contains(&r.timestamp)), "{label}");
    }
}

#[tokio::test]
async fn keyword_filter_is_case_insensitive_substring() {
    for (label, store) in message_stores().await {
        store
            .add_messages(&[message(0, "Ana", "Budget review"), message(5, "Ben", "lunch plans")])
            .await
            .expect("add");

        let filter = MessageFilter::new(TimeWindow::new(base(), base() + Duration::hours(1)))
            .with_keywords(["budget"]);
        let records = store.filtered_messages(&conversation(), &filter).await.expect("filter");

        assert_eq!(records.len(), 1, "{label}");
        assert_eq!(records[0].content, "Budget review", "{label}");
    }
}

#[tokio::test]
async fn filters_fold_non_ascii_case() {
    for (label, store) in message_stores().await {
        store
            .add_messages(&[
                message(0, "Élodie", "ÉTUDE du budget"),
                message(5, "Ben", "étude préliminaire"),
                message(10, "Ana", "lunch plans"),
            ])
            .await
            .expect("add");
        let window = TimeWindow::new(base(), base() + Duration::hours(1));

        let by_keyword = MessageFilter::new(window).with_keywords(["étude"]);
        let records = store.filtered_messages(&conversation(), &by_keyword).await.expect("filter");
        assert_eq!(records.len(), 2, "{label}");

        let by_author = MessageFilter::new(window).with_participants(["élodie"]);
        let records = store.filtered_messages(&conversation(), &by_author).await.expect("filter");
        assert_eq!(records.len(), 1, "{label}");
        assert_eq!(records[0].name, "Élodie", "{label}");
    }
}

#[tokio::test]
async fn range_bounds_are_exact_below_a_millisecond() {
    for (label, store) in message_stores().await {
        let mut early = message(0, "Ana", "just before");
        early.timestamp = base() + Duration::microseconds(100);
        let mut late = message(0, "Ben", "just after");
        late.timestamp = base() + Duration::microseconds(900);
        store.add_messages(&[early, late]).await.expect("add");

        let window = TimeWindow::new(
            base() + Duration::microseconds(500),
            base() + Duration::nanoseconds(900_001),
        );
        let records = store.messages_in_range(&conversation(), &window).await.expect("range");

        assert_eq!(records.len(), 1, "{label}");
        assert_eq!(records[0].content, "just after", "{label}");
        assert!(records.iter().all(|record| window.contains(&record.timestamp)), "{label}");

        let filter = MessageFilter::new(window);
        let records = store.filtered_messages(&conversation(), &filter).await.expect("filter");
        assert_eq!(records.len(), 1, "{label}");
    }
}

#[tokio::test]
async fn filter_orders_newest_first_and_caps_results() {
    for (label, store) in message_stores().await {
        let records: Vec<MessageRecord> =
            (0..8).map(|i| message(i, "Ana", &format!("deploy note {i}"))).collect();
        store.add_messages(&records).await.expect("add");

        let window = TimeWindow::new(base(), base() + Duration::hours(1));
        let default_cap = store
            .filtered_messages(
                &conversation(),
                &MessageFilter::new(window).with_keywords(["DEPLOY"]),
            )
            .await
            .expect("filter");
        let contents: Vec<&str> = default_cap.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "deploy note 7",
                "deploy note 6",
                "deploy note 5",
                "deploy note 4",
                "deploy note 3"
            ],
            "{label}"
        );

        let capped = store
            .filtered_messages(
                &conversation(),
                &MessageFilter::new(window).with_keywords(["deploy"]).with_max_results(Some(2)),
            )
            .await
            .expect("filter");
        assert_eq!(capped.len(), 2, "{label}");
    }
}

#[tokio::test]
async fn participants_narrow_keyword_matches() {
    for (label, store) in message_stores().await {
        store
            .add_messages(&[
                message(0, "Ana Silva", "release is blocked"),
                message(1, "Ben Ode", "release moved"),
                message(2, "Ana Silva", "coffee?"),
            ])
            .await
            .expect("add");

        let filter = MessageFilter::new(TimeWindow::new(base(), base() + Duration::hours(1)))
            .with_keywords(["release"])
            .with_participants(["ana"]);
        let records = store.filtered_messages(&conversation(), &filter).await.expect("filter");

        assert_eq!(records.len(), 1, "{label}");
        assert_eq!(records[0].content, "release is blocked", "{label}");
    }
}

#[tokio::test]
async fn like_wildcards_match_literally() {
    for (label, store) in message_stores().await {
        store
            .add_messages(&[message(0, "Ana", "50% off"), message(1, "Ben", "500 units")])
            .await
            .expect("add");

        let filter = MessageFilter::new(TimeWindow::new(base(), base() + Duration::hours(1)))
            .with_keywords(["50%"]);
        let records = store.filtered_messages(&conversation(), &filter).await.expect("filter");

        assert_eq!(records.len(), 1, "{label}");
        assert_eq!(records[0].content, "50% off", "{label}");
    }
}

#[tokio::test]
async fn clear_conversation_empties_every_range() {
    for (label, store) in message_stores().await {
        let other = MessageRecord {
            conversation_id: ConversationId("other".to_string()),
            ..message(0, "Ana", "keep me")
        };
        store
            .add_messages(&[message(0, "Ana", "one"), message(1, "Ben", "two"), other])
            .await
            .expect("add");

        let removed = store.clear_conversation(&conversation()).await.expect("clear");
        assert_eq!(removed, 2, "{label}");

        let everything =
            TimeWindow::new(base() - Duration::days(365), base() + Duration::days(365));
        assert!(store
            .messages_in_range(&conversation(), &everything)
            .await
            .expect("range")
            .is_empty());
        assert_eq!(store.count_messages(&conversation()).await.expect("count"), 0, "{label}");
        assert_eq!(
            store.count_messages(&ConversationId("other".to_string())).await.expect("count"),
            1,
            "{label}"
        );
    }
}

#[tokio::test]
async fn recent_messages_returns_tail_in_order() {
    for (label, store) in message_stores().await {
        let records: Vec<MessageRecord> =
            (0..5).map(|i| message(i, "Ana", &format!("m{i}"))).collect();
        store.add_messages(&records).await.expect("add");

        let recent = store.recent_messages(&conversation(), 2).await.expect("recent");
        let contents: Vec<&str> = recent.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"], "{label}");
    }
}

#[tokio::test]
async fn feedback_summary_counts_reactions() {
    let sql: Arc<dyn FeedbackRepository> =
        Arc::new(SqlFeedbackRepository::new(migrated_pool().await));
    let memory: Arc<dyn FeedbackRepository> = Arc::new(InMemoryFeedbackRepository::default());
    let stores = vec![("sql", sql), ("memory", memory)];

    for (label, store) in stores {
        for (reaction, text) in [
            (Reaction::Like, Some("spot on")),
            (Reaction::Like, None),
            (Reaction::Dislike, Some("missed the point")),
        ] {
            store
                .record(FeedbackRecord {
                    message_id: "reply-1".to_string(),
                    reaction,
                    feedback_text: text.map(str::to_string),
                    created_at: base(),
                })
                .await
                .expect("record");
        }

        let summary = store.summary().await.expect("summary");
        assert_eq!((summary.likes, summary.dislikes, summary.total_records), (2, 1, 3), "{label}");

        let for_message = store.list_for_message("reply-1").await.expect("list");
        assert_eq!(for_message.len(), 3, "{label}");
        assert_eq!(for_message[0].feedback_text.as_deref(), Some("spot on"), "{label}");

        assert_eq!(store.clear_all().await.expect("clear"), 3, "{label}");
        assert_eq!(store.summary().await.expect("summary").like_ratio, None, "{label}");
    }
}

#[tokio::test]
async fn action_items_track_status_per_conversation() {
    let sql: Arc<dyn ActionItemRepository> =
        Arc::new(SqlActionItemRepository::new(migrated_pool().await));
    let memory: Arc<dyn ActionItemRepository> = Arc::new(InMemoryActionItemRepository::default());
    let stores = vec![("sql", sql), ("memory", memory)];

    for (label, store) in stores {
        let created = store
            .create(NewActionItem {
                conversation_id: conversation(),
                title: "Send recap".to_string(),
                description: "Email the standup recap to stakeholders".to_string(),
                assigned_to: "Ana Silva".to_string(),
                assigned_by: "Ben Ode".to_string(),
                priority: ActionItemPriority::High,
                due_date: Some(base() + Duration::days(1)),
            })
            .await
            .expect("create");
        assert_eq!(created.status, ActionItemStatus::Pending, "{label}");

        let updated = store
            .update_status(&conversation(), created.id, ActionItemStatus::Completed)
            .await
            .expect("update")
            .expect("item exists");
        assert_eq!(updated.status, ActionItemStatus::Completed, "{label}");
        assert_eq!(updated.due_date, created.due_date, "{label}");

        let missing = store
            .update_status(
                &ConversationId("other".to_string()),
                created.id,
                ActionItemStatus::Pending,
            )
            .await
            .expect("update");
        assert!(missing.is_none(), "{label}");

        let pending = store
            .list(
                &conversation(),
                &ActionItemFilter { status: Some(ActionItemStatus::Pending), ..Default::default() },
            )
            .await
            .expect("list");
        assert!(pending.is_empty(), "{label}");

        let for_ana = store
            .list(
                &conversation(),
                &ActionItemFilter { assigned_to: Some("ana".to_string()), ..Default::default() },
            )
            .await
            .expect("list");
        assert_eq!(for_ana.len(), 1, "{label}");
    }
}
