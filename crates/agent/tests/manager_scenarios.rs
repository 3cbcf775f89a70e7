use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use collaborator_agent::capabilities::{standard_registry, CapabilitySettings, SummarizerCapability};
use collaborator_agent::instructions::render_manager_instructions;
use collaborator_agent::manager::APOLOGY_PREFIX;
use collaborator_agent::{
    Capability, CapabilityError, ChatCompletion, ChatRequest, LlmClient, Manager, ManagerSettings,
    ToolCall,
};
use collaborator_core::config::DispatchMode;
use collaborator_core::{ConversationId, MessageContext, MessageRecord, MessageRole, TimeWindow};
use collaborator_db::repositories::{InMemoryActionItemRepository, InMemoryMessageRepository};
use collaborator_db::MessageRepository;

const CONVERSATION: &str = "19:team@thread.v2";

#[derive(Default)]
struct ScriptedState {
    replies: VecDeque<ChatCompletion>,
    requests: Vec<ChatRequest>,
}

struct ScriptedLlm {
    state: Mutex<ScriptedState>,
}

impl ScriptedLlm {
    fn new(replies: Vec<ChatCompletion>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScriptedState { replies: replies.into(), requests: Vec::new() }),
        })
    }

    async fn requests(&self) -> Vec<ChatRequest> {
        self.state.lock().await.requests.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: ChatRequest) -> Result<ChatCompletion> {
        let mut state = self.state.lock().await;
        state.requests.push(request);
        state.replies.pop_front().ok_or_else(|| anyhow!("model script exhausted"))
    }
}

fn call(name: &str, arguments: Value) -> ChatCompletion {
    ChatCompletion::ToolCalls(vec![ToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }])
}

fn text(reply: &str) -> ChatCompletion {
    ChatCompletion::Text(reply.to_string())
}

fn last_message(request: &ChatRequest) -> String {
    request.messages.last().and_then(|message| message.content.clone()).unwrap_or_default()
}

fn last_tool_result(request: &ChatRequest) -> Value {
    serde_json::from_str(&last_message(request)).expect("tool result is json")
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 11, 15, 30, 0).single().expect("valid date")
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).single().expect("valid date")
}

fn record(
    conversation: &str,
    timestamp: DateTime<Utc>,
    name: &str,
    content: &str,
) -> MessageRecord {
    MessageRecord {
        conversation_id: ConversationId(conversation.to_string()),
        role: MessageRole::User,
        name: name.to_string(),
        content: content.to_string(),
        timestamp,
        activity_id: format!("{}", timestamp.timestamp_millis()),
    }
}

fn context(text: &str) -> MessageContext {
    MessageContext {
        text: text.to_string(),
        conversation_id: ConversationId(CONVERSATION.to_string()),
        user_id: Some("29:ana".to_string()),
        user_name: "Ana".to_string(),
        timestamp: Some(now()),
        received_at: now(),
        is_personal_chat: false,
        activity_id: "act-1".to_string(),
        members: Vec::new(),
        window: TimeWindow::default_for(now()),
    }
}

fn capability_settings() -> CapabilitySettings {
    CapabilitySettings {
        model: "capability".to_string(),
        max_tool_rounds: 4,
        max_search_results: 5,
    }
}

struct Harness {
    llm: Arc<ScriptedLlm>,
    store: Arc<InMemoryMessageRepository>,
    items: Arc<InMemoryActionItemRepository>,
}

impl Harness {
    async fn new(replies: Vec<ChatCompletion>) -> Self {
        let store = Arc::new(InMemoryMessageRepository::default());
        store
            .add_messages(&[
                record(CONVERSATION, at(9, 12), "Ben", "old news"),
                record(CONVERSATION, at(10, 9), "Ana", "kickoff for the budget"),
                record(CONVERSATION, at(10, 17), "Ben", "budget numbers are in"),
                record(CONVERSATION, at(11, 8), "Ana", "morning standup notes"),
                record("19:other@thread.v2", at(10, 10), "Cy", "unrelated budget"),
            ])
            .await
            .expect("seed history");

        Self {
            llm: ScriptedLlm::new(replies),
            store,
            items: Arc::new(InMemoryActionItemRepository::default()),
        }
    }

    fn manager(&self, dispatch: DispatchMode, max_tool_rounds: u32) -> Manager {
        let registry = standard_registry(
            self.llm.clone(),
            self.store.clone(),
            self.items.clone(),
            capability_settings(),
        )
        .expect("standard registry");
        Manager::new(
            self.llm.clone(),
            self.store.clone(),
            registry,
            ManagerSettings { model: "manager".to_string(), max_tool_rounds, dispatch },
        )
    }
}

fn contents(payload: &Value) -> Vec<String> {
    payload["messages"]
        .as_array()
        .expect("messages array")
        .iter()
        .filter_map(|message| message["content"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn yesterday_request_summarizes_only_yesterdays_messages_in_order() {
    let harness = Harness::new(vec![
        call("calculate_time_range", json!({ "time_phrase": "yesterday" })),
        call("delegate_to_summarizer", json!({})),
        call("summarize_conversation", json!({})),
        text("Yesterday: kickoff, then budget numbers."),
        text("Yesterday: kickoff, then budget numbers."),
    ])
    .await;
    let manager = harness.manager(DispatchMode::Delegation, 8);

    let result = manager.process_request(&context("summarize yesterday's discussion")).await;

    assert_eq!(result.response, "Yesterday: kickoff, then budget numbers.");
    assert_eq!(result.delegated_capability.as_deref(), Some("summarizer"));

    let requests = harness.llm.requests().await;
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[0].model, "manager");
    assert_eq!(requests[2].model, "capability");

    let range = last_tool_result(&requests[1]);
    assert_eq!(range["status"], "success");
    assert_eq!(range["calculated_start_time"], "2025-06-10T00:00:00+00:00");
    assert_eq!(range["calculated_end_time"], "2025-06-11T00:00:00+00:00");

    let transcript = last_tool_result(&requests[3]);
    assert_eq!(contents(&transcript), vec!["kickoff for the budget", "budget numbers are in"]);
    assert_eq!(last_message(&requests[4]), "Yesterday: kickoff, then budget numbers.");
}

#[tokio::test]
async fn unparseable_phrase_keeps_the_default_window() {
    let harness = Harness::new(vec![
        call("calculate_time_range", json!({ "time_phrase": "next blue moon" })),
        call("delegate_to_summarizer", json!({})),
        call("summarize_conversation", json!({})),
        text("summary"),
        text("summary"),
    ])
    .await;
    let manager = harness.manager(DispatchMode::Delegation, 8);

    manager.process_request(&context("summarize since the next blue moon")).await;

    let requests = harness.llm.requests().await;
    let range = last_tool_result(&requests[1]);
    assert_eq!(range["status"], "error");
    assert!(range["message"].as_str().expect("message").contains("next blue moon"));

    let transcript = last_tool_result(&requests[3]);
    assert_eq!(transcript["timespan"], TimeWindow::default_for(now()).describe());
    assert_eq!(
        contents(&transcript),
        vec!["budget numbers are in", "morning standup notes"]
    );
}

#[tokio::test]
async fn explicit_delegation_bounds_override_the_turn_window() {
    let harness = Harness::new(vec![
        call(
            "delegate_to_summarizer",
            json!({
                "calculated_start_time": "2025-06-09T00:00:00Z",
                "calculated_end_time": "2025-06-10T00:00:00Z",
            }),
        ),
        call("summarize_conversation", json!({})),
        text("old"),
        text("old"),
    ])
    .await;
    let manager = harness.manager(DispatchMode::Delegation, 8);

    manager.process_request(&context("what happened on monday")).await;

    let requests = harness.llm.requests().await;
    assert_eq!(contents(&last_tool_result(&requests[2])), vec!["old news"]);
}

#[tokio::test]
async fn invalid_status_comes_back_as_an_error_string() {
    let harness = Harness::new(vec![
        call("delegate_to_action_items", json!({})),
        call("update_action_item", json!({ "action_item_id": 1, "new_status": "done" })),
        text("I could not update that item."),
        text("I could not update that item."),
    ])
    .await;
    let manager = harness.manager(DispatchMode::Delegation, 8);

    let result = manager.process_request(&context("mark task 1 as done")).await;

    assert_eq!(result.delegated_capability.as_deref(), Some("action_items"));
    let requests = harness.llm.requests().await;
    let rejection = last_message(&requests[2]);
    assert!(rejection.contains("error"), "{rejection}");
    assert!(rejection.contains("done"), "{rejection}");
}

#[tokio::test]
async fn search_citations_flow_into_the_result() {
    let harness = Harness::new(vec![
        call("delegate_to_search", json!({})),
        call("search_messages", json!({ "keywords": ["budget"] })),
        text("Ben shared the numbers."),
        text("Ben shared the numbers."),
    ])
    .await;
    let manager = harness.manager(DispatchMode::Delegation, 8);

    let result = manager.process_request(&context("find budget messages")).await;

    assert_eq!(result.delegated_capability.as_deref(), Some("search"));
    let positions: Vec<usize> = result.citations.iter().map(|citation| citation.position).collect();
    assert_eq!(positions, vec![1]);
    assert_eq!(result.citations[0].abstract_text, "budget numbers are in");
}

#[tokio::test]
async fn clearing_history_empties_only_this_conversation() {
    let harness = Harness::new(vec![
        call("clear_conversation_history", json!({})),
        text("Done, the history is cleared."),
    ])
    .await;
    let manager = harness.manager(DispatchMode::Delegation, 8);

    let result = manager.process_request(&context("clear the conversation history")).await;
    assert_eq!(result.response, "Done, the history is cleared.");

    let everything = TimeWindow::new(at(1, 0), at(30, 0));
    let cleared = harness
        .store
        .messages_in_range(&ConversationId(CONVERSATION.to_string()), &everything)
        .await
        .expect("range");
    assert!(cleared.is_empty());

    let other = harness
        .store
        .messages_in_range(&ConversationId("19:other@thread.v2".to_string()), &everything)
        .await
        .expect("range");
    assert_eq!(other.len(), 1);

    let requests = harness.llm.requests().await;
    assert_eq!(last_tool_result(&requests[1])["deleted_messages"], 4);
}

#[tokio::test]
async fn failures_become_an_apology_instead_of_an_error() {
    let harness = Harness::new(Vec::new()).await;
    let manager = harness.manager(DispatchMode::Delegation, 8);

    let result = manager.process_request(&context("summarize today")).await;

    assert!(result.response.starts_with(APOLOGY_PREFIX), "{}", result.response);
    assert!(result.delegated_capability.is_none());
}

#[tokio::test]
async fn runaway_tool_loop_is_cut_off() {
    let harness = Harness::new(vec![
        call("calculate_time_range", json!({ "time_phrase": "today" })),
        call("calculate_time_range", json!({ "time_phrase": "today" })),
        call("calculate_time_range", json!({ "time_phrase": "today" })),
    ])
    .await;
    let manager = harness.manager(DispatchMode::Delegation, 2);

    let result = manager.process_request(&context("today?")).await;

    assert!(result.response.starts_with(APOLOGY_PREFIX));
    assert!(result.response.contains("exceeded 2 tool rounds"));
}

#[tokio::test]
async fn capability_process_request_never_fails() {
    let store = Arc::new(InMemoryMessageRepository::default());
    let capability =
        SummarizerCapability::new(ScriptedLlm::new(Vec::new()), store, capability_settings());

    let result = capability.process_request(&context("summarize")).await;

    assert!(result.error.as_deref().is_some_and(|error| error.contains("script exhausted")));
    assert!(!result.response.is_empty());
    assert!(result.citations.is_empty());
}

#[tokio::test]
async fn keyword_dispatch_routes_to_first_match_with_preparsed_window() {
    let harness =
        Harness::new(vec![call("summarize_conversation", json!({})), text("recap")]).await;
    let manager = harness.manager(DispatchMode::Keyword, 8);

    let result =
        manager.process_request(&context("summarize and find yesterday's budget talk")).await;

    assert_eq!(result.delegated_capability.as_deref(), Some("summarizer"));
    assert_eq!(result.response, "recap");
    let requests = harness.llm.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(
        contents(&last_tool_result(&requests[1])),
        vec!["kickoff for the budget", "budget numbers are in"]
    );
}

#[tokio::test]
async fn keyword_dispatch_without_match_describes_capabilities() {
    let harness = Harness::new(Vec::new()).await;
    let manager = harness.manager(DispatchMode::Keyword, 8);

    let result = manager.process_request(&context("hello there")).await;

    assert!(result.delegated_capability.is_none());
    for name in ["summarizer", "action_items", "search"] {
        assert!(result.response.contains(name), "{}", result.response);
    }
    assert!(harness.llm.requests().await.is_empty());
}

#[tokio::test]
async fn llm_router_dispatch_ignores_unknown_names() {
    let harness = Harness::new(vec![text("weather")]).await;
    let manager = harness.manager(DispatchMode::LlmRouter, 8);

    let result = manager.process_request(&context("is it raining")).await;

    assert!(result.delegated_capability.is_none());
    assert_eq!(harness.llm.requests().await.len(), 1);
}

#[tokio::test]
async fn duplicate_capability_registration_is_rejected() {
    let harness = Harness::new(Vec::new()).await;
    let mut registry = standard_registry(
        harness.llm.clone(),
        harness.store.clone(),
        harness.items.clone(),
        capability_settings(),
    )
    .expect("registry");

    let duplicate =
        SummarizerCapability::new(
            harness.llm.clone(),
            harness.store.clone(),
            capability_settings(),
        );
    assert_eq!(
        registry.register(Arc::new(duplicate)),
        Err(CapabilityError::Duplicate("summarizer".to_string()))
    );
    assert_eq!(registry.len(), 3);
}

#[tokio::test]
async fn manager_instructions_and_tools_follow_registration_order() {
    let harness = Harness::new(vec![text("hi")]).await;
    let manager = harness.manager(DispatchMode::Delegation, 8);

    assert_eq!(
        manager.instructions(),
        render_manager_instructions(&manager.registry().descriptors())
    );
    let summarizer = manager.instructions().find("delegate_to_summarizer").expect("summarizer");
    let search = manager.instructions().find("delegate_to_search").expect("search");
    assert!(summarizer < search);

    manager.process_request(&context("hi")).await;
    let requests = harness.llm.requests().await;
    let tools: Vec<&str> = requests[0].tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(
        tools,
        vec![
            "calculate_time_range",
            "clear_conversation_history",
            "delegate_to_summarizer",
            "delegate_to_action_items",
            "delegate_to_search",
        ]
    );
    assert!(last_message(&requests[0]).contains("User Request: hi"));
}

#[test]
fn trailing_window_helper_matches_default() {
    let window = TimeWindow::default_for(now());
    assert_eq!(window.start, now() - Duration::hours(24));
}
