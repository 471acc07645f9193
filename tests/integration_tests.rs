use async_trait::async_trait;
use farmsmart::llm::prompts::{SYSTEM_PROMPT_ANALYSIS, SYSTEM_PROMPT_CHART_EXTRACTION};
use farmsmart::llm::MessageContent;
use farmsmart::onboarding::{closing_prompt, NOT_APPLICABLE, OTHER_FARM};
use farmsmart::store::load_farm_info;
use farmsmart::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ANALYSIS_REPLY: &str = "Based on your soil, here is my assessment.\n\n\
Profits: Chisel Plow: $140, Field Cultivator: $95\n\
Explanations: Chisel Plow: breaks compaction cheaply (under budget), Field Cultivator: shallow pass only\n\
External Tool: DrainMaster 3000: $2,500, $400, $80\n\
External Explanation: Tile drainage removes standing water from heavy soil.";

const CHART_REPLY: &str = r#"```json
{"tillageNames": ["Chisel Plow", "Field Cultivator"], "profits": [140, 95], "revenue": [250, 200], "projectedProfits": [600, 1100, 1600, 2100, 2600, 3100], "breakEvenPoint": 2500}
```"#;

#[derive(Default)]
struct Counters {
    analysis: AtomicUsize,
    chart: AtomicUsize,
    chat: AtomicUsize,
}

/// Answers by request kind, like a model that always follows instructions.
struct FarmModel {
    counters: Counters,
    analysis_reply: String,
    chart_reply: String,
    fail_chat: AtomicBool,
    chat_requests: Mutex<Vec<CompletionRequest>>,
}

impl FarmModel {
    fn new(chart_reply: &str) -> Arc<Self> {
        Self::replying(ANALYSIS_REPLY, chart_reply)
    }

    fn replying(analysis_reply: &str, chart_reply: &str) -> Arc<Self> {
        Arc::new(Self {
            counters: Counters::default(),
            analysis_reply: analysis_reply.to_string(),
            chart_reply: chart_reply.to_string(),
            fail_chat: AtomicBool::new(false),
            chat_requests: Mutex::new(Vec::new()),
        })
    }
}

fn system_text(request: &CompletionRequest) -> &str {
    match request.messages.first().map(|m| &m.content) {
        Some(MessageContent::Text(text)) => text,
        _ => "",
    }
}

#[async_trait]
impl CompletionClient for FarmModel {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let system = system_text(&request);
        if system.starts_with(SYSTEM_PROMPT_ANALYSIS.trim()) {
            self.counters.analysis.fetch_add(1, Ordering::SeqCst);
            return Ok(self.analysis_reply.clone());
        }
        if system.starts_with(SYSTEM_PROMPT_CHART_EXTRACTION.trim()) {
            self.counters.chart.fetch_add(1, Ordering::SeqCst);
            return Ok(self.chart_reply.clone());
        }

        self.counters.chat.fetch_add(1, Ordering::SeqCst);
        let model = request.model;
        self.chat_requests.lock().unwrap().push(request);
        if self.fail_chat.load(Ordering::SeqCst) {
            return Err(FarmSmartError::completion(
                CompletionFailureKind::RateLimit,
                "too many requests",
            ));
        }
        Ok(format!("Here is some advice ({:?} model).", model))
    }
}

fn dependencies(model: Arc<FarmModel>, store: Arc<MemoryStore>) -> ChatDependencies {
    ChatDependencies {
        client: model,
        conversations: store.clone(),
        values: store,
        config: FarmSmartConfig::default(),
    }
}

#[tokio::test]
async fn test_predefined_farm_skips_questions() {
    let model = FarmModel::new(CHART_REPLY);
    let store = Arc::new(MemoryStore::new());
    let mut session = ChatSession::open(dependencies(model.clone(), store.clone()), "u1", None)
        .await
        .unwrap();

    let turn = session.send("2", None).await.unwrap();

    let profile = find_profile("North Dakota State Farm").unwrap();
    let info = session.farm_info().unwrap();
    assert_eq!(info.location, profile.location);
    assert_eq!(info.tools_available, profile.tools_json().unwrap());

    // user, acknowledgment, analysis, closing
    let replies: Vec<&Message> = turn.replies().collect();
    assert_eq!(replies.len(), 3);
    assert!(replies[0].content.contains("North Dakota State Farm"));
    assert_eq!(replies[1].content, ANALYSIS_REPLY);
    assert!(replies[1].analytics.is_some());
    assert_eq!(replies[2].content, closing_prompt().content);

    assert_eq!(model.counters.analysis.load(Ordering::SeqCst), 1);
    assert_eq!(model.counters.chart.load(Ordering::SeqCst), 1);
    assert_eq!(
        load_farm_info(store.as_ref(), "u1").await.unwrap().as_ref(),
        Some(info)
    );
}

#[tokio::test]
async fn test_other_farm_full_questionnaire() {
    let model = FarmModel::new(CHART_REPLY);
    let store = Arc::new(MemoryStore::new());
    let mut session = ChatSession::open(dependencies(model.clone(), store.clone()), "u1", None)
        .await
        .unwrap();

    let answers = ["3", "N/A", "N/A", "N/A", "N/A", "N/A"];
    for (i, answer) in answers.iter().enumerate() {
        assert!(!session.onboarding().is_complete(), "completed early at {}", i);
        session.send(answer, None).await.unwrap();
    }

    assert!(session.onboarding().is_complete());
    let persisted = load_farm_info(store.as_ref(), "u1").await.unwrap().unwrap();
    assert_eq!(persisted.farm_name, OTHER_FARM);
    assert_eq!(persisted.location, NOT_APPLICABLE);
    assert_eq!(persisted.pesticides_available, NOT_APPLICABLE);
    assert_eq!(model.counters.analysis.load(Ordering::SeqCst), 1);
    assert_eq!(model.counters.chat.load(Ordering::SeqCst), 0);

    let conversation = session.conversation();
    let system_messages = conversation
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .count();
    assert_eq!(system_messages, 1);
    assert_eq!(conversation.messages[0].role, Role::System);
    assert_eq!(conversation.farm_info.as_ref(), Some(&persisted));
}

#[tokio::test]
async fn test_invalid_selection_keeps_question_zero() {
    let model = FarmModel::new(CHART_REPLY);
    let store = Arc::new(MemoryStore::new());
    let mut session = ChatSession::open(dependencies(model.clone(), store), "u1", None)
        .await
        .unwrap();

    let turn = session.send("7", None).await.unwrap();
    assert_eq!(session.onboarding().current_question(), Some(Question::FarmSelection));
    assert_eq!(
        turn.messages.last().unwrap().content,
        Question::FarmSelection.text()
    );
    assert_eq!(model.counters.analysis.load(Ordering::SeqCst), 0);

    session.send("3", None).await.unwrap();
    assert_eq!(session.onboarding().current_question(), Some(Question::Location));
}

#[tokio::test]
async fn test_garbage_chart_json_falls_back_to_text() {
    let model = FarmModel::new("I cannot produce JSON today.");
    let store = Arc::new(MemoryStore::new());
    let mut session = ChatSession::open(dependencies(model, store), "u1", None)
        .await
        .unwrap();

    let turn = session.send("1", None).await.unwrap();
    let analysis = turn
        .replies()
        .find(|m| m.analytics.is_some())
        .expect("analysis message with chart data");
    let analytics = analysis.analytics.as_ref().unwrap();

    assert_eq!(analytics.tillage_names, vec!["Chisel Plow", "Field Cultivator"]);
    assert_eq!(analytics.profits, vec![140.0, 95.0]);
    assert_eq!(analytics.break_even_point, 2500.0);
    assert!(ChartNormalizer::verify(analytics).is_ok());
}

#[tokio::test]
async fn test_overlapping_tool_names_in_analysis() {
    let analysis = "Profits: Big Disk: $120, Disk: $95, Disk: $90\n\
Explanations: Big Disk: wider than Disk: fewer passes, Disk: narrow\n\
External Tool: Drone: $2500, $400, $80";
    let model = FarmModel::replying(analysis, "not json");
    let store = Arc::new(MemoryStore::new());
    let mut session = ChatSession::open(dependencies(model, store), "u1", None)
        .await
        .unwrap();

    let turn = session.send("1", None).await.unwrap();
    let replies: Vec<&Message> = turn.replies().collect();
    assert_eq!(replies.len(), 3);
    assert!(replies[0].content.contains("Illinois State Farm"));
    assert_eq!(replies[1].content, analysis);
    assert_eq!(replies[2].content, closing_prompt().content);

    let analytics = replies[1].analytics.as_ref().unwrap();
    assert_eq!(analytics.tillage_names, vec!["Big Disk", "Disk", "Disk"]);
    assert!(ChartNormalizer::verify(analytics).is_ok());
}

#[tokio::test]
async fn test_free_chat_after_resume() {
    let model = FarmModel::new(CHART_REPLY);
    let store = Arc::new(MemoryStore::new());

    let conversation_id = {
        let mut session =
            ChatSession::open(dependencies(model.clone(), store.clone()), "u1", None)
                .await
                .unwrap();
        session.send("1", None).await.unwrap();
        session.conversation().id.clone()
    };

    let mut resumed = ChatSession::open(
        dependencies(model.clone(), store.clone()),
        "u1",
        Some(&conversation_id),
    )
    .await
    .unwrap();
    assert!(resumed.onboarding().is_complete());

    let turn = resumed
        .send("Is this leaf diseased?", Some("https://example.com/leaf.jpg".to_string()))
        .await
        .unwrap();
    assert!(turn.error.is_none());
    assert_eq!(turn.messages[0].image.as_deref(), Some("https://example.com/leaf.jpg"));

    let requests = model.chat_requests.lock().unwrap();
    let request = requests.last().unwrap();
    assert_eq!(request.model, ModelVariant::Vision);
    assert!(system_text(request).contains("Illinois State Farm"));
    assert_eq!(
        request.messages.iter().filter(|m| m.role == Role::System).count(),
        1
    );

    let stored = store.load(&conversation_id).await.unwrap();
    assert_eq!(stored.messages.len(), resumed.conversation().messages.len());
}

#[tokio::test]
async fn test_free_chat_failure_is_not_fatal() {
    let model = FarmModel::new(CHART_REPLY);
    let store = Arc::new(MemoryStore::new());
    let mut session = ChatSession::open(dependencies(model.clone(), store), "u1", None)
        .await
        .unwrap();
    session.send("1", None).await.unwrap();

    model.fail_chat.store(true, Ordering::SeqCst);
    let turn = session.send("Should I till in the fall?", None).await.unwrap();
    assert!(turn.error.as_deref().unwrap().contains("rate limited"));
    assert_eq!(
        turn.replies().next().unwrap().content,
        "Sorry, I could not generate a response."
    );

    model.fail_chat.store(false, Ordering::SeqCst);
    let turn = session.send("And in spring?", None).await.unwrap();
    assert!(turn.error.is_none());
}

#[tokio::test]
async fn test_conversations_listed_per_user() {
    let model = FarmModel::new(CHART_REPLY);
    let store = Arc::new(MemoryStore::new());

    for user in ["u1", "u1", "u2"] {
        let mut session = ChatSession::open(dependencies(model.clone(), store.clone()), user, None)
            .await
            .unwrap();
        session.send("1", None).await.unwrap();
    }

    let listed = store.list("u1", false).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[0].updated_at >= listed[1].updated_at);
    assert!(listed.iter().all(|c| c.title == "1"));

    store.archive(&listed[0].id).await.unwrap();
    assert_eq!(store.list("u1", false).await.unwrap().len(), 1);

    let err = ChatSession::open(dependencies(model, store.clone()), "u2", Some(&listed[1].id))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, FarmSmartError::ConversationNotFound(_)));
}

#[test]
fn test_chart_shape_survives_decode_and_normalize() {
    let decoded = decode_chart_json(CHART_REPLY).unwrap();
    let normalized = process_with_verification(decoded.clone()).unwrap();

    assert_eq!(normalized.tillage_names, decoded.tillage_names);
    assert_eq!(normalized.profits, decoded.profits);
    assert_eq!(normalized.projected_profits, decoded.projected_profits);
    assert_eq!(normalized.break_even_point, decoded.break_even_point);
    assert_eq!(ChartNormalizer::normalize(normalized.clone()), normalized);
}
