//! End-to-end integration tests for Turnstile.
//!
//! These tests exercise the full pipeline from an HTTP request to a saved
//! session: profile lookup, admission, the tool-calling loop, real built-in
//! tools, and persistence.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use turnstile_agent::{ConversationLoop, ProfileCatalog};
use turnstile_config::{AppConfig, ProfileConfig};
use turnstile_core::backend::{Backend, GenerationRequest};
use turnstile_core::error::BackendError;
use turnstile_core::message::Role;
use turnstile_gateway::{ApiState, SharedApiState, build_router};
use turnstile_sessions::SessionStore;
use turnstile_tools::default_registry;

// ── Mock Backend ─────────────────────────────────────────────────────────

/// A backend that returns scripted responses in sequence and records the
/// prompts it was given.
struct ScriptedBackend {
    responses: std::sync::Mutex<Vec<String>>,
    prompts: std::sync::Mutex<Vec<GenerationRequest>>,
    delay: Duration,
}

impl ScriptedBackend {
    fn new(responses: &[&str]) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.iter().rev().map(|r| r.to_string()).collect()),
            prompts: std::sync::Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(request);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.responses.lock().unwrap().pop();
        Ok(next.unwrap_or_else(|| "Nothing more to add.".to_string()))
    }
}

fn gateway(backend: Arc<ScriptedBackend>, config: AppConfig) -> (SharedApiState, TempDir) {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(default_registry());
    let profiles = ProfileCatalog::from_config(&config.profiles, &registry);
    let agent = ConversationLoop::from_config(backend, registry, &config.agent);
    let sessions = Arc::new(SessionStore::open(dir.path()).unwrap());
    (Arc::new(ApiState::new(config, agent, profiles, sessions)), dir)
}

async fn send(
    state: &SharedApiState,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn send_json(
    state: &SharedApiState,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let (status, bytes) = send(state, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn new_session(state: &SharedApiState, profile: &str) -> String {
    let (status, session) = send_json(
        state,
        "POST",
        "/v1/sessions",
        Some(serde_json::json!({"profile_name": profile})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    session["id"].as_str().unwrap().to_string()
}

// ── E2E: Session Conversation ────────────────────────────────────────────

#[tokio::test]
async fn e2e_session_tool_round_then_follow_up() {
    let backend = Arc::new(ScriptedBackend::new(&[
        "<think>The user wants today's date.</think>\n\
         <tool_call>\n{\"name\": \"get_current_datetime\", \"arguments\": {}}\n</tool_call>",
        "Today is a weekday.",
        "You asked about the date.",
    ]));
    let (state, _dir) = gateway(backend.clone(), AppConfig::default());
    let id = new_session(&state, "assistant").await;

    let (status, first) = send_json(
        &state,
        "POST",
        &format!("/v1/sessions/{id}/chat"),
        Some(serde_json::json!({"message": "What is the date today?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["response"]["content"], "Today is a weekday.");
    assert_eq!(first["response"]["rounds_used"], 2);
    assert_eq!(first["response"]["finished"], true);
    assert_eq!(first["response"]["tool_calls"][0]["name"], "get_current_datetime");
    let tool_result: serde_json::Value =
        serde_json::from_str(first["response"]["tool_results"][0]["result"].as_str().unwrap())
            .unwrap();
    assert!(tool_result["utc"]["date"].is_string());

    // Second round's prompt carries the tool results as a user turn.
    {
        let prompts = backend.prompts.lock().unwrap();
        let second = &prompts[1].messages;
        let last = second.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert!(last.content.contains("<tool_response>"));
        assert!(second[0].content.contains("<tools>"));
    }

    let (status, second) = send_json(
        &state,
        "POST",
        &format!("/v1/sessions/{id}/chat"),
        Some(serde_json::json!({"message": "What did I ask?"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["response"]["content"], "You asked about the date.");

    // Follow-up sees the stored history: system, 2 prior turns, new user turn.
    {
        let prompts = backend.prompts.lock().unwrap();
        let follow_up = &prompts[2].messages;
        assert_eq!(follow_up.len(), 4);
        assert_eq!(follow_up[1].content, "What is the date today?");
        assert_eq!(follow_up[2].content, "Today is a weekday.");
        assert_eq!(follow_up[3].content, "What did I ask?");
    }

    let (_, session) = send_json(&state, "GET", &format!("/v1/sessions/{id}"), None).await;
    assert_eq!(session["messages"].as_array().unwrap().len(), 4);
    assert_eq!(session["title"], "What is the date today?");

    let (_, listed) = send_json(&state, "GET", "/v1/sessions", None).await;
    assert_eq!(listed[0]["message_count"], 4);
}

#[tokio::test]
async fn e2e_round_budget_exhaustion_is_degraded_success() {
    let call = r#"<tool_call>{"name": "get_current_datetime", "arguments": {}}</tool_call>"#;
    let backend = Arc::new(ScriptedBackend::new(&[call, call, call]));
    let mut config = AppConfig::default();
    config.profiles.push(ProfileConfig {
        name: "clock".into(),
        system_prompt: "You tell the time.".into(),
        tools: vec!["get_current_datetime".into()],
        max_tool_rounds: 3,
        max_tokens: 256,
        temperature: 0.2,
    });
    let (state, _dir) = gateway(backend.clone(), config);

    let (status, chat) = send_json(
        &state,
        "POST",
        "/v1/chat",
        Some(serde_json::json!({"message": "time?", "profile": "clock"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["finished"], false);
    assert_eq!(chat["rounds_used"], 3);
    assert_eq!(chat["tool_calls"].as_array().unwrap().len(), 3);
    assert_eq!(backend.calls(), 3);
}

#[tokio::test]
async fn e2e_unknown_tool_is_fed_back_not_fatal() {
    let backend = Arc::new(ScriptedBackend::new(&[
        r#"<tool_call>{"name": "teleport", "arguments": {"to": "mars"}}</tool_call>"#,
        "I cannot teleport.",
    ]));
    let (state, _dir) = gateway(backend, AppConfig::default());
    let id = new_session(&state, "assistant").await;

    let (status, chat) = send_json(
        &state,
        "POST",
        &format!("/v1/sessions/{id}/chat"),
        Some(serde_json::json!({"message": "Take me to Mars"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["response"]["content"], "I cannot teleport.");
    assert_eq!(
        chat["response"]["tool_results"][0]["result"],
        r#"{"error":"Unknown tool: teleport"}"#
    );
}

// ── E2E: Admission ───────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn e2e_concurrent_sessions_get_distinct_positions() {
    let backend = Arc::new(ScriptedBackend::new(&[]).with_delay(Duration::from_millis(40)));
    let (state, _dir) = gateway(backend.clone(), AppConfig::default());

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(new_session(&state, "general").await);
    }

    let handles: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let state = state.clone();
            tokio::spawn(async move {
                send_json(
                    &state,
                    "POST",
                    &format!("/v1/sessions/{id}/chat"),
                    Some(serde_json::json!({"message": "hello"})),
                )
                .await
            })
        })
        .collect();

    let mut admitted = Vec::new();
    let mut immediate = 0;
    for handle in handles {
        let (status, chat) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        admitted.push((
            chat["queue_stats"]["queue_position"].as_u64().unwrap(),
            chat["queue_stats"]["queue_wait_ms"].as_f64().unwrap(),
        ));
        if chat["queue_stats"]["was_queued"] == false {
            immediate += 1;
        }
    }
    admitted.sort_by_key(|(position, _)| *position);
    admitted.dedup_by_key(|(position, _)| *position);
    assert_eq!(admitted.len(), 5, "positions must be distinct");
    assert!(
        admitted.windows(2).all(|pair| pair[0].1 < pair[1].1),
        "later positions wait longer: {admitted:?}"
    );
    assert_eq!(immediate, 1);
    assert_eq!(backend.calls(), 5);

    let (_, status) = send_json(&state, "GET", "/v1/generation/status", None).await;
    assert_eq!(status["generating_session_id"], serde_json::Value::Null);
    assert_eq!(status["queued_session_ids"], serde_json::json!([]));
}

// ── E2E: Streaming ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_stream_truncates_args_but_not_code() {
    let long_query = "q".repeat(400);
    let first = format!(
        r#"<tool_call>{{"name": "get_current_datetime", "arguments": {{"query": "{long_query}", "code": "{long_query}"}}}}</tool_call>"#
    );
    let backend = Arc::new(ScriptedBackend::new(&[first.as_str(), "Done."]));
    let (state, _dir) = gateway(backend, AppConfig::default());
    let id = new_session(&state, "assistant").await;

    let (status, body) = send(
        &state,
        "POST",
        &format!("/v1/sessions/{id}/chat/stream"),
        Some(serde_json::json!({"message": "go"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let text = String::from_utf8(body).unwrap();
    let frames: Vec<serde_json::Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    let tool_start = frames.iter().find(|f| f["type"] == "tool_start").unwrap();
    assert_eq!(tool_start["round"], 1);
    assert_eq!(tool_start["tool_args"]["query"].as_str().unwrap().chars().count(), 203);
    assert_eq!(tool_start["tool_args"]["code"].as_str().unwrap().len(), 400);

    let terminal: Vec<_> = frames
        .iter()
        .filter(|f| f["type"] == "complete" || f["type"] == "error")
        .collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0]["type"], "complete");
    assert_eq!(frames.last().unwrap()["type"], "complete");
}

// ── E2E: Tools API ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_direct_tool_invocation() {
    let (state, _dir) = gateway(Arc::new(ScriptedBackend::new(&[])), AppConfig::default());

    let (status, tools) = send_json(&state, "GET", "/v1/tools", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tools["count"], 2);

    let (status, invoked) = send_json(
        &state,
        "POST",
        "/v1/tools/get_current_datetime/invoke",
        Some(serde_json::json!({"arguments": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(invoked["result"]["hints"].is_object());

    let (status, _) = send_json(
        &state,
        "POST",
        "/v1/invoke-tool",
        Some(serde_json::json!({"tool_name": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn e2e_health_reports_backend_and_catalog() {
    let (state, _dir) = gateway(Arc::new(ScriptedBackend::new(&[])), AppConfig::default());
    let (status, health) = send_json(&state, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["backend"], "e2e_mock");
    assert_eq!(health["generation_in_progress"], false);
    assert_eq!(health["available_profiles"], serde_json::json!(["assistant", "general"]));
}

// ── E2E: Session Janitor ─────────────────────────────────────────────────

#[tokio::test]
async fn e2e_empty_sessions_are_pruned_but_used_ones_survive() {
    let (state, _dir) = gateway(Arc::new(ScriptedBackend::new(&["Hi!"])), AppConfig::default());
    let empty = new_session(&state, "general").await;
    let used = new_session(&state, "general").await;
    let (status, _) = send_json(
        &state,
        "POST",
        &format!("/v1/sessions/{used}/chat"),
        Some(serde_json::json!({"message": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let pruned = state.sessions.prune_empty(Duration::ZERO).unwrap();
    assert_eq!(pruned, 1);

    let (status, _) = send_json(&state, "GET", &format!("/v1/sessions/{empty}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(&state, "GET", &format!("/v1/sessions/{used}"), None).await;
    assert_eq!(status, StatusCode::OK);
}

// ── E2E: Configuration System ────────────────────────────────────────────

#[test]
fn e2e_config_defaults_and_validation() {
    let config = AppConfig::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.gateway.request_timeout_secs, 1800);
    assert_eq!(config.gateway.queued_threshold_ms, 10);
    assert_eq!(config.agent.untruncated_args, vec!["code"]);

    // Verify TOML roundtrip.
    let toml_str = toml::to_string_pretty(&config).expect("Config should serialize");
    let reparsed: AppConfig = toml::from_str(&toml_str).expect("Config should parse back");
    assert_eq!(reparsed.gateway.port, config.gateway.port);
    assert_eq!(reparsed.sessions.list_limit, config.sessions.list_limit);
}
