//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `GET  /v1/tools`                    — List tool specs
//! - `GET  /v1/tools/{name}`             — One tool spec
//! - `POST /v1/tools/{name}/invoke`      — Run a tool directly
//! - `POST /v1/invoke-tool`              — Run a tool directly (name in the body)
//! - `GET  /v1/profiles`                 — List profiles
//! - `GET  /v1/profiles/{name}/tools`    — Tools of one profile
//! - `POST /v1/chat`                     — Stateless chat
//! - `GET  /v1/sessions`                 — List sessions, newest first
//! - `POST /v1/sessions`                 — Create a session
//! - `GET  /v1/sessions/{id}`            — Get a session
//! - `DELETE /v1/sessions/{id}`          — Delete a session
//! - `POST /v1/sessions/{id}/chat`       — Chat in a session
//! - `POST /v1/sessions/{id}/chat/stream` — Chat in a session, SSE progress
//! - `GET  /v1/generation/status`        — Who is generating, who is waiting
//!
//! Every chat goes through the admission queue, so at most one generation
//! runs at a time.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderName, StatusCode, header},
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use turnstile_agent::{
    AgentError, ConversationLoop, DEFAULT_PROFILE, EventKind, EventSink, GenerationEvent,
    ProfileCatalog, ProfileInfo,
};
use turnstile_config::AppConfig;
use turnstile_core::chat::ChatResponse;
use turnstile_core::error::SessionError;
use turnstile_core::message::{Message, Role};
use turnstile_core::profile::Profile;
use turnstile_core::registry::ToolRegistry;
use turnstile_core::tool::{ToolArguments, ToolCall, ToolResult, ToolSpec};
use turnstile_sessions::{Session, SessionStore, SessionSummary};

use crate::admission::{AdmissionError, AdmissionQueue, GenerationStatus, QueueStats};

// ── State ─────────────────────────────────────────────────────────────────

/// Queue label for `/v1/chat`, which has no session.
const STATELESS_CHAT: &str = "stateless";

/// Shared state for the v1 API.
pub struct ApiState {
    pub config: AppConfig,
    pub agent: Arc<ConversationLoop>,
    pub profiles: ProfileCatalog,
    pub sessions: Arc<SessionStore>,
    pub queue: Arc<AdmissionQueue>,
}

pub type SharedApiState = Arc<ApiState>;

impl ApiState {
    pub fn new(
        config: AppConfig,
        agent: ConversationLoop,
        profiles: ProfileCatalog,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let queue = AdmissionQueue::from_config(&config.gateway);
        Self {
            config,
            agent: Arc::new(agent),
            profiles,
            sessions,
            queue,
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.agent.registry()
    }
}

/// Build the v1 API router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/tools", get(list_tools_handler))
        .route("/tools/{name}", get(get_tool_handler))
        .route("/tools/{name}/invoke", post(invoke_tool_handler))
        .route("/invoke-tool", post(invoke_tool_legacy_handler))
        .route("/profiles", get(list_profiles_handler))
        .route("/profiles/{name}/tools", get(profile_tools_handler))
        .route("/chat", post(chat_handler))
        .route("/sessions", get(list_sessions_handler).post(create_session_handler))
        .route(
            "/sessions/{id}",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/sessions/{id}/chat", post(session_chat_handler))
        .route("/sessions/{id}/chat/stream", post(session_chat_stream_handler))
        .route("/generation/status", get(generation_status_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

#[derive(Debug, Serialize, Deserialize)]
struct ToolListResponse {
    tools: Vec<ToolSpec>,
    count: usize,
}

#[derive(Deserialize)]
struct InvokeToolRequest {
    #[serde(default)]
    arguments: ToolArguments,
}

#[derive(Deserialize)]
struct LegacyInvokeToolRequest {
    tool_name: String,
    #[serde(default)]
    arguments: ToolArguments,
}

#[derive(Debug, Serialize, Deserialize)]
struct InvokeToolResponse {
    tool_name: String,
    /// Parsed JSON when the tool returned JSON, the raw text otherwise.
    result: serde_json::Value,
    latency_ms: f64,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default = "default_profile")]
    profile: String,
    #[serde(default)]
    history: Vec<Message>,
}

fn default_profile() -> String {
    DEFAULT_PROFILE.into()
}

/// A finished turn as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponseModel {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub rounds_used: u32,
    pub finished: bool,
    /// Wall time from request arrival, including queue wait.
    pub latency_ms: f64,
}

impl ChatResponseModel {
    fn new(response: ChatResponse, started: Instant) -> Self {
        Self {
            content: response.content,
            tool_calls: response.tool_calls,
            tool_results: response.tool_results,
            rounds_used: response.rounds_used,
            finished: response.finished,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }
}

#[derive(Deserialize)]
struct ListSessionsQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    #[serde(default = "default_profile")]
    profile_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DeleteSessionResponse {
    deleted: bool,
}

#[derive(Deserialize)]
struct SessionChatRequest {
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionChatResponse {
    pub session: Session,
    pub response: ChatResponseModel,
    pub queue_stats: QueueStats,
}

// ── Tool handlers ─────────────────────────────────────────────────────────

async fn list_tools_handler(State(state): State<SharedApiState>) -> Json<ToolListResponse> {
    let tools = state.registry().specs();
    let count = tools.len();
    Json(ToolListResponse { tools, count })
}

async fn get_tool_handler(
    State(state): State<SharedApiState>,
    Path(name): Path<String>,
) -> Result<Json<ToolSpec>, ApiError> {
    state
        .registry()
        .spec(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Unknown tool: {name}")))
}

async fn invoke_tool_handler(
    State(state): State<SharedApiState>,
    Path(name): Path<String>,
    Json(payload): Json<InvokeToolRequest>,
) -> Result<Json<InvokeToolResponse>, ApiError> {
    invoke_tool(&state, name, payload.arguments).await
}

async fn invoke_tool_legacy_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<LegacyInvokeToolRequest>,
) -> Result<Json<InvokeToolResponse>, ApiError> {
    invoke_tool(&state, payload.tool_name, payload.arguments).await
}

/// Direct invocation, outside the conversation loop and the queue.
async fn invoke_tool(
    state: &ApiState,
    name: String,
    arguments: ToolArguments,
) -> Result<Json<InvokeToolResponse>, ApiError> {
    let registry = state.registry();
    if !registry.contains(&name) {
        return Err(api_error(StatusCode::NOT_FOUND, format!("Unknown tool: {name}")));
    }

    info!(tool = %name, "Direct tool invocation");
    let started = Instant::now();
    let raw = registry.execute_async(&name, arguments).await;
    let result = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));

    Ok(Json(InvokeToolResponse {
        tool_name: name,
        result,
        latency_ms: started.elapsed().as_secs_f64() * 1000.0,
    }))
}

// ── Profile handlers ──────────────────────────────────────────────────────

async fn list_profiles_handler(State(state): State<SharedApiState>) -> Json<Vec<ProfileInfo>> {
    Json(state.profiles.infos())
}

async fn profile_tools_handler(
    State(state): State<SharedApiState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ToolSpec>>, ApiError> {
    let profile = state
        .profiles
        .get(&name)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Unknown profile: {name}")))?;
    Ok(Json(profile.tools.clone()))
}

fn require_profile(state: &ApiState, name: &str) -> Result<Arc<Profile>, ApiError> {
    state
        .profiles
        .get(name)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, format!("Unknown profile: {name}")))
}

// ── Chat handlers ─────────────────────────────────────────────────────────

fn admission_failure(e: AdmissionError) -> ApiError {
    match e {
        AdmissionError::WaitTimedOut { .. } | AdmissionError::GenerationTimedOut { .. } => {
            api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        AdmissionError::Aborted(_) => api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn agent_failure(e: AgentError) -> ApiError {
    error!(error = %e, "Conversation failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn session_failure(e: SessionError) -> ApiError {
    match e {
        SessionError::NotFound(_) => api_error(StatusCode::NOT_FOUND, e.to_string()),
        other => {
            error!(error = %other, "Session storage failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

async fn chat_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponseModel>, ApiError> {
    let started = Instant::now();
    let profile = require_profile(&state, &payload.profile)?;
    info!(profile = %profile.name, history = payload.history.len(), "v1/chat request");

    let ticket = state.queue.enqueue(STATELESS_CHAT);
    tokio::task::yield_now().await;

    let agent = state.agent.clone();
    let (outcome, _stats) = ticket
        .run(move |_| async move {
            agent
                .run(&profile, &payload.history, &payload.message, None)
                .await
        })
        .await
        .map_err(admission_failure)?;

    let response = outcome.map_err(agent_failure)?;
    Ok(Json(ChatResponseModel::new(response, started)))
}

/// One session turn, run while holding the generation guard.
///
/// The session is re-read under the guard, so turns on the same session
/// never overwrite each other.
async fn run_session_turn(
    state: &ApiState,
    session_id: &str,
    profile: &Profile,
    message: &str,
    events: Option<&EventSink>,
) -> Result<(Session, ChatResponse), ApiError> {
    let mut session = state.sessions.get(session_id).map_err(session_failure)?;
    let history = session.history();
    session.add_message(Role::User, message, Vec::new(), Vec::new());

    let response = state
        .agent
        .run(profile, &history, message, events)
        .await
        .map_err(agent_failure)?;

    session.add_message(
        Role::Assistant,
        response.content.as_str(),
        response.tool_calls.clone(),
        response.tool_results.clone(),
    );
    state.sessions.save(&session).map_err(session_failure)?;

    info!(
        session_id = %session.id,
        rounds = response.rounds_used,
        finished = response.finished,
        "Session turn complete"
    );
    Ok((session, response))
}

/// Validate before queueing: unknown sessions and profiles never take a
/// position.
fn prepare_session_chat(
    state: &ApiState,
    session_id: &str,
) -> Result<Arc<Profile>, ApiError> {
    let session = state.sessions.get(session_id).map_err(session_failure)?;
    require_profile(state, &session.profile_name)
}

async fn session_chat_handler(
    State(state): State<SharedApiState>,
    Path(session_id): Path<String>,
    Json(payload): Json<SessionChatRequest>,
) -> Result<Json<SessionChatResponse>, ApiError> {
    let started = Instant::now();
    let profile = prepare_session_chat(&state, &session_id)?;
    info!(session_id = %session_id, profile = %profile.name, "Session chat request");

    let ticket = state.queue.enqueue(session_id.as_str());
    tokio::task::yield_now().await;

    let worker = state.clone();
    let (outcome, queue_stats) = ticket
        .run(move |_| async move {
            run_session_turn(&worker, &session_id, &profile, &payload.message, None).await
        })
        .await
        .map_err(admission_failure)?;

    let (session, response) = outcome?;
    Ok(Json(SessionChatResponse {
        session,
        response: ChatResponseModel::new(response, started),
        queue_stats,
    }))
}

/// Same turn as [`session_chat_handler`], with progress delivered as SSE.
///
/// The stream always ends with exactly one `complete` or `error` event. If
/// the client disconnects the turn still runs to completion and is saved.
async fn session_chat_stream_handler(
    State(state): State<SharedApiState>,
    Path(session_id): Path<String>,
    Json(payload): Json<SessionChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let started = Instant::now();
    let profile = prepare_session_chat(&state, &session_id)?;
    info!(session_id = %session_id, profile = %profile.name, "Session chat stream request");

    let ticket = state.queue.enqueue(session_id.as_str());
    tokio::task::yield_now().await;

    let buffer = state.config.agent.event_buffer.max(1);
    let (tx, rx) = mpsc::channel::<GenerationEvent>(buffer);

    tokio::spawn(async move {
        let (work_tx, mut work_rx) = mpsc::channel::<GenerationEvent>(buffer);
        let worker = state.clone();
        let run = ticket.run(move |_| async move {
            run_session_turn(&worker, &session_id, &profile, &payload.message, Some(&work_tx))
                .await
        });
        tokio::pin!(run);

        let outcome = loop {
            tokio::select! {
                outcome = &mut run => break outcome,
                Some(event) = work_rx.recv() => {
                    let _ = tx.send(event).await;
                }
            }
        };
        // Events the turn emitted before finishing. After a generation
        // timeout the turn may still be running; anything it sends later
        // is dropped with `work_rx`.
        while let Ok(event) = work_rx.try_recv() {
            let _ = tx.send(event).await;
        }

        let terminal = match outcome {
            Ok((Ok((session, response)), queue_stats)) => complete_event(
                session,
                ChatResponseModel::new(response, started),
                queue_stats,
            ),
            Ok((Err((_, Json(failure))), _)) => GenerationEvent::error(failure.error),
            Err(e) => {
                warn!(error = %e, "Streamed turn did not complete");
                GenerationEvent::error(e.to_string())
            }
        };
        let _ = tx.send(terminal).await;
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let event_type = event.event_type();
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(SseEvent::default().event(event_type).data(data))
    });

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream),
    ))
}

fn complete_event(
    session: Session,
    response: ChatResponseModel,
    queue_stats: QueueStats,
) -> GenerationEvent {
    let payload = (
        serde_json::to_value(session),
        serde_json::to_value(response),
        serde_json::to_value(queue_stats),
    );
    match payload {
        (Ok(session), Ok(response), Ok(queue_stats)) => GenerationEvent::new(EventKind::Complete {
            session: Some(session),
            response,
            queue_stats,
        }),
        _ => GenerationEvent::error("Failed to serialize the completed turn"),
    }
}

// ── Session handlers ──────────────────────────────────────────────────────

async fn list_sessions_handler(
    State(state): State<SharedApiState>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let limit = query.limit.unwrap_or(state.config.sessions.list_limit);
    state
        .sessions
        .list_summaries(limit)
        .map(Json)
        .map_err(session_failure)
}

async fn create_session_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    require_profile(&state, &payload.profile_name)?;
    let session = state
        .sessions
        .create(&payload.profile_name)
        .map_err(session_failure)?;
    info!(session_id = %session.id, profile = %session.profile_name, "Session created");
    Ok((StatusCode::CREATED, Json(session)))
}

async fn get_session_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state.sessions.get(&id).map(Json).map_err(session_failure)
}

async fn delete_session_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteSessionResponse>, ApiError> {
    if !state.sessions.delete(&id).map_err(session_failure)? {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Session not found: {id}"),
        ));
    }
    info!(session_id = %id, "Session deleted");
    Ok(Json(DeleteSessionResponse { deleted: true }))
}

async fn generation_status_handler(State(state): State<SharedApiState>) -> Json<GenerationStatus> {
    Json(state.queue.status())
}
