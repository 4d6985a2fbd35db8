//! HTTP gateway for Turnstile.
//!
//! Serves `/health` and the v1 API, and owns the admission queue that lets
//! only one generation run at a time.
//!
//! Built on Axum.

pub mod admission;
pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::{Router, extract::State, response::Json, routing::get};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use turnstile_agent::{ConversationLoop, ProfileCatalog};
use turnstile_config::AppConfig;
use turnstile_sessions::{SessionStore, spawn_janitor};

pub use admission::{AdmissionError, AdmissionQueue, GenerationStatus, QueueStats};
pub use api_v1::{ApiState, SharedApiState};

/// Errors that stop the gateway from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Backend setup failed: {0}")]
    Backend(#[from] turnstile_core::BackendError),

    #[error("Session store setup failed: {0}")]
    Sessions(#[from] turnstile_core::SessionError),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the full router: `/health` plus the v1 API under `/v1`.
///
/// Layers applied:
/// - Request body size limit (`gateway.max_body_bytes`)
/// - CORS for the configured origins
/// - HTTP trace logging
pub fn build_router(state: SharedApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&state.config.gateway.cors_origins))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let body_limit = state.config.gateway.max_body_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .with_state(state.clone())
        .nest("/v1", api_v1::v1_router(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn allowed_origins(origins: &[String]) -> AllowOrigin {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    AllowOrigin::list(parsed)
}

/// Build every shared subsystem once, from config.
pub fn build_state(config: AppConfig) -> Result<SharedApiState, GatewayError> {
    let backend = turnstile_backends::build_from_config(&config.backend)?;
    let registry = Arc::new(turnstile_tools::default_registry());
    let profiles = ProfileCatalog::from_config(&config.profiles, &registry);
    let agent = ConversationLoop::from_config(backend, registry, &config.agent);
    let sessions = Arc::new(SessionStore::open(&config.sessions.data_dir)?);

    Ok(Arc::new(ApiState::new(config, agent, profiles, sessions)))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), GatewayError> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let state = build_state(config)?;
    let sessions = &state.config.sessions;

    if sessions.prune_on_startup {
        let pruned = state.sessions.prune_empty(Duration::ZERO)?;
        info!(pruned, "Pruned empty sessions at startup");
    }
    let janitor = spawn_janitor(
        state.sessions.clone(),
        Duration::from_secs(sessions.empty_grace_secs),
        Duration::from_secs(sessions.janitor_interval_secs.max(1)),
    );

    info!(
        addr = %addr,
        backend = %state.agent.backend_name(),
        profiles = state.profiles.len(),
        tools = state.registry().len(),
        "Gateway starting"
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app).await;

    janitor.abort();
    served?;
    Ok(())
}

// --- Handlers ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
    pub generation_in_progress: bool,
    pub available_profiles: Vec<String>,
    pub available_tools: Vec<String>,
}

async fn health_handler(State(state): State<SharedApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        backend: state.agent.backend_name().to_string(),
        generation_in_progress: state.queue.is_generating(),
        available_profiles: state.profiles.names().into_iter().map(String::from).collect(),
        available_tools: state.registry().names().into_iter().map(String::from).collect(),
    })
}
