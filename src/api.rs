//! REST API server for the authorization core
//!
//! Exposes the orchestrator to the chat/voice UI: user turns go in, agent
//! says and challenge state come out, and the biometric modal drives the
//! submit/cancel endpoints.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::completions::{ChatMessage, CompletionsClient};
use crate::error::AuthorizationError;
use crate::channel::ChannelEvent;
use crate::models::{format_naira, BiometricAttempt};
use crate::session::{SessionContext, SessionHandle, SessionRegistry};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatTurnRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChallengeSubmitRequest {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    /// Still captured by the caller's own webcam; when absent the
    /// server-side camera capability is asked instead
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChallengeCancelRequest {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SessionRegistry>,
    pub completions: Option<Arc<CompletionsClient>>,
}

/// =============================
/// Helpers — Identity Derivation
/// =============================

fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

fn parse_or_stable_uuid(value: Option<&str>, fallback_seed: &str) -> uuid::Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            uuid::Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => stable_uuid_from_string(fallback_seed),
    }
}

/// Session context for a request: arbitrary caller-supplied identifiers are
/// normalized into a stable user id, and an absent session id falls back to
/// the conventional chat session for that user.
fn resolve_context(session_id: Option<&str>, user_id: Option<&str>) -> SessionContext {
    let user_id = match user_id {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => parse_or_stable_uuid(None, "anonymous-user").to_string(),
    };

    match session_id {
        Some(v) if !v.trim().is_empty() => SessionContext::new(v.trim(), user_id),
        _ => SessionContext::for_chat_user(&user_id),
    }
}

fn challenge_snapshot(attempt: Option<BiometricAttempt>) -> serde_json::Value {
    match attempt {
        // The frame stays server-side; the UI only needs the lifecycle
        Some(attempt) => serde_json::json!({
            "token": attempt.token,
            "status": attempt.status,
            "failure_reason": attempt.failure_reason,
        }),
        None => serde_json::Value::Null,
    }
}

async fn flow_snapshot(handle: &SessionHandle) -> serde_json::Value {
    serde_json::json!({
        "state": handle.orchestrator.state().await,
        "challenge": challenge_snapshot(handle.orchestrator.challenge().await),
        "pending": handle.orchestrator.pending().await.is_some(),
    })
}

fn flow_error_status(error: &AuthorizationError) -> StatusCode {
    match error {
        AuthorizationError::NoPendingAuthorization(_)
        | AuthorizationError::NoOpenAttempt
        | AuthorizationError::ChallengeAlreadyOpen(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Turn Endpoint
/// =============================

async fn chat_turn(
    State(state): State<ApiState>,
    Json(req): Json<ChatTurnRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let context = resolve_context(req.session_id.as_deref(), req.user_id.as_deref());
    let session_id = context.session_id.clone();
    let user_id = context.user_id.clone();

    info!(session_id = %session_id, "Chat turn received");

    let handle = state.registry.get_or_create(context).await;

    if let Err(e) = handle
        .orchestrator
        .handle_event(ChannelEvent::UserText(req.message.clone()))
        .await
    {
        return (
            flow_error_status(&e),
            Json(ApiResponse::error(format!("Chat turn failed: {}", e))),
        );
    }

    let reply = match &state.completions {
        Some(completions) => {
            let mut messages: Vec<ChatMessage> = req
                .history
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect();
            messages.push(ChatMessage::user(req.message.clone()));

            match completions.send(&messages, &user_id).await {
                Ok(turn) => {
                    for tc in &turn.tool_calls {
                        if let Err(e) = handle
                            .orchestrator
                            .handle_event(ChannelEvent::ToolInvocation {
                                name: tc.name.clone(),
                                parameters: tc.arguments.clone(),
                            })
                            .await
                        {
                            warn!("Tool invocation handling failed: {}", e);
                        }
                    }
                    if let Err(e) = handle
                        .orchestrator
                        .handle_event(ChannelEvent::AgentText(turn.text.clone()))
                        .await
                    {
                        warn!("Agent text handling failed: {}", e);
                    }
                    turn.text
                }
                Err(e) => {
                    warn!("Completions call failed, replying locally: {}", e);
                    local_reply(&handle).await
                }
            }
        }
        None => local_reply(&handle).await,
    };

    let says = handle.channel.drain().await;
    let mut data = flow_snapshot(&handle).await;
    data["reply"] = serde_json::json!(reply);
    data["says"] = serde_json::json!(says);
    data["session_id"] = serde_json::json!(session_id);
    data["user_id"] = serde_json::json!(user_id);

    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// Reply without an upstream agent: acknowledge an opened challenge or
/// fall back to a neutral line.
async fn local_reply(handle: &SessionHandle) -> String {
    if handle.orchestrator.challenge().await.is_none() {
        return "I'm processing your request.".to_string();
    }

    match handle.orchestrator.pending().await.and_then(|p| p.intent) {
        Some(intent) => format!(
            "Please verify your identity with face recognition to send {}.",
            format_naira(intent.amount_minor_units)
        ),
        None => "Please verify your identity with face recognition to complete this transfer."
            .to_string(),
    }
}

/// =============================
/// Challenge Endpoints
/// =============================

async fn submit_challenge(
    State(state): State<ApiState>,
    Json(req): Json<ChallengeSubmitRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let context = resolve_context(req.session_id.as_deref(), req.user_id.as_deref());
    info!(session_id = %context.session_id, "Challenge submission received");

    let handle = state.registry.get_or_create(context).await;

    let result = match req.image {
        Some(image) => handle.orchestrator.submit_frame(image).await,
        None => handle.orchestrator.submit_capture().await,
    };

    if let Err(e) = result {
        return (
            flow_error_status(&e),
            Json(ApiResponse::error(format!("Challenge submit failed: {}", e))),
        );
    }

    let says = handle.channel.drain().await;
    let mut data = flow_snapshot(&handle).await;
    data["says"] = serde_json::json!(says);

    (StatusCode::OK, Json(ApiResponse::success(data)))
}

async fn cancel_challenge(
    State(state): State<ApiState>,
    Json(req): Json<ChallengeCancelRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let context = resolve_context(req.session_id.as_deref(), req.user_id.as_deref());
    info!(session_id = %context.session_id, "Challenge cancellation received");

    let handle = state.registry.get_or_create(context).await;

    if let Err(e) = handle.orchestrator.cancel().await {
        return (
            flow_error_status(&e),
            Json(ApiResponse::error(format!("Challenge cancel failed: {}", e))),
        );
    }

    let data = flow_snapshot(&handle).await;
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// =============================
/// Router
/// =============================

pub fn create_router(registry: Arc<SessionRegistry>, completions: Option<Arc<CompletionsClient>>) -> Router {
    let state = ApiState {
        registry,
        completions,
    };

    Router::new()
        .route("/health", axum::routing::get(health))
        .route("/api/chat", post(chat_turn))
        .route("/api/challenge/submit", post(submit_challenge))
        .route("/api/challenge/cancel", post(cancel_challenge))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    registry: Arc<SessionRegistry>,
    completions: Option<Arc<CompletionsClient>>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(registry, completions);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
