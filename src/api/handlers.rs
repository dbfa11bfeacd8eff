//! HTTP request handlers

use super::markup::{callback_url, render, VOICEBOT_PATH};
use super::stream::stream_upgrade;
use super::types::{ErrorResponse, StatsResponse, StatusResponse, WebhookParams};
use super::AppState;
use crate::inbound::InboundFields;
use crate::instruction::Instruction;
use crate::session::SessionStore;
use crate::state_machine::Event;
use axum::{
    async_trait,
    extract::{FromRequest, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        // Provider call flow: GET starts the call, POST carries each recording
        .route(VOICEBOT_PATH, get(voicebot_start).post(voicebot_callback))
        .route("/exotel/status", post(call_status))
        // Streaming media transport
        .route("/exotel/stream", get(stream_upgrade))
        .route("/sessions/stats", get(session_stats))
        .with_state(state)
}

async fn health() -> &'static str {
    "Bot LIVE"
}

// ============================================================
// Webhook transport
// ============================================================

async fn voicebot_start(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let params = WebhookParams::new(query);
    answer(&state, &headers, "GET", params.inbound()).await
}

async fn voicebot_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    WebhookBody(body): WebhookBody,
) -> Response {
    let params = WebhookParams::new(body).merge(query);
    let mut fields = params.inbound();
    // A recording with nothing recognized is still the caller's turn
    if fields.utterance.is_none() && params.is_recording_callback() {
        fields.utterance = Some(String::new());
    }
    answer(&state, &headers, "POST", fields).await
}

async fn answer(
    state: &AppState,
    headers: &HeaderMap,
    method: &'static str,
    fields: InboundFields,
) -> Response {
    let started = Instant::now();
    let (call_id, event) = fields.into_parts();
    let event_name = event.name();
    let utterance_chars = match &event {
        Event::Utterance { text } => text.trim().chars().count(),
        _ => 0,
    };

    let instruction = state
        .controller
        .handle(&call_id, event)
        .await
        .unwrap_or_else(|| Instruction::apology(&state.controller.prompts().apology));

    let base = state.base_url(headers);
    let xml = render(&instruction, &state.voice, &callback_url(base.as_deref(), &call_id));

    tracing::info!(
        call_id = %call_id,
        method,
        event = event_name,
        utterance_chars,
        cue = ?instruction.cue,
        duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Call event handled"
    );

    ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], xml).into_response()
}

async fn call_status(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    WebhookBody(body): WebhookBody,
) -> Json<StatusResponse> {
    let params = WebhookParams::new(body).merge(query);
    let ended = params.is_terminal_status();
    let call_id = params.inbound().resolve_call_id();

    tracing::info!(call_id = %call_id, status = ?params.status(), ended, "Call status received");
    if ended {
        state.controller.handle(&call_id, Event::Hangup).await;
    }
    Json(StatusResponse { ended })
}

async fn session_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        open_sessions: state.controller.store().len().await,
    })
}

// ============================================================
// Body extraction
// ============================================================

/// Provider parameters from a form or JSON body; empty for anything else
#[derive(Debug, Default)]
pub struct WebhookBody(pub HashMap<String, String>);

#[async_trait]
impl<S> FromRequest<S> for WebhookBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("application/json") {
            let Json(object) = Json::<serde_json::Map<String, Value>>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            let values = object
                .into_iter()
                .filter_map(|(key, value)| scalar_text(value).map(|text| (key, text)))
                .collect();
            Ok(Self(values))
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(values) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            Ok(Self(values))
        } else {
            Ok(Self::default())
        }
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        tracing::warn!(%status, error = %message, "Rejected request");
        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
