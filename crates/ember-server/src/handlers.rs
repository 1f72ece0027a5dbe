use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::lifecycle::{ConsumeResult, CreateError, FetchResult};
use crate::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Create ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub text: Option<String>,
    pub file_name: Option<String>,
    /// Base64-encoded file payload.
    pub file_content: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub token: String,
}

pub async fn create_secret(
    State(state): State<AppState>,
    Json(body): Json<CreateRequest>,
) -> Response {
    if body.file_name.is_some() != body.file_content.is_some() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "file_name and file_content must be provided together"})),
        )
            .into_response();
    }

    let file = match (body.file_name, body.file_content) {
        (Some(name), Some(content)) => match BASE64.decode(content.as_bytes()) {
            Ok(bytes) => Some((name, bytes)),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "file_content is not valid base64"})),
                )
                    .into_response();
            }
        },
        _ => None,
    };

    match state.lifecycle.create(body.text.as_deref().unwrap_or(""), file) {
        Ok(token) => {
            info!("secret link issued");
            (StatusCode::CREATED, Json(CreateResponse { token })).into_response()
        }
        Err(CreateError::EmptyPayload) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "a text or file payload is required"})),
        )
            .into_response(),
        Err(e @ CreateError::PayloadTooLarge { .. }) => (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
        Err(CreateError::TokenExhausted) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "could not allocate a unique token"})),
        )
            .into_response(),
        Err(CreateError::Store(e)) => store_unavailable(e),
    }
}

// ── Preview ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Base64-encoded file payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    pub expires_at: i64,
}

pub async fn preview_secret(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    match state.lifecycle.fetch(&token) {
        Ok(FetchResult::Payload(p)) => Json(PreviewResponse {
            text: p.text,
            file_name: p.file_name,
            file_content: p.file_bytes.map(|b| BASE64.encode(b)),
            expires_at: p.expires_at,
        })
        .into_response(),
        Ok(FetchResult::NotFound) => not_found(),
        Ok(FetchResult::Expired) => expired(),
        Ok(FetchResult::AlreadyViewed) => already_viewed(),
        Err(e) => store_unavailable(e),
    }
}

// ── Consume ───────────────────────────────────────────────────────────────────

pub async fn consume_secret(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    match state.lifecycle.consume(&token) {
        Ok(ConsumeResult::Consumed) => Json(json!({"consumed": true})).into_response(),
        Ok(ConsumeResult::NotFound) => not_found(),
        Ok(ConsumeResult::Expired) => expired(),
        Ok(ConsumeResult::AlreadyViewed) => already_viewed(),
        Err(e) => store_unavailable(e),
    }
}

// ── Error responses ───────────────────────────────────────────────────────────

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "secret not found"})),
    )
        .into_response()
}

fn expired() -> Response {
    (
        StatusCode::GONE,
        Json(json!({"error": "secret has expired"})),
    )
        .into_response()
}

fn already_viewed() -> Response {
    (
        StatusCode::GONE,
        Json(json!({"error": "secret has already been viewed"})),
    )
        .into_response()
}

/// Transient store failure. The caller owns retry policy, so signal
/// retryability with 503 rather than a generic 500.
fn store_unavailable(e: anyhow::Error) -> Response {
    tracing::error!(error = %e, "store unavailable");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "store unavailable, retry later"})),
    )
        .into_response()
}
