use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::request::{Decision, NewRequest, Request, StatusUpdate};
use crate::service::Negotiated;
use crate::AppState;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateRequest {
    pub user_id: Option<String>,
}

// ── Helpers ──────────────────────────────────────────────────

/// A malformed body is a validation failure, not axum's default 422.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(v)| v).map_err(|rejection| {
        tracing::warn!("rejected request body: {}", rejection.body_text());
        AppError::invalid("body", rejection.body_text())
    })
}

/// A path segment that is not a UUID cannot name a stored request.
fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| {
        tracing::debug!("lookup with malformed id: {}", raw);
        AppError::NotFound
    })
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /requests — submit a new approval request
pub async fn create_request(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Request>), AppError> {
    let input = body(payload)?;
    let created = state.service.create(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /requests — all requests, newest first
pub async fn list_requests(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Request>>, AppError> {
    Ok(Json(state.service.list().await?))
}

/// GET /requests/:id
pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Request>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(state.service.get(id).await?))
}

/// PATCH /requests/:id — approve or reject
pub async fn update_request_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Request>, AppError> {
    let update = body(payload)?;
    let decision: Decision = update
        .status
        .parse()
        .map_err(|msg: String| AppError::invalid("status", msg))?;
    let id = parse_id(&id)?;

    Ok(Json(state.service.update_status(id, decision).await?))
}

/// POST /pubsub/negotiate — issue a relay endpoint for one user
///
/// An empty body means "no userId"; any other body must be valid JSON.
pub async fn negotiate(
    State(state): State<Arc<AppState>>,
    payload: Bytes,
) -> Result<Json<Negotiated>, AppError> {
    let user_id = if payload.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        body(Json::<NegotiateRequest>::from_bytes(&payload))?.user_id
    };
    Ok(Json(state.service.negotiate(user_id).await?))
}

/// GET /metrics — Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::encode_metrics(),
    )
}
