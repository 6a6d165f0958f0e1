//! REST surface over the orchestrator.
//!
//! Handlers are single-call wrappers: every route maps straight onto one
//! engine or scheduler operation. Callers are not authenticated here.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::bulk::BulkSequencer;
use crate::campaign::{CampaignScheduler, RecipientRecord};
use crate::dispatch::DispatchEngine;
use crate::error::{CampaignError, DispatchError};
use crate::message::SendRequest;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DispatchEngine>,
    pub scheduler: CampaignScheduler,
    /// Default inter-message delay for bulk sends.
    pub bulk_delay: Duration,
}

/// Build the Axum router with the orchestrator routes.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/dispatch", post(dispatch))
        .route("/api/dispatch/bulk", post(dispatch_bulk))
        .route("/api/send-as", post(send_as))
        .route("/api/campaigns", post(create_campaign))
        .route("/api/campaigns/{id}", get(get_campaign))
        .route("/api/stats", get(stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn error_status(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::AllCapacityExhausted => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
        DispatchError::AccountTransport { .. } | DispatchError::RelayTransport { .. } => {
            StatusCode::BAD_GATEWAY
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mailroom"
    }))
}

async fn dispatch(
    State(state): State<AppState>,
    Json(request): Json<SendRequest>,
) -> impl IntoResponse {
    match state.engine.dispatch(&request).await {
        Ok(result) => (StatusCode::OK, Json(serde_json::json!(result))),
        Err(e) => (
            error_status(&e),
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkRequest {
    pub requests: Vec<SendRequest>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

async fn dispatch_bulk(
    State(state): State<AppState>,
    Json(body): Json<BulkRequest>,
) -> impl IntoResponse {
    let delay = body
        .delay_ms
        .map(Duration::from_millis)
        .unwrap_or(state.bulk_delay);
    let sequencer = BulkSequencer::new(Arc::clone(&state.engine)).with_delay(delay);
    let outcomes = sequencer.send_all(&body.requests).await;
    Json(serde_json::json!({ "outcomes": outcomes }))
}

#[derive(Debug, Deserialize)]
pub struct SendAsRequest {
    pub identity: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
}

async fn send_as(
    State(state): State<AppState>,
    Json(body): Json<SendAsRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .send_as_client(&body.identity, body.to, &body.subject, &body.html_body)
        .await
    {
        Ok(result) => (StatusCode::OK, Json(serde_json::json!(result))),
        Err(e) => (
            error_status(&e),
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub recipients: Vec<RecipientRecord>,
    pub subject_template: String,
    pub html_template: String,
    pub waves: Vec<DateTime<Utc>>,
}

async fn create_campaign(
    State(state): State<AppState>,
    Json(body): Json<CreateCampaignRequest>,
) -> impl IntoResponse {
    match state
        .scheduler
        .create_campaign(
            &body.name,
            body.recipients,
            &body.subject_template,
            &body.html_template,
            body.waves,
        )
        .await
    {
        Ok(id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "campaign_id": id })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.scheduler.campaign(id).await {
        Ok(Some((campaign, status))) => (
            StatusCode::OK,
            Json(serde_json::json!({ "campaign": campaign, "status": status })),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": CampaignError::NotFound(id).to_string() })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!(state.engine.stats()))
}
