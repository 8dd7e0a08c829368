use crate::alert_client::AlertClient;
use crate::circuit_breaker::StorageCircuitBreaker;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::*;
use crate::score_storage::ScoreStorage;
use crate::scoring::{score_and_store_workflow, score_batch_workflow};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use moka::future::Cache;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Client for hot-lead alert delivery (optional).
    pub alert_client: Option<AlertClient>,
    /// Cache for kunde_id -> customer context JSON (checksummed entries).
    pub context_cache: Cache<String, String>,
    /// Dedupe cache so concurrent webhook events for the same lead revision
    /// are scored once.
    pub processing_leads_cache: Cache<String, i64>,
    /// Circuit breaker guarding score persistence writes.
    pub storage_breaker: StorageCircuitBreaker,
}

/// Health check endpoint.
///
/// Returns the service status and version.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "carbot-score-api",
            "version": "0.1.0"
        })),
    )
}

/// POST /api/v1/leads/score
///
/// Scores a lead from the payload: lead record, optional transcript,
/// optional customer context. Always returns a well-formed score —
/// malformed lead data yields the degraded default, never an error.
/// The persistence outcome is reported alongside the score.
pub async fn score_lead(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScoreLeadRequest>,
) -> Json<ScoreLeadResponse> {
    tracing::info!(
        "POST /leads/score - kunde_id: {:?}",
        request.lead.as_ref().and_then(|l| l.kunde_id.as_deref())
    );

    let (score, persistence) = score_and_store_workflow(
        &state,
        request.lead,
        request.chat_history,
        request.customer_context,
    )
    .await;

    Json(ScoreLeadResponse { score, persistence })
}

/// POST /api/v1/leads/score/batch
///
/// Scores up to `limit` leads (default 100) sequentially, pausing briefly
/// every 10 leads. A malformed lead gets the degraded default; the batch
/// never aborts.
pub async fn score_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BatchScoreRequest>,
) -> Json<BatchScoreResponse> {
    tracing::info!(
        "POST /leads/score/batch - {} lead(s), limit {:?}",
        request.leads.len(),
        request.limit
    );

    let response = score_batch_workflow(&state, request.leads, request.limit).await;
    Json(response)
}

/// POST /api/v1/leads/:id/rescore
///
/// Loads the lead and its transcript from the database and scores them
/// fresh, inserting a new history row. 404 when the lead does not exist.
pub async fn rescore_lead(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScoreLeadResponse>, AppError> {
    tracing::info!("POST /leads/{}/rescore", id);

    let storage = ScoreStorage::new(state.db.clone());
    let lead = storage
        .fetch_lead(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Lead with id {} not found", id)))?;
    let history = storage.fetch_chat_history(id).await?;

    let (score, persistence) =
        score_and_store_workflow(&state, Some(lead), Some(history), None).await;

    Ok(Json(ScoreLeadResponse { score, persistence }))
}

/// GET /api/v1/leads/:id/scores
///
/// Score history for a lead, newest first. An empty list is a valid
/// answer — a lead may simply never have been scored.
pub async fn score_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScoreHistoryResponse>, AppError> {
    tracing::info!("GET /leads/{}/scores", id);

    let storage = ScoreStorage::new(state.db.clone());
    let scores = storage.score_history(id).await?;

    Ok(Json(ScoreHistoryResponse {
        lead_id: id,
        scores,
    }))
}
