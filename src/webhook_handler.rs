use crate::errors::AppError;
use crate::handlers::AppState;
use crate::score_storage::ScoreStorage;
use crate::scoring::score_and_store_workflow;
use crate::webhook_models::{IdempotencyKey, LeadEvent, WebhookPayload, WebhookResponse};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;

/// Lead Intake Webhook Handler
///
/// Receives events from the chat widget backend when leads are created or
/// updated. Validates the webhook secret, deduplicates events, and triggers
/// background scoring.
///
/// Expected payload: Single event object OR array of events
/// Authentication: X-Webhook-Token header must match WEBHOOK_SECRET env var
pub async fn lead_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<WebhookPayload>,
) -> Result<(StatusCode, Json<WebhookResponse>), AppError> {
    tracing::info!("Received lead intake webhook");

    // 1. Validate webhook secret (if configured)
    validate_webhook_secret(&state, &headers)?;

    // 2. Convert payload to vec of events (handles both single and batch)
    let events = payload.into_events();
    let total_received = events.len();
    tracing::info!("Processing {} lead event(s)", total_received);

    let mut processed = 0;
    let mut duplicates = 0;

    // 3. Process each event
    for event in events {
        match process_lead_event(&state, event).await {
            Ok(ProcessResult::Processed) => {
                processed += 1;
            }
            Ok(ProcessResult::Duplicate) => {
                duplicates += 1;
                tracing::debug!("Skipped duplicate lead event");
            }
            Err(e) => {
                tracing::error!("Failed to process lead event: {}", e);
                // Continue processing other events even if one fails
            }
        }
    }

    tracing::info!(
        "Webhook processing complete: {} received, {} processed, {} duplicates",
        total_received,
        processed,
        duplicates
    );

    // 4. Return 200 immediately (background jobs do the scoring)
    Ok((
        StatusCode::OK,
        Json(WebhookResponse {
            status: "received".to_string(),
            received: total_received,
            processed,
            duplicates,
        }),
    ))
}

/// Validate webhook secret from X-Webhook-Token header
fn validate_webhook_secret(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    // If no secret is configured, skip validation (warn was already logged at startup)
    let Some(ref expected_secret) = state.config.webhook_secret else {
        return Ok(());
    };

    // Extract token from header
    let token = headers
        .get("X-Webhook-Token")
        .or_else(|| headers.get("x-webhook-token"))
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-Webhook-Token header".to_string()))?;

    // Constant-time comparison to prevent timing attacks
    if !constant_time_compare(token, expected_secret) {
        tracing::warn!("Invalid webhook token received");
        return Err(AppError::Unauthorized("Invalid webhook token".to_string()));
    }

    Ok(())
}

/// Constant-time string comparison (basic implementation)
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes().iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[derive(Debug)]
enum ProcessResult {
    Processed,
    Duplicate,
}

/// Parse timestamp string to DateTime<Utc>
pub fn parse_timestamp(timestamp_str: &str) -> Result<DateTime<Utc>, AppError> {
    // Try ISO 8601 / RFC3339 format first (standard)
    chrono::DateTime::parse_from_rfc3339(timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Fallback: try custom format with timezone
            chrono::DateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S%.f %z")
                .map(|dt| dt.with_timezone(&Utc))
        })
        .or_else(|_| {
            // Fallback: try naive datetime and assume UTC
            chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S%.f")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .map_err(|e| {
            AppError::BadRequest(format!(
                "Invalid timestamp format '{}': {}. Expected ISO 8601 (RFC3339)",
                timestamp_str, e
            ))
        })
}

/// Process a single lead event
async fn process_lead_event(
    state: &Arc<AppState>,
    event: LeadEvent,
) -> Result<ProcessResult, AppError> {
    let lead_id = event.id;

    // Extract updated_at timestamp (required for idempotency)
    let updated_at_str = event
        .attributes
        .updated_at
        .clone()
        .ok_or_else(|| AppError::BadRequest("Missing updated_at in lead event".to_string()))?;

    // Parse timestamp immediately for type safety
    let updated_at_ts = parse_timestamp(&updated_at_str)?;

    tracing::debug!(
        "Processing lead event: lead_id={}, updated_at={}",
        lead_id,
        updated_at_str
    );

    // 1. Fast in-process guard against concurrent duplicates
    let key = IdempotencyKey::new(lead_id, updated_at_str).cache_key();
    if state.processing_leads_cache.get(&key).await.is_some() {
        return Ok(ProcessResult::Duplicate);
    }
    state
        .processing_leads_cache
        .insert(key, Utc::now().timestamp())
        .await;

    // 2. Check if already processed (idempotency across instances)
    if already_processed(&state.db, lead_id, &updated_at_ts).await? {
        return Ok(ProcessResult::Duplicate);
    }

    // 3. Store event receipt
    let hook_action = event.hook_action.clone();
    let payload_raw = serde_json::to_value(&event)
        .map_err(|e| AppError::InternalError(format!("Failed to serialize event: {}", e)))?;

    store_event_receipt(
        &state.db,
        lead_id,
        &updated_at_ts,
        hook_action.as_deref(),
        payload_raw,
    )
    .await?;

    // 4. Spawn background scoring job
    spawn_scoring_job(state.clone(), lead_id, updated_at_ts, event);

    Ok(ProcessResult::Processed)
}

/// Check if a lead event was already processed (idempotency check)
async fn already_processed(
    db: &PgPool,
    lead_id: uuid::Uuid,
    updated_at: &DateTime<Utc>,
) -> Result<bool, AppError> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM score_events
            WHERE lead_id = $1 AND updated_at = $2
        )
        "#,
    )
    .bind(lead_id)
    .bind(updated_at)
    .fetch_one(db)
    .await?;

    Ok(exists)
}

/// Store event receipt in database
async fn store_event_receipt(
    db: &PgPool,
    lead_id: uuid::Uuid,
    updated_at: &DateTime<Utc>,
    hook_action: Option<&str>,
    payload_raw: Value,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO score_events (lead_id, updated_at, hook_action, payload_raw, status)
        VALUES ($1, $2, $3, $4, 'received')
        "#,
    )
    .bind(lead_id)
    .bind(updated_at)
    .bind(hook_action)
    .bind(payload_raw)
    .execute(db)
    .await?;

    tracing::debug!("Stored event receipt for lead_id={}", lead_id);
    Ok(())
}

/// Spawn background scoring job (non-blocking)
///
/// The spawned task will:
/// 1. Mark the event as 'processing'
/// 2. Assemble lead + transcript (inline from the event, or from the DB)
/// 3. Score and persist a history row, alerting on hot leads
/// 4. Mark the event as 'completed' or 'failed'
fn spawn_scoring_job(
    state: Arc<AppState>,
    lead_id: uuid::Uuid,
    updated_at: DateTime<Utc>,
    event: LeadEvent,
) {
    tokio::spawn(async move {
        tracing::info!("Starting background scoring for lead_id={}", lead_id);

        // Update status to processing (with specific updated_at to target correct row)
        if let Err(e) = mark_event_processing(&state.db, lead_id, &updated_at).await {
            tracing::error!("Failed to mark event as processing: {}", e);
            return;
        }

        match score_lead_event(&state, lead_id, event).await {
            Ok(total) => {
                tracing::info!("Scored lead_id={} (total={})", lead_id, total);
                if let Err(e) = mark_event_completed(&state.db, lead_id, &updated_at).await {
                    tracing::error!("Failed to mark event as completed: {}", e);
                }
            }
            Err(e) => {
                tracing::error!("Failed to score lead_id={}: {}", lead_id, e);
                if let Err(e) =
                    mark_event_failed(&state.db, lead_id, &updated_at, &e.to_string()).await
                {
                    tracing::error!("Failed to mark event as failed: {}", e);
                }
            }
        }
    });
}

/// Run the scoring workflow for one event. Returns the total score.
async fn score_lead_event(
    state: &Arc<AppState>,
    lead_id: uuid::Uuid,
    event: LeadEvent,
) -> Result<i32, AppError> {
    let storage = ScoreStorage::new(state.db.clone());

    // Prefer the inlined lead; fall back to the stored row.
    let lead = match event.attributes.lead {
        Some(mut lead) => {
            lead.id.get_or_insert(lead_id);
            Some(lead)
        }
        None => storage.fetch_lead(lead_id).await?,
    };

    // Prefer the inlined transcript snapshot; fall back to stored messages.
    let history = if event.attributes.messages.is_empty() {
        Some(storage.fetch_chat_history(lead_id).await?)
    } else {
        Some(
            event
                .attributes
                .messages
                .iter()
                .map(|m| m.to_chat_message())
                .collect(),
        )
    };

    let (score, persistence) = score_and_store_workflow(state, lead, history, None).await;
    tracing::debug!(
        "Lead {} scored: total={}, classification={}, persistence={:?}",
        lead_id,
        score.total,
        score.classification,
        persistence
    );

    Ok(score.total)
}

/// Mark event as processing (scoped by lead_id AND updated_at)
async fn mark_event_processing(
    db: &PgPool,
    lead_id: uuid::Uuid,
    updated_at: &DateTime<Utc>,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE score_events
        SET status = 'processing', updated_at_ts = now()
        WHERE lead_id = $1 AND updated_at = $2 AND status = 'received'
        "#,
    )
    .bind(lead_id)
    .bind(updated_at)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        tracing::warn!(
            "No event found to mark as processing: lead_id={}, updated_at={}",
            lead_id,
            updated_at
        );
    }

    Ok(())
}

/// Mark event as completed (scoped by lead_id AND updated_at)
async fn mark_event_completed(
    db: &PgPool,
    lead_id: uuid::Uuid,
    updated_at: &DateTime<Utc>,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE score_events
        SET status = 'completed', processed_at = now(), updated_at_ts = now()
        WHERE lead_id = $1 AND updated_at = $2 AND status = 'processing'
        "#,
    )
    .bind(lead_id)
    .bind(updated_at)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        tracing::warn!(
            "No event found to mark as completed: lead_id={}, updated_at={}",
            lead_id,
            updated_at
        );
    }

    Ok(())
}

/// Mark event as failed (scoped by lead_id AND updated_at)
async fn mark_event_failed(
    db: &PgPool,
    lead_id: uuid::Uuid,
    updated_at: &DateTime<Utc>,
    error_message: &str,
) -> Result<(), AppError> {
    let result = sqlx::query(
        r#"
        UPDATE score_events
        SET status = 'failed', error_message = $2, updated_at_ts = now()
        WHERE lead_id = $1 AND updated_at = $3 AND status = 'processing'
        "#,
    )
    .bind(lead_id)
    .bind(error_message)
    .bind(updated_at)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        tracing::warn!(
            "No event found to mark as failed: lead_id={}, updated_at={}",
            lead_id,
            updated_at
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("secret", "secret"));
        assert!(!constant_time_compare("secret", "Secret"));
        assert!(!constant_time_compare("secret", "secret2"));
        assert!(!constant_time_compare("", "secret"));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2025-01-01T10:00:00Z").is_ok());
        assert!(parse_timestamp("2025-01-01T10:00:00+02:00").is_ok());
        assert!(parse_timestamp("2025-01-01 10:00:00.123 +0000").is_ok());
        assert!(parse_timestamp("2025-01-01 10:00:00").is_ok());
        assert!(parse_timestamp("next tuesday").is_err());
    }
}
