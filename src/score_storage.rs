use crate::circuit_breaker::StorageCircuitBreaker;
use crate::errors::{AppError, ResultExt};
use crate::models::{
    ChatMessage, ChatRole, CustomerContext, Lead, LeadScore, PersistOutcome, ScoreRecord,
};
use bigdecimal::{BigDecimal, ToPrimitive};
use failsafe::CircuitBreaker;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Database storage for lead scores and their inputs.
///
/// Score rows are insert-only history: a rescore adds a row, nothing is
/// ever updated in place.
pub struct ScoreStorage {
    pool: PgPool,
}

impl ScoreStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one score row and return its id.
    pub async fn insert_score(
        &self,
        lead_id: Uuid,
        kunde_id: &str,
        score: &LeadScore,
    ) -> Result<Uuid, AppError> {
        let breakdown = serde_json::to_value(score.breakdown)
            .map_err(|e| AppError::InternalError(format!("Failed to serialize breakdown: {}", e)))?;
        let recommendations = serde_json::to_value(&score.recommendations).map_err(|e| {
            AppError::InternalError(format!("Failed to serialize recommendations: {}", e))
        })?;

        let score_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO lead_scores
                (lead_id, kunde_id, total_score, score_breakdown, classification,
                 priority, estimated_value, recommendations, degraded, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
            RETURNING id
            "#,
        )
        .bind(lead_id)
        .bind(kunde_id)
        .bind(score.total)
        .bind(breakdown)
        .bind(score.classification.as_str())
        .bind(score.priority.as_str())
        .bind(BigDecimal::from(score.estimated_value))
        .bind(recommendations)
        .bind(score.degraded)
        .fetch_one(&self.pool)
        .await
        .context("Inserting lead score")?;

        Ok(score_id)
    }

    /// Fire-and-forget persistence: failure is logged and reported as data,
    /// never raised. Consecutive failures trip the circuit breaker so a
    /// struggling database is not hammered by every scoring call.
    pub async fn persist_score(
        &self,
        breaker: &StorageCircuitBreaker,
        lead_id: Uuid,
        kunde_id: &str,
        score: &LeadScore,
    ) -> PersistOutcome {
        if !breaker.is_call_permitted() {
            tracing::warn!("Storage circuit open, dropping score write for lead {}", lead_id);
            return PersistOutcome::Failed {
                reason: "storage circuit breaker open".to_string(),
            };
        }

        let result = self.insert_score(lead_id, kunde_id, score).await;
        // The breaker API is synchronous; feed it the finished result so
        // insert failures are the ones that trip it.
        match breaker.call(|| result) {
            Ok(score_id) => {
                tracing::info!("Stored score for lead {} -> {}", lead_id, score_id);
                PersistOutcome::Stored { score_id }
            }
            Err(failsafe::Error::Inner(e)) => {
                tracing::error!("Failed to store score for lead {}: {}", lead_id, e);
                PersistOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Storage circuit rejected score write for lead {}", lead_id);
                PersistOutcome::Failed {
                    reason: "storage circuit breaker open".to_string(),
                }
            }
        }
    }

    /// Score history for a lead, newest first.
    pub async fn score_history(&self, lead_id: Uuid) -> Result<Vec<ScoreRecord>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT id, lead_id, kunde_id, total_score, score_breakdown, classification,
                   priority, estimated_value, recommendations, degraded, created_at
            FROM lead_scores
            WHERE lead_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await
        .context("Fetching score history")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let estimated_value: BigDecimal = row.try_get("estimated_value")?;
            records.push(ScoreRecord {
                id: row.try_get("id")?,
                lead_id: row.try_get("lead_id")?,
                kunde_id: row.try_get("kunde_id")?,
                total_score: row.try_get("total_score")?,
                score_breakdown: row.try_get("score_breakdown")?,
                classification: row.try_get("classification")?,
                priority: row.try_get("priority")?,
                estimated_value: estimated_value.to_i64().unwrap_or(0),
                recommendations: row.try_get("recommendations")?,
                degraded: row.try_get("degraded")?,
                created_at: row.try_get("created_at")?,
            });
        }

        Ok(records)
    }

    /// Tenant business parameters; a tenant without a row gets the default
    /// context.
    pub async fn fetch_customer_context(
        &self,
        kunde_id: &str,
    ) -> Result<CustomerContext, AppError> {
        let row = sqlx::query(
            r#"
            SELECT average_job_value
            FROM customers
            WHERE kunde_id = $1
            "#,
        )
        .bind(kunde_id)
        .fetch_optional(&self.pool)
        .await
        .context("Fetching customer context")?;

        let average_job_value = row
            .and_then(|r| r.try_get::<Option<BigDecimal>, _>("average_job_value").ok())
            .flatten()
            .and_then(|v| v.to_f64());

        Ok(CustomerContext { average_job_value })
    }

    /// Load one lead for rescoring.
    pub async fn fetch_lead(&self, lead_id: Uuid) -> Result<Option<Lead>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT id, kunde_id, anliegen, fahrzeug, name, telefon, email, created_at
            FROM leads
            WHERE id = $1
            "#,
        )
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await
        .context("Fetching lead")?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(Lead {
            id: row.try_get("id").ok(),
            kunde_id: row.try_get("kunde_id").ok(),
            anliegen: row.try_get("anliegen").ok(),
            fahrzeug: row.try_get("fahrzeug").ok(),
            name: row.try_get("name").ok(),
            telefon: row.try_get("telefon").ok(),
            email: row.try_get("email").ok(),
            created_at: row.try_get("created_at").ok(),
        }))
    }

    /// Load the ordered transcript for a lead, oldest first.
    pub async fn fetch_chat_history(&self, lead_id: Uuid) -> Result<Vec<ChatMessage>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT role, content, created_at
            FROM chat_messages
            WHERE lead_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await
        .context("Fetching chat history")?;

        let messages = rows
            .into_iter()
            .map(|row| {
                let role = match row.try_get::<String, _>("role").as_deref() {
                    Ok("user") => ChatRole::User,
                    Ok("assistant") => ChatRole::Assistant,
                    _ => ChatRole::Other,
                };
                ChatMessage {
                    role,
                    content: row.try_get("content").unwrap_or_default(),
                    timestamp: row.try_get("created_at").ok(),
                }
            })
            .collect();

        Ok(messages)
    }
}
