/// Backfill scores for leads that have no score row yet.
///
/// Intended as a one-off maintenance run after enabling the scoring
/// service on an existing tenant: loads unscored leads (oldest first, up
/// to BACKFILL_LIMIT), scores each from its stored transcript, and inserts
/// history rows. One lead's failure never aborts the run.
use carbot_score_api::models::Lead;
use carbot_score_api::score_storage::ScoreStorage;
use carbot_score_api::scoring::{score_lead, DEFAULT_BATCH_LIMIT};
use chrono::Utc;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use sqlx::Row;
use std::env;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let limit: i64 = env::var("BACKFILL_LIMIT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_BATCH_LIMIT as i64);

    tracing::info!("Starting score backfill (limit {})...", limit);

    // Leads without any score row, oldest first
    let rows = sqlx::query(
        r#"
        SELECT l.id
        FROM leads l
        LEFT JOIN lead_scores s ON s.lead_id = l.id
        WHERE s.id IS NULL
        ORDER BY l.created_at ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(&pool)
    .await?;

    let total = rows.len();
    tracing::info!("Found {} unscored lead(s).", total);

    let storage = ScoreStorage::new(pool.clone());
    let mut scored_count = 0;
    let mut degraded_count = 0;
    let mut error_count = 0;

    for (idx, row) in rows.into_iter().enumerate() {
        // Same pacing as the batch endpoint: don't hammer storage
        if idx > 0 && idx % 10 == 0 {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        let lead_id: Uuid = row.try_get("id")?;

        let lead: Option<Lead> = match storage.fetch_lead(lead_id).await {
            Ok(lead) => lead,
            Err(e) => {
                tracing::error!("Failed to load lead {}: {}", lead_id, e);
                error_count += 1;
                continue;
            }
        };

        let history = match storage.fetch_chat_history(lead_id).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!("No transcript for lead {} ({}), scoring without", lead_id, e);
                Vec::new()
            }
        };

        let score = score_lead(lead.as_ref(), Some(&history), None, Utc::now());
        if score.degraded {
            degraded_count += 1;
        }

        let kunde_id = lead
            .as_ref()
            .and_then(|l| l.kunde_id.clone())
            .unwrap_or_default();
        match storage.insert_score(lead_id, &kunde_id, &score).await {
            Ok(score_id) => {
                scored_count += 1;
                tracing::debug!(
                    "Scored lead {} -> {} (total={}, {})",
                    lead_id,
                    score_id,
                    score.total,
                    score.classification
                );
            }
            Err(e) => {
                tracing::error!("Failed to store score for lead {}: {}", lead_id, e);
                error_count += 1;
            }
        }
    }

    tracing::info!(
        "Backfill complete: {}/{} scored ({} degraded, {} errors)",
        scored_count,
        total,
        degraded_count,
        error_count
    );

    Ok(())
}
