use std::env;
use uuid::Uuid;

use carbot_score_api::db::Database;
use carbot_score_api::models::{Classification, LeadScore, Priority, ScoreBreakdown};
use carbot_score_api::score_storage::ScoreStorage;

/// Integration smoke test for score persistence and history reads.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn insert_and_read_score_smoke_test() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    let storage = ScoreStorage::new(db.pool.clone());

    // lead_scores keeps no FK to leads so history survives lead deletion;
    // a random id is fine for the smoke test.
    let lead_id = Uuid::new_v4();

    let score = LeadScore {
        total: 72,
        breakdown: ScoreBreakdown {
            urgency: 80,
            engagement: 60,
            intent: 75,
            demographics: 65,
            behavior: 70,
        },
        classification: Classification::Warm,
        priority: Priority::Medium,
        estimated_value: 450,
        recommendations: Vec::new(),
        follow_up_suggestions: vec!["Telefonisch nachfassen".to_string()],
        degraded: false,
    };

    let score_id = storage
        .insert_score(lead_id, "werkstatt-smoke", &score)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_ne!(score_id, Uuid::nil());

    let history = storage
        .score_history(lead_id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].total_score, 72);
    assert_eq!(history[0].classification, "Warm");
    assert_eq!(history[0].estimated_value, 450);

    Ok(())
}
