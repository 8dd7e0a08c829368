use sqlx::{postgres::PgPoolOptions, PgPool};

/// Postgres pool shared by handlers, the webhook worker, and the
/// maintenance binaries.
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        // Fail at startup, not on the first scoring request
        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }
}
