use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Shared secret for the lead intake webhook. Validation is skipped
    /// when unset (local development).
    pub webhook_secret: Option<String>,
    /// Workshop endpoint notified about hot leads. Alerts are disabled
    /// when unset.
    pub alert_webhook_url: Option<String>,
    /// Fallback average job value when a tenant has no context row.
    pub default_job_value: f64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL")
                .or_else(|_| std::env::var("DB_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            webhook_secret: std::env::var("WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            alert_webhook_url: std::env::var("ALERT_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|url| {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("ALERT_WEBHOOK_URL must start with http:// or https://");
                    }
                    Ok(url)
                })
                .transpose()?,
            default_job_value: std::env::var("DEFAULT_JOB_VALUE")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DEFAULT_JOB_VALUE must be a number"))
                .and_then(|v: f64| {
                    if v <= 0.0 {
                        anyhow::bail!("DEFAULT_JOB_VALUE must be positive");
                    }
                    Ok(v)
                })?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Server Port: {}", config.port);
        if config.webhook_secret.is_none() {
            tracing::warn!("WEBHOOK_SECRET not set, intake webhook accepts unauthenticated calls");
        }
        if let Some(ref url) = config.alert_webhook_url {
            tracing::info!("Hot lead alerts configured: {}", url);
        }
        tracing::debug!("Default job value: {}", config.default_job_value);

        Ok(config)
    }
}
