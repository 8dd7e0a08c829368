mod alert_client;
mod cache_validator;
mod circuit_breaker;
mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod score_storage;
mod scoring;
mod signals;
mod webhook_handler;
mod webhook_models;

use axum::{
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Database connection.
/// - Caches (customer context, lead deduplication).
/// - The storage circuit breaker and the alert client.
/// - HTTP routes and middleware (CORS, Rate Limiting).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carbot_score_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Customer context cache (24 hour TTL)
    // Tenant parameters change rarely; skip a DB roundtrip per scoring call
    let context_cache = Cache::builder()
        .time_to_live(Duration::from_secs(86400))
        .max_capacity(50_000)
        .build();
    tracing::info!("Customer context cache initialized");

    // Lead-level deduplication cache to prevent concurrent duplicate scoring
    // 5 minute TTL is enough to cover typical event processing time
    let processing_leads_cache = Cache::builder()
        .time_to_live(Duration::from_secs(300))
        .max_capacity(10_000)
        .build();
    tracing::info!("Lead deduplication cache initialized");

    // Circuit breaker shared by all score persistence writes
    let storage_breaker = circuit_breaker::create_storage_circuit_breaker();

    // Initialize the hot-lead alert client, if configured
    let alert_client = match config.alert_webhook_url.clone() {
        Some(url) => match alert_client::AlertClient::new(url.clone()) {
            Ok(client) => {
                tracing::info!("Hot lead alert client initialized: {}", url);
                Some(client)
            }
            Err(e) => {
                tracing::error!("Failed to initialize alert client: {}", e);
                None
            }
        },
        None => None,
    };

    // Build application state
    let app_state = Arc::new(handlers::AppState {
        db: db.pool.clone(),
        config: config.clone(),
        alert_client,
        context_cache,
        processing_leads_cache,
        storage_breaker,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        // Scoring endpoints
        .route("/api/v1/leads/score", post(handlers::score_lead))
        .route("/api/v1/leads/score/batch", post(handlers::score_batch))
        .route("/api/v1/leads/:id/rescore", post(handlers::rescore_lead))
        .route("/api/v1/leads/:id/scores", get(handlers::score_history))
        // Lead intake webhook endpoint
        .route("/api/v1/webhooks/leads", post(webhook_handler::lead_webhook))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 5MB max payload (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
