use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use bidmarket_backend::{
    app, auth, config,
    config::StorageBackend,
    db,
    lifecycle::BidLifecycle,
    logging,
    store::{LifecycleStore, MemoryStore, PgStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        storage = ?settings.storage_backend,
        "Starting bidmarket backend"
    );

    let store: Arc<dyn LifecycleStore> = match settings.storage_backend {
        StorageBackend::Postgres => {
            let pool = db::create_pool(&settings).await?;
            Arc::new(PgStore::new(pool, settings.database_statement_timeout_ms))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Shared HTTP client for JWKS fetches
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let jwks_cache = auth::JwksCache::new(
        http_client,
        settings.supabase_jwt_jwks_url.clone(),
        settings.supabase_jwt_issuer.clone(),
        settings.supabase_jwt_audience.clone(),
        settings.jwks_cache_ttl_seconds,
    );

    // Optionally warm the JWKS cache
    if let Err(e) = jwks_cache.warm_cache().await {
        tracing::warn!(error = %e, "Failed to warm JWKS cache - will fetch on first request");
    }

    let state = app::AppState::new(store, settings.clone(), jwks_cache);

    if let Some(every) = settings.sweep_interval() {
        tokio::spawn(run_expiry_sweeper(state.services.bids.clone(), every));
    }

    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically expire open bids whose deadline has passed
async fn run_expiry_sweeper(bids: BidLifecycle, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    tracing::info!(interval_secs = every.as_secs(), "Bid expiry sweeper started");

    loop {
        ticker.tick().await;
        if let Err(e) = bids.sweep_expired(Utc::now()).await {
            tracing::warn!(error = %e, "Bid expiry sweep failed");
        }
    }
}
