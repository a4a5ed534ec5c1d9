//! PostgreSQL pool and schema

use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Settings;

const APPLICATION_NAME: &str = "bidmarket-backend";

fn connect_options(settings: &Settings) -> Result<PgConnectOptions> {
    let url = settings
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set for the postgres backend")?;

    Ok(PgConnectOptions::from_str(url)
        .context("Invalid DATABASE_URL")?
        .application_name(APPLICATION_NAME))
}

/// Connect and bring the schema up to date before serving
pub async fn create_pool(settings: &Settings) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.database_max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .connect_with(connect_options(settings)?)
        .await
        .context("Failed to connect to PostgreSQL")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!(
        max_connections = settings.database_max_connections,
        "Database ready"
    );
    Ok(pool)
}
