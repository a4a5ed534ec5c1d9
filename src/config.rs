use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

use crate::lifecycle::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }
}

/// Where lifecycle entities are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl StorageBackend {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => bail!("Unknown STORAGE_BACKEND '{other}' (expected postgres or memory)"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Storage
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub database_statement_timeout_ms: u64,

    // CORS
    pub cors_allow_origins: Vec<String>,

    // Supabase Auth
    pub supabase_jwt_jwks_url: String,
    pub supabase_jwt_issuer: String,
    pub supabase_jwt_audience: String,
    pub jwks_cache_ttl_seconds: u64,

    // Optimistic concurrency
    pub occ_max_attempts: u32,
    pub occ_max_elapsed_ms: u64,

    // Background expiry sweep; 0 disables it
    pub bid_expiry_sweep_seconds: u64,
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Storage
        let storage_backend =
            StorageBackend::parse(&env::var("STORAGE_BACKEND").unwrap_or_else(|_| "postgres".to_string()))?;
        let database_url = match storage_backend {
            StorageBackend::Postgres => {
                Some(env::var("DATABASE_URL").context("DATABASE_URL must be set")?)
            }
            StorageBackend::Memory => env::var("DATABASE_URL").ok(),
        };
        let database_max_connections = parsed_or("DATABASE_MAX_CONNECTIONS", 10);
        let database_statement_timeout_ms = parsed_or("DATABASE_STATEMENT_TIMEOUT_MS", 5000);

        // CORS
        let cors_allow_origins = env::var("CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        // Supabase Auth
        let supabase_jwt_jwks_url =
            env::var("SUPABASE_JWT_JWKS_URL").context("SUPABASE_JWT_JWKS_URL must be set")?;
        let supabase_jwt_issuer =
            env::var("SUPABASE_JWT_ISSUER").context("SUPABASE_JWT_ISSUER must be set")?;
        let supabase_jwt_audience =
            env::var("SUPABASE_JWT_AUDIENCE").unwrap_or_else(|_| "authenticated".to_string());
        let jwks_cache_ttl_seconds = parsed_or("JWKS_CACHE_TTL_SECONDS", 1800); // 30 minutes

        let occ_max_attempts = parsed_or("OCC_MAX_ATTEMPTS", 5);
        let occ_max_elapsed_ms = parsed_or("OCC_MAX_ELAPSED_MS", 2000);
        let bid_expiry_sweep_seconds = parsed_or("BID_EXPIRY_SWEEP_SECONDS", 60);

        Ok(Settings {
            env,
            server_addr,
            storage_backend,
            database_url,
            database_max_connections,
            database_statement_timeout_ms,
            cors_allow_origins,
            supabase_jwt_jwks_url,
            supabase_jwt_issuer,
            supabase_jwt_audience,
            jwks_cache_ttl_seconds,
            occ_max_attempts,
            occ_max_elapsed_ms,
            bid_expiry_sweep_seconds,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.occ_max_attempts,
            Duration::from_millis(self.occ_max_elapsed_ms),
        )
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.bid_expiry_sweep_seconds > 0).then(|| Duration::from_secs(self.bid_expiry_sweep_seconds))
    }

    /// Settings for tests and local tooling; no environment is read
    pub fn for_memory() -> Self {
        Self {
            env: Environment::Dev,
            server_addr: "127.0.0.1:0".to_string(),
            storage_backend: StorageBackend::Memory,
            database_url: None,
            database_max_connections: 1,
            database_statement_timeout_ms: 5000,
            cors_allow_origins: vec!["http://localhost:3000".to_string()],
            supabase_jwt_jwks_url: "http://localhost:54321/auth/v1/.well-known/jwks.json"
                .to_string(),
            supabase_jwt_issuer: "http://localhost:54321/auth/v1".to_string(),
            supabase_jwt_audience: "authenticated".to_string(),
            jwks_cache_ttl_seconds: 1800,
            occ_max_attempts: 5,
            occ_max_elapsed_ms: 2000,
            bid_expiry_sweep_seconds: 0,
        }
    }
}
