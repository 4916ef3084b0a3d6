pub mod error;
pub mod withdrawal_repository;

pub use error::{DatabaseError, DatabaseErrorKind, DbResult};
pub use withdrawal_repository::{WithdrawalRepository, WithdrawalStore};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

// ---------------------------------------------------------------------------
// Pool Initialization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
        }
    }
}

pub async fn init_pool(database_url: &str, config: Option<PoolConfig>) -> DbResult<PgPool> {
    let config = config.unwrap_or_default();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(database_url)
        .await
        .map_err(DatabaseError::from_sqlx)?;

    info!(
        max_connections = config.max_connections,
        "database pool initialized"
    );
    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> DbResult<()> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Schema Bootstrap
// ---------------------------------------------------------------------------

/// Creates the withdrawal table and its unique business-id index when absent.
/// Runs at startup so a fresh database is usable without a migration step.
pub async fn ensure_schema(pool: &PgPool) -> DbResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS withdraw_requests (
            id BIGSERIAL PRIMARY KEY,
            withdraw_request_id TEXT NOT NULL,
            beneficiary_name TEXT NOT NULL DEFAULT '',
            account_number TEXT NOT NULL DEFAULT '',
            ifsc_code TEXT NOT NULL DEFAULT '',
            amount DOUBLE PRECISION NOT NULL DEFAULT 0,
            status SMALLINT NOT NULL DEFAULT 0,
            order_id TEXT NOT NULL DEFAULT '',
            payment_method TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .map_err(DatabaseError::from_sqlx)?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_withdraw_requests_business_id
         ON withdraw_requests (withdraw_request_id)",
    )
    .execute(pool)
    .await
    .map_err(DatabaseError::from_sqlx)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
    }

    #[tokio::test]
    #[ignore] // Requires database running
    async fn test_init_pool_and_schema() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set");
        let pool = init_pool(&url, None).await.expect("pool init failed");
        ensure_schema(&pool).await.expect("schema bootstrap failed");
        health_check(&pool).await.expect("health check failed");
    }
}
