//! Postgres connection pool construction (spec §4.4 "Connection management",
//! §5 "bounded, configurable min/max").

use crate::utils::error::AppError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

pub async fn create_pool(database_url: &str, pool_size: u32, statement_timeout_secs: u64) -> Result<PgPool, AppError> {
    PgPoolOptions::new()
        .max_connections(pool_size)
        .acquire_timeout(Duration::from_secs(statement_timeout_secs.max(1)))
        .connect(database_url)
        .await
        .map_err(AppError::from)
}
