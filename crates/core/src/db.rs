//! Relational store bring-up: connection pool and migration runner.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::AppResult;

/// Build a connection pool against `database_url`.
///
/// # Errors
/// Returns [`crate::error::AppError::Internal`] if the pool cannot connect.
pub async fn create_pool(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Apply pending migrations from `./migrations`.
///
/// # Errors
/// Returns [`crate::error::AppError::Internal`] if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
