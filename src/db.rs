use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;
use crate::error::{AdvisorError, Result};

/// Open the process-wide Postgres pool.
///
/// A missing connection string is a configuration error; an unreachable
/// server is an upstream error.
pub async fn connect(config: &Config) -> Result<PgPool> {
    let url = config.store.database_url()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.store.max_connections)
        .acquire_timeout(Duration::from_secs(config.store.timeout_secs))
        .connect(&url)
        .await
        .map_err(|e| AdvisorError::upstream("store", format!("failed to connect: {}", e)))?;

    Ok(pool)
}
