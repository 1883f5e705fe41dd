use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::Config;
use crate::error::StoreError;

pub type DatabasePool = SqlitePool;

/// Open the pool and bring the schema up to date.
pub async fn new_pool(config: &Config) -> Result<DatabasePool, StoreError> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);

    let pool = if config.is_in_memory() {
        // Idle reaping would drop the only connection and with it the whole database.
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?
    };

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!(url = %config.database_url, "Database ready");

    Ok(pool)
}

/// Shorthand used by tests and the CLI when only a URL is at hand.
pub async fn connect(database_url: &str) -> Result<DatabasePool, StoreError> {
    new_pool(&Config {
        database_url: database_url.to_string(),
        max_connections: 5,
    })
    .await
}
