use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Create a PostgreSQL connection pool.
///
/// `max_connections` controls the maximum number of connections in the pool.
/// Pass `AppConfig::db_max_connections` for the user-configured value (default 20).
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await?;

    tracing::info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

/// Block until the database answers a ping, retrying once per second.
///
/// The portal database is usually started alongside the API in the same
/// compose stack, so a cold start can race it.
pub async fn wait_for_database(database_url: &str, max_connections: u32) -> PgPool {
    loop {
        match create_pool(database_url, max_connections).await {
            Ok(pool) => return pool,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to connect to PostgreSQL, retrying...");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Round-trip a trivial query through the pool.
pub async fn ping_database(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Ping the database every `interval` for the life of the process, logging
/// each failed round-trip.
pub async fn watch_database(pool: PgPool, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(e) = ping_database(&pool).await {
            tracing::warn!(error = %e, "Database ping failed");
        }
    }
}
