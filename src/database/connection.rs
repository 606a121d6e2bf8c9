use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::Context;
use redis::aio::MultiplexedConnection;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::info;

const DEFAULT_POOL_SIZE: u32 = 10;
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pub pool: SqlitePool,
}

impl SqliteDatabase {
    pub async fn connect(connection_string: &str) -> anyhow::Result<Self> {
        let in_memory = connection_string.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(connection_string)
            .context("Invalid sqlite connection string")?
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // every in-memory connection is its own database, so keep exactly one alive forever
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(DEFAULT_POOL_SIZE)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to connect to sqlite database")?;

        info!("Sqlite connection established (in memory: {})", in_memory);

        Ok(Self { pool })
    }

    /// fresh migrated database, used by tests
    pub async fn in_memory() -> anyhow::Result<Self> {
        let db = Self::connect("sqlite::memory:").await?;
        db.migrate().await?;
        Ok(db)
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;
        Ok(())
    }

    pub async fn health_check(&self) -> anyhow::Result<f64> {
        let start = Instant::now();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Sqlite health check failed")?;

        Ok(start.elapsed().as_secs_f64() * 1000.0) // milliseconds
    }
}

/// optional, backs the rate limiter and the origin cookie jar
#[derive(Debug, Clone)]
pub struct RedisDatabase {
    pub connection: MultiplexedConnection,
}

impl RedisDatabase {
    pub async fn connect(connection_string: &str) -> anyhow::Result<Self> {
        let client =
            redis::Client::open(connection_string).context("Failed to create Redis client")?;

        let connection = client
            .get_multiplexed_tokio_connection()
            .await
            .context("Failed to connect to Redis database")?;

        info!("Redis connection established");

        Ok(Self { connection })
    }

    pub async fn health_check(&self) -> anyhow::Result<f64> {
        let start = Instant::now();

        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;

        Ok(start.elapsed().as_secs_f64() * 1000.0)
    }
}
