use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::info;

use streamvault::{AppConfig, ApplicationServer, Logger, RedisDatabase, SqliteDatabase};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = Arc::new(AppConfig::parse());

    // guards are kept alive to flush logs and maintain the sentry connection
    let _guards = Logger::init(config.cargo_env, config.sentry_dsn.clone());

    info!("logger and env prepped, connecting to the database...");

    let db = SqliteDatabase::connect(&config.database_url)
        .await
        .context("could not open the database")?;

    if config.run_migrations {
        info!("running migrations...");
        db.migrate().await.context("migrations failed")?;
    }

    let redis_db = match config.redis_url.as_deref() {
        Some(redis_url) => {
            info!("connecting to redis...");
            Some(
                RedisDatabase::connect(redis_url)
                    .await
                    .context("where is the redis connection!!")?,
            )
        }
        None => {
            info!("no redis configured, rate limiting disabled and cookies kept in memory");
            None
        }
    };

    info!("storage ok, starting server...");

    ApplicationServer::serve(config, db, redis_db)
        .await
        .context("server failed to start")?;

    Ok(())
}
