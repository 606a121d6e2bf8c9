pub mod api;
pub mod dtos;
pub mod error;
pub mod extractors;
pub mod services;
pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{Extension, Router, ServiceExt, extract::Request, http::HeaderValue};
use once_cell::sync::Lazy;
use tokio::net::TcpListener;
use tower::Layer;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    normalize_path::NormalizePathLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    database::{RedisDatabase, SqliteDatabase},
};
use api::proxy_controller::ProxyController;
use services::AppServices;

static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub fn get_uptime_seconds() -> u64 {
    START_TIME.elapsed().as_secs()
}

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub struct ApplicationServer;

impl ApplicationServer {
    pub async fn serve(
        config: Arc<AppConfig>,
        db: SqliteDatabase,
        redis_db: Option<RedisDatabase>,
    ) -> anyhow::Result<()> {
        Lazy::force(&START_TIME);

        let services = AppServices::new(db, redis_db, config.clone())?;

        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("could not bind {}", addr))?;

        info!("routes initialized, listening on port {}", config.port);

        Self::run(listener, services).await
    }

    /// Serves on an already bound listener until ctrl-c. Trailing slashes are trimmed
    /// before routing, so `/api/` and `/api` are the same route.
    pub async fn run(listener: TcpListener, services: AppServices) -> anyhow::Result<()> {
        let app = NormalizePathLayer::trim_trailing_slash().layer(Self::router(services));

        axum::serve(
            listener,
            ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("error while starting API server")?;

        Ok(())
    }

    pub fn router(services: AppServices) -> Router {
        let cors = Self::cors_layer(&services.config.cors_origin);

        Router::new()
            .nest("/api", api::app())
            .layer(cors)
            .nest("/api/proxy", ProxyController::app())
            .layer(TraceLayer::new_for_http())
            .layer(Extension(services))
    }

    fn cors_layer(cors_origin: &str) -> CorsLayer {
        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

        if cors_origin.trim() == "*" {
            return layer.allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = cors_origin
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("ignoring invalid cors origin {}", origin);
                    None
                }
            })
            .collect();

        layer.allow_origin(AllowOrigin::list(origins))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutting down...");
}
