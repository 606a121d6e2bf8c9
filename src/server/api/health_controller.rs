use axum::Extension;
use axum::Json;
use axum::http::StatusCode;
use chrono::Utc;
use tracing::error;

use crate::server::dtos::health_dto::{
    DatabaseHealth, HealthResponse, HealthStatus, RedisHealth, ServiceHealthDetails,
};
use crate::server::services::AppServices;
use crate::server::{get_app_version, get_uptime_seconds};

/// sqlite decides healthy or not, a missing redis only degrades rate limiting and cookies
pub async fn health_endpoint(
    Extension(services): Extension<AppServices>,
) -> (StatusCode, Json<HealthResponse>) {
    let db_health = check_database_health(&services).await;
    let redis_health = check_redis_health(&services).await;

    let overall_status = if db_health.status == HealthStatus::Unhealthy {
        HealthStatus::Unhealthy
    } else if redis_health.status == HealthStatus::Unhealthy {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    let response = HealthResponse {
        status: overall_status,
        timestamp: Utc::now(),
        uptime_seconds: get_uptime_seconds(),
        version: get_app_version().to_string(),
        environment: format!("{:?}", services.config.cargo_env).to_lowercase(),
        services: ServiceHealthDetails {
            database: db_health,
            redis: redis_health,
        },
    };

    let http_status = match overall_status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    (http_status, Json(response))
}

async fn check_database_health(services: &AppServices) -> DatabaseHealth {
    match services.db.health_check().await {
        Ok(response_time) => DatabaseHealth {
            status: HealthStatus::Healthy,
            response_time_ms: response_time,
        },
        Err(e) => {
            error!("Database health check failed: {:?}", e);
            DatabaseHealth {
                status: HealthStatus::Unhealthy,
                response_time_ms: 0.0,
            }
        }
    }
}

async fn check_redis_health(services: &AppServices) -> RedisHealth {
    let Some(redis) = services.redis.as_ref() else {
        return RedisHealth {
            status: HealthStatus::Disabled,
            response_time_ms: 0.0,
        };
    };

    match redis.health_check().await {
        Ok(response_time) => RedisHealth {
            status: HealthStatus::Healthy,
            response_time_ms: response_time,
        },
        Err(e) => {
            error!("Redis health check failed: {:?}", e);
            RedisHealth {
                status: HealthStatus::Unhealthy,
                response_time_ms: 0.0,
            }
        }
    }
}
