use std::sync::Arc;

use redis::AsyncCommands;
use tracing::{debug, error, info, warn};

use crate::database::RedisDatabase;

#[derive(Clone)]
pub struct RateLimitConfig {
    /// maximum requests per window, segment fetches count too so keep it generous
    pub max_requests_per_window: u32,
    /// window duration in seconds for rate limiting
    pub window_seconds: u64,
    /// failures (bad logins, dead origins) before a client gets timed out
    pub max_errors_before_timeout: u32,
    /// error tracking window in seconds
    pub error_window_seconds: u64,
    /// timeout duration in seconds when error threshold is exceeded
    pub timeout_duration_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: 600,
            window_seconds: 60,
            max_errors_before_timeout: 20,
            error_window_seconds: 600,
            timeout_duration_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed { remaining: u32 },
    RateLimited { retry_after: u64 },
    TimedOut { reason: String, retry_after: u64 },
}

impl RateLimitResult {
    /// seconds to wait, `None` when the request may go ahead
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Allowed { .. } => None,
            Self::RateLimited { retry_after } | Self::TimedOut { retry_after, .. } => {
                Some(*retry_after)
            }
        }
    }
}

pub type DynRateLimitService = Arc<dyn RateLimitServiceTrait + Send + Sync>;

#[async_trait::async_trait]
pub trait RateLimitServiceTrait {
    async fn check_rate_limit(&self, client_id: &str) -> RateLimitResult;

    /// record a failure (bad login, dead origin) against a client
    async fn record_error(&self, client_id: &str, error_type: &str);

    async fn is_client_timed_out(&self, client_id: &str) -> Option<(String, u64)>;

    async fn timeout_client(&self, client_id: &str, reason: &str, duration_seconds: u64);

    /// forget recorded failures, e.g. after a successful login
    async fn clear_errors(&self, client_id: &str);
}

/// Redis counters per client id. Redis errors fail open, a flaky cache shouldn't lock
/// everyone out of their channels.
pub struct RedisRateLimitService {
    redis: Arc<RedisDatabase>,
    config: RateLimitConfig,
}

impl RedisRateLimitService {
    pub fn new(redis: Arc<RedisDatabase>) -> Self {
        Self {
            redis,
            config: RateLimitConfig::default(),
        }
    }

    fn rate_limit_key(&self, client_id: &str) -> String {
        format!("sv_rate_limit:{}", client_id)
    }

    fn error_count_key(&self, client_id: &str) -> String {
        format!("sv_error_count:{}", client_id)
    }

    fn timeout_key(&self, client_id: &str) -> String {
        format!("sv_timeout:{}", client_id)
    }
}

#[async_trait::async_trait]
impl RateLimitServiceTrait for RedisRateLimitService {
    async fn check_rate_limit(&self, client_id: &str) -> RateLimitResult {
        if let Some((reason, retry_after)) = self.is_client_timed_out(client_id).await {
            return RateLimitResult::TimedOut {
                reason,
                retry_after,
            };
        }

        let key = self.rate_limit_key(client_id);
        let mut conn = self.redis.connection.clone();

        let result: Result<(u32, i32, i64), redis::RedisError> = redis::pipe()
            .atomic()
            .incr(&key, 1u32)
            .expire(&key, self.config.window_seconds as i64)
            .ttl(&key)
            .query_async(&mut conn)
            .await;

        match result {
            Ok((count, _expire_result, ttl)) => {
                if count > self.config.max_requests_per_window {
                    debug!(
                        "Client {} rate limited: {} requests in window",
                        client_id, count
                    );
                    RateLimitResult::RateLimited {
                        retry_after: ttl.max(1) as u64,
                    }
                } else {
                    RateLimitResult::Allowed {
                        remaining: self.config.max_requests_per_window.saturating_sub(count),
                    }
                }
            }
            Err(e) => {
                error!("Rate limit check failed for client {}: {}", client_id, e);
                RateLimitResult::Allowed { remaining: 0 }
            }
        }
    }

    async fn record_error(&self, client_id: &str, error_type: &str) {
        let key = self.error_count_key(client_id);
        let mut conn = self.redis.connection.clone();

        let result: Result<(u32, i32), redis::RedisError> = redis::pipe()
            .atomic()
            .incr(&key, 1u32)
            .expire(&key, self.config.error_window_seconds as i64)
            .query_async(&mut conn)
            .await;

        match result {
            Ok((count, _expire_result)) => {
                debug!(
                    "Client {} error recorded ({}): count now {}",
                    client_id, error_type, count
                );

                if count >= self.config.max_errors_before_timeout {
                    warn!(
                        "Client {} exceeded error threshold ({} errors), applying timeout",
                        client_id, count
                    );
                    self.timeout_client(
                        client_id,
                        &format!(
                            "Automatic timeout: {} errors in {} seconds",
                            count, self.config.error_window_seconds
                        ),
                        self.config.timeout_duration_seconds,
                    )
                    .await;
                }
            }
            Err(e) => {
                error!("Failed to record error for client {}: {}", client_id, e);
            }
        }
    }

    async fn is_client_timed_out(&self, client_id: &str) -> Option<(String, u64)> {
        let key = self.timeout_key(client_id);
        let mut conn = self.redis.connection.clone();

        let result: Result<(Option<String>, i64), redis::RedisError> = redis::pipe()
            .get(&key)
            .ttl(&key)
            .query_async(&mut conn)
            .await;

        match result {
            Ok((Some(reason), ttl)) if ttl > 0 => Some((reason, ttl as u64)),
            Ok(_) => None,
            Err(e) => {
                error!("Failed to check timeout for client {}: {}", client_id, e);
                None
            }
        }
    }

    async fn timeout_client(&self, client_id: &str, reason: &str, duration_seconds: u64) {
        let key = self.timeout_key(client_id);
        let mut conn = self.redis.connection.clone();

        let result: Result<(), redis::RedisError> =
            conn.set_ex(&key, reason, duration_seconds).await;

        match result {
            Ok(_) => info!(
                "Client {} timed out for {} seconds: {}",
                client_id, duration_seconds, reason
            ),
            Err(e) => error!("Failed to timeout client {}: {}", client_id, e),
        }
    }

    async fn clear_errors(&self, client_id: &str) {
        let key = self.error_count_key(client_id);
        let mut conn = self.redis.connection.clone();

        let result: Result<i32, redis::RedisError> = conn.del(&key).await;
        if let Err(e) = result {
            error!("Failed to clear errors for client {}: {}", client_id, e);
        }
    }
}

/// used when no redis is configured, everything is allowed
pub struct DisabledRateLimitService;

#[async_trait::async_trait]
impl RateLimitServiceTrait for DisabledRateLimitService {
    async fn check_rate_limit(&self, _client_id: &str) -> RateLimitResult {
        RateLimitResult::Allowed {
            remaining: u32::MAX,
        }
    }

    async fn record_error(&self, _client_id: &str, _error_type: &str) {}

    async fn is_client_timed_out(&self, _client_id: &str) -> Option<(String, u64)> {
        None
    }

    async fn timeout_client(&self, _client_id: &str, _reason: &str, _duration_seconds: u64) {}

    async fn clear_errors(&self, _client_id: &str) {}
}
