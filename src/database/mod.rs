pub mod connection;
pub mod playlist;
pub mod user;

pub use connection::{RedisDatabase, SqliteDatabase};

/// unix millis, every timestamp column uses this
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// true when a repository error came from a UNIQUE constraint, so callers can answer 409
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<sqlx::Error>(),
            Some(sqlx::Error::Database(db)) if db.is_unique_violation()
        )
    })
}
