pub mod auth_dto;
pub mod channel_dto;
pub mod health_dto;
pub mod playlist_dto;

/// unix millis to the RFC 3339 strings the api hands out
pub fn to_rfc3339(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339()
}
