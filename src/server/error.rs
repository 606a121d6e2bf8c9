use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

pub type AppResult<T> = Result<T, Error>;

/// hint attached to relay failures, the browser can't play it but a desktop player often can
pub const EXTERNAL_PLAYER_HINT: &str =
    "Playback through the browser failed. Copy the stream URL into an external player such as VLC.";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("authentication is required to access this resource")]
    Unauthorized,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token expired")]
    TokenExpired,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("failed to fetch playlist: {0}")]
    FetchFailure(String),
    #[error("stream relay failed: {0}")]
    ProxyFailure(String),
    #[error("too many requests, retry in {retry_after} seconds")]
    RateLimited { retry_after: u64 },
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    AxumJsonRejection(#[from] JsonRejection),
    #[error("an unexpected error occurred")]
    AnyhowError(#[from] anyhow::Error),
    #[error("an unexpected error occurred")]
    InternalServerError,
    #[error("{0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::InvalidCredentials | Self::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::ValidationError(_) | Self::AxumJsonRejection(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::FetchFailure(_) | Self::ProxyFailure(_) => StatusCode::BAD_GATEWAY,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::AnyhowError(_)
            | Self::InternalServerError
            | Self::InternalServerErrorWithContext(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            // anyhow carries the real cause, the client only sees the generic message
            match &self {
                Self::AnyhowError(e) => error!("request failed: {:?}", e),
                other => error!("request failed: {}", other),
            }
        }

        let body = match &self {
            Self::ValidationError(errors) => json!({
                "error": "validation failed",
                "fields": errors.field_errors().keys().collect::<Vec<_>>(),
            }),
            Self::ProxyFailure(reason) => json!({
                "error": format!("stream relay failed: {}", reason),
                "hint": EXTERNAL_PLAYER_HINT,
            }),
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited { retry_after } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}
