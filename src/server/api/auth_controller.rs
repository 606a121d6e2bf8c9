use axum::{
    Extension, Json, Router,
    extract::rejection::JsonRejection,
    http::StatusCode,
    routing::{get, post},
};
use validator::Validate;

use crate::server::{
    dtos::auth_dto::{CredentialsRequest, LoginRequest, TokenResponse, UserResponse},
    error::{AppResult, Error},
    extractors::{AdminAuthentication, ClientId, RequiredAuthentication},
    services::AppServices,
};

pub struct AuthController;

impl AuthController {
    pub fn app() -> Router {
        Router::new()
            .route("/setup", post(Self::setup))
            .route("/login", post(Self::login))
            .route("/me", get(Self::me))
            .route("/register", post(Self::register))
    }

    async fn setup(
        Extension(services): Extension<AppServices>,
        body: Result<Json<CredentialsRequest>, JsonRejection>,
    ) -> AppResult<(StatusCode, Json<TokenResponse>)> {
        let Json(request) = body?;
        request.validate()?;

        let response = services.users.setup(request).await?;
        Ok((StatusCode::CREATED, Json(response)))
    }

    async fn login(
        Extension(services): Extension<AppServices>,
        ClientId(client_id): ClientId,
        body: Result<Json<LoginRequest>, JsonRejection>,
    ) -> AppResult<Json<TokenResponse>> {
        let Json(request) = body?;
        request.validate()?;

        let limiter_key = format!("login:{}", client_id);
        if let Some(retry_after) = services
            .rate_limit
            .is_client_timed_out(&limiter_key)
            .await
            .map(|(_, retry_after)| retry_after)
        {
            return Err(Error::RateLimited { retry_after });
        }

        match services.users.login(request).await {
            Ok(response) => {
                services.rate_limit.clear_errors(&limiter_key).await;
                Ok(Json(response))
            }
            Err(Error::InvalidCredentials) => {
                services
                    .rate_limit
                    .record_error(&limiter_key, "invalid_credentials")
                    .await;
                Err(Error::InvalidCredentials)
            }
            Err(e) => Err(e),
        }
    }

    async fn me(
        RequiredAuthentication(claims, services): RequiredAuthentication,
    ) -> AppResult<Json<UserResponse>> {
        Ok(Json(services.users.me(&claims).await?))
    }

    async fn register(
        AdminAuthentication(_, services): AdminAuthentication,
        body: Result<Json<CredentialsRequest>, JsonRejection>,
    ) -> AppResult<(StatusCode, Json<UserResponse>)> {
        let Json(request) = body?;
        request.validate()?;

        let user = services.users.register(request).await?;
        Ok((StatusCode::CREATED, Json(user)))
    }
}
