use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    database::{
        is_unique_violation, now_ms,
        user::{DynUserRepository, User},
    },
    server::{
        dtos::auth_dto::{CredentialsRequest, LoginRequest, TokenResponse, UserResponse},
        error::{AppResult, Error},
        utils::{
            password_utils::{hash_password_blocking, verify_password_blocking},
            token_utils::{Claims, TokenUtil},
        },
    },
};

pub type DynUserService = Arc<dyn UserServiceTrait + Send + Sync>;

#[async_trait]
pub trait UserServiceTrait {
    /// first admin, only while no user exists at all
    async fn setup(&self, request: CredentialsRequest) -> AppResult<TokenResponse>;

    async fn login(&self, request: LoginRequest) -> AppResult<TokenResponse>;

    async fn me(&self, claims: &Claims) -> AppResult<UserResponse>;

    /// admins create plain users, never other admins
    async fn register(&self, request: CredentialsRequest) -> AppResult<UserResponse>;

    async fn list(&self) -> AppResult<Vec<UserResponse>>;

    async fn delete(&self, claims: &Claims, user_id: &str) -> AppResult<()>;
}

pub struct UserService {
    repository: DynUserRepository,
    token_util: Arc<TokenUtil>,
}

impl UserService {
    pub fn new(repository: DynUserRepository, token_util: Arc<TokenUtil>) -> Self {
        Self {
            repository,
            token_util,
        }
    }

    async fn new_user(request: CredentialsRequest, is_admin: bool) -> AppResult<User> {
        Ok(User {
            id: nanoid::nanoid!(),
            username: request.username.trim().to_string(),
            password_hash: hash_password_blocking(request.password).await?,
            is_admin,
            created_at: now_ms(),
        })
    }
}

#[async_trait]
impl UserServiceTrait for UserService {
    async fn setup(&self, request: CredentialsRequest) -> AppResult<TokenResponse> {
        if self.repository.count().await? > 0 {
            return Err(Error::Forbidden(
                "Setup already completed. Contact admin for access.".to_string(),
            ));
        }

        let user = Self::new_user(request, true).await?;

        // lost the race against another setup call
        if !self.repository.create_first(&user).await? {
            return Err(Error::Forbidden(
                "Setup already completed. Contact admin for access.".to_string(),
            ));
        }

        info!("Initial admin {} created", user.username);
        let token = self.token_util.issue(&user.id, &user.username, true)?;
        Ok(TokenResponse::bearer(token, user.into()))
    }

    async fn login(&self, request: LoginRequest) -> AppResult<TokenResponse> {
        let Some(user) = self
            .repository
            .find_by_username(request.username.trim())
            .await?
        else {
            warn!("Login attempt for unknown user {}", request.username);
            return Err(Error::InvalidCredentials);
        };

        if !verify_password_blocking(request.password, user.password_hash.clone()).await {
            warn!("Wrong password for user {}", user.username);
            return Err(Error::InvalidCredentials);
        }

        let token = self
            .token_util
            .issue(&user.id, &user.username, user.is_admin)?;
        Ok(TokenResponse::bearer(token, user.into()))
    }

    async fn me(&self, claims: &Claims) -> AppResult<UserResponse> {
        self.repository
            .get(&claims.sub)
            .await?
            .map(UserResponse::from)
            .ok_or_else(|| Error::NotFound("User not found".to_string()))
    }

    async fn register(&self, request: CredentialsRequest) -> AppResult<UserResponse> {
        if self
            .repository
            .find_by_username(request.username.trim())
            .await?
            .is_some()
        {
            return Err(Error::Conflict("Username already exists".to_string()));
        }

        let user = Self::new_user(request, false).await?;
        // a concurrent register can still win between the lookup and the insert
        self.repository.create(&user).await.map_err(|e| {
            if is_unique_violation(&e) {
                Error::Conflict("Username already exists".to_string())
            } else {
                Error::from(e)
            }
        })?;

        info!("User {} created", user.username);
        Ok(user.into())
    }

    async fn list(&self) -> AppResult<Vec<UserResponse>> {
        Ok(self
            .repository
            .list()
            .await?
            .into_iter()
            .map(UserResponse::from)
            .collect())
    }

    async fn delete(&self, claims: &Claims, user_id: &str) -> AppResult<()> {
        if claims.sub == user_id {
            return Err(Error::BadRequest("Cannot delete yourself".to_string()));
        }

        if !self.repository.delete(user_id).await? {
            return Err(Error::NotFound("User not found".to_string()));
        }

        info!("User {} deleted by {}", user_id, claims.username);
        Ok(())
    }
}
