use axum::{
    Json, Router,
    extract::Path,
    routing::{delete, get},
};

use crate::server::{
    dtos::auth_dto::{MessageResponse, UserResponse},
    error::AppResult,
    extractors::AdminAuthentication,
};

pub struct UserController;

impl UserController {
    pub fn app() -> Router {
        Router::new()
            .route("/", get(Self::list))
            .route("/{id}", delete(Self::delete))
    }

    async fn list(
        AdminAuthentication(_, services): AdminAuthentication,
    ) -> AppResult<Json<Vec<UserResponse>>> {
        Ok(Json(services.users.list().await?))
    }

    async fn delete(
        AdminAuthentication(claims, services): AdminAuthentication,
        Path(user_id): Path<String>,
    ) -> AppResult<Json<MessageResponse>> {
        services.users.delete(&claims, &user_id).await?;
        Ok(Json(MessageResponse::new("User deleted")))
    }
}
