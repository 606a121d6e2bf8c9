use axum::{
    Json, Router,
    extract::{Path, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, put},
};
use validator::Validate;

use crate::server::{
    dtos::{auth_dto::MessageResponse, playlist_dto::{CreatePlaylistRequest, PlaylistResponse}},
    error::AppResult,
    extractors::AdminAuthentication,
};

pub struct PlaylistController;

impl PlaylistController {
    pub fn app() -> Router {
        Router::new()
            .route("/", get(Self::list).post(Self::create))
            .route("/{id}", get(Self::get).delete(Self::delete))
            .route("/{id}/refresh", put(Self::refresh))
    }

    async fn create(
        AdminAuthentication(_, services): AdminAuthentication,
        body: Result<Json<CreatePlaylistRequest>, JsonRejection>,
    ) -> AppResult<(StatusCode, Json<PlaylistResponse>)> {
        let Json(request) = body?;
        request.validate()?;

        let playlist = services.playlists.create(request).await?;
        Ok((StatusCode::CREATED, Json(playlist)))
    }

    async fn list(
        AdminAuthentication(_, services): AdminAuthentication,
    ) -> AppResult<Json<Vec<PlaylistResponse>>> {
        Ok(Json(services.playlists.list().await?))
    }

    async fn get(
        AdminAuthentication(_, services): AdminAuthentication,
        Path(playlist_id): Path<String>,
    ) -> AppResult<Json<PlaylistResponse>> {
        Ok(Json(services.playlists.get(&playlist_id).await?))
    }

    async fn refresh(
        AdminAuthentication(_, services): AdminAuthentication,
        Path(playlist_id): Path<String>,
    ) -> AppResult<Json<PlaylistResponse>> {
        Ok(Json(services.playlists.refresh(&playlist_id).await?))
    }

    async fn delete(
        AdminAuthentication(_, services): AdminAuthentication,
        Path(playlist_id): Path<String>,
    ) -> AppResult<Json<MessageResponse>> {
        services.playlists.delete(&playlist_id).await?;
        Ok(Json(MessageResponse::new("Playlist deleted")))
    }
}
