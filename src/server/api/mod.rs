pub mod auth_controller;
pub mod channel_controller;
pub mod health_controller;
pub mod playlist_controller;
pub mod proxy_controller;
pub mod user_controller;

use axum::{Router, routing::get};

use auth_controller::AuthController;
use channel_controller::ChannelController;
use health_controller::health_endpoint;
use playlist_controller::PlaylistController;
use user_controller::UserController;

/// everything except the relay, which answers its own preflights
pub fn app() -> Router {
    Router::new()
        .route("/", get(|| async { "StreamVault API" }))
        .route("/health", get(health_endpoint))
        .nest("/auth", AuthController::app())
        .nest("/users", UserController::app())
        .nest("/playlists", PlaylistController::app())
        .merge(ChannelController::app())
}
