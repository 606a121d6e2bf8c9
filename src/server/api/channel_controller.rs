use axum::{Json, Router, extract::Query, routing::get};

use crate::server::{
    dtos::channel_dto::{ChannelQuery, ChannelWithProvider, ProviderSummary},
    error::AppResult,
    extractors::RequiredAuthentication,
};

pub struct ChannelController;

impl ChannelController {
    /// mounted at the api root, both routes are top level
    pub fn app() -> Router {
        Router::new()
            .route("/channels", get(Self::search))
            .route("/providers", get(Self::providers))
    }

    async fn search(
        RequiredAuthentication(_, services): RequiredAuthentication,
        Query(query): Query<ChannelQuery>,
    ) -> AppResult<Json<Vec<ChannelWithProvider>>> {
        Ok(Json(services.channels.search(&query).await?))
    }

    async fn providers(
        RequiredAuthentication(_, services): RequiredAuthentication,
    ) -> AppResult<Json<Vec<ProviderSummary>>> {
        Ok(Json(services.channels.providers().await?))
    }
}
