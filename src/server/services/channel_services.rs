use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    database::playlist::DynPlaylistRepository,
    server::{
        dtos::channel_dto::{ChannelQuery, ChannelWithProvider, ProviderSummary},
        error::AppResult,
    },
};

pub type DynChannelService = Arc<dyn ChannelServiceTrait + Send + Sync>;

#[async_trait]
pub trait ChannelServiceTrait {
    async fn search(&self, query: &ChannelQuery) -> AppResult<Vec<ChannelWithProvider>>;

    async fn providers(&self) -> AppResult<Vec<ProviderSummary>>;
}

pub struct ChannelService {
    repository: DynPlaylistRepository,
}

impl ChannelService {
    pub fn new(repository: DynPlaylistRepository) -> Self {
        Self { repository }
    }
}

fn normalized(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

/// Keeps the channels matching the query, in the order given.
///
/// `search` is a case-insensitive substring of the display name, `provider` a whole
/// provider name ignoring case. Either one empty means no filtering on it. No minimum
/// length and no ranking here, that's the client's business.
pub fn filter_channels(
    channels: Vec<ChannelWithProvider>,
    query: &ChannelQuery,
) -> Vec<ChannelWithProvider> {
    let search = normalized(query.search.as_deref());
    let provider = normalized(query.provider.as_deref());

    channels
        .into_iter()
        .filter(|channel| {
            provider
                .as_ref()
                .is_none_or(|p| channel.provider_name.to_lowercase() == *p)
        })
        .filter(|channel| {
            search
                .as_ref()
                .is_none_or(|s| channel.name.to_lowercase().contains(s.as_str()))
        })
        .collect()
}

#[async_trait]
impl ChannelServiceTrait for ChannelService {
    async fn search(&self, query: &ChannelQuery) -> AppResult<Vec<ChannelWithProvider>> {
        let channels = self
            .repository
            .all_channels()
            .await?
            .into_iter()
            .map(ChannelWithProvider::from)
            .collect();

        let matches = filter_channels(channels, query);
        debug!(
            "Channel query search={:?} provider={:?} matched {}",
            query.search,
            query.provider,
            matches.len()
        );
        Ok(matches)
    }

    async fn providers(&self) -> AppResult<Vec<ProviderSummary>> {
        Ok(self
            .repository
            .list()
            .await?
            .into_iter()
            .map(ProviderSummary::from)
            .collect())
    }
}
