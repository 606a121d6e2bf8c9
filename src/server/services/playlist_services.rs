use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use tracing::{info, warn};

use crate::{
    database::{
        now_ms,
        playlist::{DynPlaylistRepository, Playlist},
    },
    m3u::parse_playlist,
    server::{
        dtos::playlist_dto::{CreatePlaylistRequest, PlaylistResponse},
        error::{AppResult, Error},
        services::fetch_services::DynPlaylistFetcher,
    },
};

pub type DynPlaylistService = Arc<dyn PlaylistServiceTrait + Send + Sync>;

#[automock]
#[async_trait]
pub trait PlaylistServiceTrait {
    /// fetch, parse and store a new provider, nothing is stored when the fetch fails
    async fn create(&self, request: CreatePlaylistRequest) -> AppResult<PlaylistResponse>;

    async fn list(&self) -> AppResult<Vec<PlaylistResponse>>;

    async fn get(&self, playlist_id: &str) -> AppResult<PlaylistResponse>;

    /// refetch the source and swap the whole channel set
    async fn refresh(&self, playlist_id: &str) -> AppResult<PlaylistResponse>;

    async fn delete(&self, playlist_id: &str) -> AppResult<()>;
}

pub struct PlaylistService {
    repository: DynPlaylistRepository,
    fetcher: DynPlaylistFetcher,
}

impl PlaylistService {
    pub fn new(repository: DynPlaylistRepository, fetcher: DynPlaylistFetcher) -> Self {
        Self {
            repository,
            fetcher,
        }
    }

    async fn fetch_channels(&self, url: &str) -> AppResult<Vec<crate::m3u::ParsedChannel>> {
        let text = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|e| Error::FetchFailure(e.to_string()))?;

        let channels = parse_playlist(&text);
        if channels.is_empty() {
            // not an error, the admin sees a zero count and decides
            warn!("Playlist {} parsed to zero channels", url);
        }
        Ok(channels)
    }

    async fn load(&self, playlist: Playlist) -> AppResult<PlaylistResponse> {
        let channels = self.repository.get_channels(&playlist.id).await?;
        Ok(PlaylistResponse::new(playlist, channels))
    }
}

#[async_trait]
impl PlaylistServiceTrait for PlaylistService {
    async fn create(&self, request: CreatePlaylistRequest) -> AppResult<PlaylistResponse> {
        let provider_name = request.provider_name.trim().to_string();
        if provider_name.is_empty() {
            return Err(Error::BadRequest("provider name is required".to_string()));
        }

        if self
            .repository
            .find_by_provider_name(&provider_name)
            .await?
            .is_some()
        {
            return Err(Error::Conflict(
                "Provider with this name already exists".to_string(),
            ));
        }

        let channels = self.fetch_channels(&request.m3u8_url).await?;

        let now = now_ms();
        let playlist = Playlist {
            id: nanoid::nanoid!(),
            provider_name,
            source_url: request.m3u8_url,
            channel_count: channels.len() as i64,
            created_at: now,
            refreshed_at: now,
        };

        self.repository.create(&playlist, &channels).await?;
        info!(
            "Created provider {} ({}) with {} channels",
            playlist.provider_name, playlist.id, playlist.channel_count
        );

        Ok(PlaylistResponse::new(playlist, channels))
    }

    async fn list(&self) -> AppResult<Vec<PlaylistResponse>> {
        let playlists = self.repository.list().await?;

        let mut responses = Vec::with_capacity(playlists.len());
        for playlist in playlists {
            responses.push(self.load(playlist).await?);
        }
        Ok(responses)
    }

    async fn get(&self, playlist_id: &str) -> AppResult<PlaylistResponse> {
        let playlist = self
            .repository
            .get(playlist_id)
            .await?
            .ok_or_else(|| Error::NotFound("Playlist not found".to_string()))?;
        self.load(playlist).await
    }

    async fn refresh(&self, playlist_id: &str) -> AppResult<PlaylistResponse> {
        let playlist = self
            .repository
            .get(playlist_id)
            .await?
            .ok_or_else(|| Error::NotFound("Playlist not found".to_string()))?;

        // a failed fetch leaves the stored channels untouched
        let channels = self.fetch_channels(&playlist.source_url).await?;

        let updated = self
            .repository
            .replace_channels(playlist_id, &channels, now_ms())
            .await?
            // deleted while we were fetching
            .ok_or_else(|| Error::NotFound("Playlist not found".to_string()))?;

        info!(
            "Refreshed provider {} ({}) to {} channels",
            updated.provider_name, updated.id, updated.channel_count
        );

        Ok(PlaylistResponse::new(updated, channels))
    }

    async fn delete(&self, playlist_id: &str) -> AppResult<()> {
        if !self.repository.delete(playlist_id).await? {
            return Err(Error::NotFound("Playlist not found".to_string()));
        }
        info!("Deleted provider {}", playlist_id);
        Ok(())
    }
}
