use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use std::sync::Arc;

use crate::m3u::ParsedChannel;

/// One admin-added provider. Channels hang off it and are only ever replaced as a whole.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Playlist {
    pub id: String,
    pub provider_name: String,
    pub source_url: String,
    pub channel_count: i64,
    pub created_at: i64,
    pub refreshed_at: i64,
}

/// a stored channel joined with the provider that owns it
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProviderChannel {
    pub playlist_id: String,
    pub provider_name: String,
    pub name: String,
    pub url: String,
    pub logo: Option<String>,
    pub group_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredChannel {
    pub name: String,
    pub url: String,
    pub logo: Option<String>,
    pub group_title: Option<String>,
}

impl From<StoredChannel> for ParsedChannel {
    fn from(channel: StoredChannel) -> Self {
        Self {
            name: channel.name,
            url: channel.url,
            logo: channel.logo,
            group: channel.group_title,
        }
    }
}

pub type DynPlaylistRepository = Arc<dyn PlaylistRepository + Send + Sync>;

#[automock]
#[async_trait]
pub trait PlaylistRepository {
    /// inserts the playlist row and its channels in one transaction
    async fn create(&self, playlist: &Playlist, channels: &[ParsedChannel]) -> Result<()>;

    /// Swaps the whole channel set of a playlist in one transaction.
    /// Returns `None` when the playlist doesn't exist (nothing is written).
    async fn replace_channels(
        &self,
        playlist_id: &str,
        channels: &[ParsedChannel],
        refreshed_at: i64,
    ) -> Result<Option<Playlist>>;

    async fn get(&self, playlist_id: &str) -> Result<Option<Playlist>>;
    async fn find_by_provider_name(&self, provider_name: &str) -> Result<Option<Playlist>>;

    /// oldest first
    async fn list(&self) -> Result<Vec<Playlist>>;

    async fn get_channels(&self, playlist_id: &str) -> Result<Vec<ParsedChannel>>;

    /// every channel of every provider, grouped by provider (oldest first) then playlist order
    async fn all_channels(&self) -> Result<Vec<ProviderChannel>>;

    /// returns false when nothing was deleted
    async fn delete(&self, playlist_id: &str) -> Result<bool>;
}
