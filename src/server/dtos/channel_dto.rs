use serde::{Deserialize, Serialize};

use crate::database::playlist::{Playlist, ProviderChannel};
use crate::m3u::StreamKind;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelQuery {
    pub search: Option<String>,
    pub provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelWithProvider {
    pub name: String,
    pub url: String,
    pub logo: Option<String>,
    pub group: Option<String>,
    pub provider_name: String,
    pub playlist_id: String,
    /// playback path hint from the url, the relay re-checks the actual response
    pub kind: StreamKind,
}

impl From<ProviderChannel> for ChannelWithProvider {
    fn from(channel: ProviderChannel) -> Self {
        let kind = StreamKind::from_url(&channel.url);
        Self {
            name: channel.name,
            url: channel.url,
            logo: channel.logo,
            group: channel.group_title,
            provider_name: channel.provider_name,
            playlist_id: channel.playlist_id,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub id: String,
    pub name: String,
    pub channel_count: i64,
}

impl From<Playlist> for ProviderSummary {
    fn from(playlist: Playlist) -> Self {
        Self {
            id: playlist.id,
            name: playlist.provider_name,
            channel_count: playlist.channel_count,
        }
    }
}
