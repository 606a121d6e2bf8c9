use serde::{Deserialize, Serialize};
use validator::Validate;

use super::to_rfc3339;
use crate::database::playlist::Playlist;
use crate::m3u::ParsedChannel;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePlaylistRequest {
    #[validate(length(min = 1, max = 128))]
    pub provider_name: String,
    #[validate(url)]
    pub m3u8_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDto {
    pub name: String,
    pub url: String,
    pub logo: Option<String>,
    pub group: Option<String>,
}

impl From<ParsedChannel> for ChannelDto {
    fn from(channel: ParsedChannel) -> Self {
        Self {
            name: channel.name,
            url: channel.url,
            logo: channel.logo,
            group: channel.group,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistResponse {
    pub id: String,
    pub provider_name: String,
    pub m3u8_url: String,
    pub channels: Vec<ChannelDto>,
    pub channel_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl PlaylistResponse {
    pub fn new(playlist: Playlist, channels: Vec<ParsedChannel>) -> Self {
        Self {
            id: playlist.id,
            provider_name: playlist.provider_name,
            m3u8_url: playlist.source_url,
            channel_count: playlist.channel_count,
            channels: channels.into_iter().map(ChannelDto::from).collect(),
            created_at: to_rfc3339(playlist.created_at),
            updated_at: to_rfc3339(playlist.refreshed_at),
        }
    }
}
