use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use mockall::automock;
use reqwest::header;
use tracing::{debug, error};

pub type DynPlaylistFetcher = Arc<dyn PlaylistFetcher + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Request(String),
    #[error("origin returned status {0}")]
    Status(u16),
    #[error("could not read body: {0}")]
    Body(String),
    #[error("playlist is larger than {0} bytes")]
    TooLarge(usize),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// retrieves raw playlist text, parsing is someone else's problem
#[automock]
#[async_trait]
pub trait PlaylistFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpPlaylistFetcher {
    http: reqwest::Client,
    user_agent: String,
    max_bytes: usize,
}

impl HttpPlaylistFetcher {
    pub fn new(
        timeout: Duration,
        user_agent: String,
        max_bytes: usize,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self {
            http,
            user_agent,
            max_bytes,
        })
    }
}

#[async_trait]
impl PlaylistFetcher for HttpPlaylistFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!("Fetching playlist: {}", url);

        let response = self
            .http
            .get(url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(header::ACCEPT, "*/*")
            .send()
            .await
            .map_err(|e| {
                error!("Playlist request to {} failed: {}", url, e);
                FetchError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            error!("Playlist origin {} returned {}", url, status);
            return Err(FetchError::Status(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            error!("Playlist {} announces more than {} bytes", url, self.max_bytes);
            return Err(FetchError::TooLarge(self.max_bytes));
        }

        let mut bytes: Vec<u8> = Vec::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| match e.is_timeout() {
                true => FetchError::Timeout,
                false => FetchError::Body(e.to_string()),
            })?;
            bytes.extend_from_slice(&chunk);
            if bytes.len() > self.max_bytes {
                error!("Playlist {} exceeds {} bytes", url, self.max_bytes);
                return Err(FetchError::TooLarge(self.max_bytes));
            }
        }

        // playlists in the wild aren't always utf-8, lossy beats rejecting them
        let text = String::from_utf8_lossy(&bytes).into_owned();

        debug!("Fetched playlist {} ({} bytes)", url, text.len());
        Ok(text)
    }
}
