use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::{
    config::AppConfig,
    database::{
        RedisDatabase, SqliteDatabase, playlist::SqlxPlaylistRepository, user::SqlxUserRepository,
    },
    server::utils::{signature_utils::SignatureUtil, token_utils::TokenUtil},
};

use super::{
    channel_services::{ChannelService, DynChannelService},
    cookie_services::{DynCookieService, MemoryCookieService, RedisCookieService},
    fetch_services::{DynPlaylistFetcher, HttpPlaylistFetcher},
    playlist_services::{DynPlaylistService, PlaylistService},
    rate_limit_services::{DisabledRateLimitService, DynRateLimitService, RedisRateLimitService},
    user_services::{DynUserService, UserService},
};

/// everything a handler can reach, cloned into each request through an `Extension`
#[derive(Clone)]
pub struct AppServices {
    pub signature_util: Arc<SignatureUtil>,
    pub token_util: Arc<TokenUtil>,
    pub users: DynUserService,
    pub playlists: DynPlaylistService,
    pub channels: DynChannelService,
    pub rate_limit: DynRateLimitService,
    pub cookies: DynCookieService,
    /// relay client, only connect and read timeouts so long live streams aren't cut off
    pub http: reqwest::Client,
    pub db: SqliteDatabase,
    pub redis: Option<Arc<RedisDatabase>>,
    pub config: Arc<AppConfig>,
}

impl AppServices {
    pub fn new(
        db: SqliteDatabase,
        redis_db: Option<RedisDatabase>,
        config: Arc<AppConfig>,
    ) -> anyhow::Result<Self> {
        info!("starting services...");

        let signature_util = Arc::new(SignatureUtil::new(config.access_token_secret.clone()));
        let token_util = Arc::new(TokenUtil::new(
            &config.access_token_secret,
            config.token_ttl_hours,
        ));

        let user_repository = Arc::new(SqlxUserRepository::new(db.pool.clone()));
        let playlist_repository = Arc::new(SqlxPlaylistRepository::new(db.pool.clone()));

        let fetcher = Arc::new(
            HttpPlaylistFetcher::new(
                config.upstream_timeout(),
                config.upstream_user_agent.clone(),
                config.max_playlist_bytes,
            )
            .context("could not build the playlist http client")?,
        ) as DynPlaylistFetcher;

        let users = Arc::new(UserService::new(user_repository, token_util.clone()))
            as DynUserService;
        let playlists = Arc::new(PlaylistService::new(playlist_repository.clone(), fetcher))
            as DynPlaylistService;
        let channels = Arc::new(ChannelService::new(playlist_repository)) as DynChannelService;

        info!("storage services ok, starting relay services...");

        let redis = redis_db.map(Arc::new);
        let (rate_limit, cookies) = match &redis {
            Some(redis) => (
                Arc::new(RedisRateLimitService::new(redis.clone())) as DynRateLimitService,
                Arc::new(RedisCookieService::new(redis.clone())) as DynCookieService,
            ),
            None => (
                Arc::new(DisabledRateLimitService) as DynRateLimitService,
                Arc::new(MemoryCookieService::new()) as DynCookieService,
            ),
        };

        let http = reqwest::Client::builder()
            .connect_timeout(config.upstream_timeout())
            .read_timeout(config.upstream_timeout())
            .build()
            .context("could not build the relay http client")?;

        Ok(Self {
            signature_util,
            token_util,
            users,
            playlists,
            channels,
            rate_limit,
            cookies,
            http,
            db,
            redis,
            config,
        })
    }
}
