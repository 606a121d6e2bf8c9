pub mod app_services;
pub mod channel_services;
pub mod cookie_services;
pub mod fetch_services;
pub mod playlist_services;
pub mod rate_limit_services;
pub mod user_services;

pub use app_services::AppServices;
pub use channel_services::DynChannelService;
pub use cookie_services::DynCookieService;
pub use fetch_services::DynPlaylistFetcher;
pub use playlist_services::DynPlaylistService;
pub use rate_limit_services::DynRateLimitService;
pub use user_services::DynUserService;
