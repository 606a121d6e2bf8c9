#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser, Debug, Clone)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // sqlite is the default store, mode=rwc creates the file on first boot
    #[clap(long, env, default_value = "sqlite://streamvault.db?mode=rwc")]
    pub database_url: String,

    // option to run migrations on each startup
    #[clap(long, env, default_value_t = true, action = clap::ArgAction::Set)]
    pub run_migrations: bool,

    // redis is optional, without it there is no rate limiting and origin cookies live in memory
    #[clap(long, env)]
    pub redis_url: Option<String>,

    // signs session tokens and proxy links, have it be anything secure
    // like 'openssl rand -base64 32'
    #[clap(long, env)]
    pub access_token_secret: String,

    // how long a login stays valid
    #[clap(long, env, default_value = "24")]
    pub token_ttl_hours: i64,

    // how long a rewritten manifest line stays playable
    #[clap(long, env, default_value = "12")]
    pub signed_link_ttl_hours: i64,

    // this should be either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // absolute base used for rewritten manifest lines, e.g. https://tv.example.com
    // relative /api/proxy links are written when this is missing
    #[clap(long, env)]
    pub public_url: Option<String>,

    // one upstream attempt per request, bounded by this
    #[clap(long, env, default_value = "30")]
    pub upstream_timeout_secs: u64,

    #[clap(
        long,
        env,
        default_value = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
    )]
    pub upstream_user_agent: String,

    // manifests are buffered for rewriting, anything bigger is refused
    #[clap(long, env, default_value = "8388608")]
    pub max_manifest_bytes: usize,

    // playlists are read whole before parsing, bigger bodies are rejected
    #[clap(long, env, default_value = "67108864")]
    pub max_playlist_bytes: usize,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    pub fn upstream_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.upstream_timeout_secs)
    }
}

impl Default for AppConfig {
    // used by tests and as a bad fallback
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            database_url: "sqlite::memory:".to_string(),
            run_migrations: true,
            redis_url: None,
            access_token_secret: "default-access-secret".to_string(),
            token_ttl_hours: 24,
            signed_link_ttl_hours: 12,
            cors_origin: "*".to_string(),
            public_url: None,
            upstream_timeout_secs: 30,
            upstream_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            max_manifest_bytes: 8 * 1024 * 1024,
            max_playlist_bytes: 64 * 1024 * 1024,
            sentry_dsn: None,
        }
    }
}
