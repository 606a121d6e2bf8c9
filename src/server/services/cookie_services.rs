use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use redis::AsyncCommands;
use tracing::{debug, error};

use crate::database::RedisDatabase;

/// ttl of 24hrs
const COOKIE_TTL_SECONDS: u64 = 86400;

/// hosts the in-memory jar remembers at once
const MEMORY_JAR_MAX_HOSTS: usize = 1024;

pub type DynCookieService = Arc<dyn CookieServiceTrait + Send + Sync>;

/// Cookie jar per origin host. Some IPTV origins hand out a session cookie on the
/// manifest and expect it back on every segment, the browser can't do that for them.
#[async_trait::async_trait]
pub trait CookieServiceTrait {
    /// value for a `Cookie` request header
    async fn get_cookies(&self, domain: &str) -> Option<String>;

    /// merge raw `Set-Cookie` values into the jar
    async fn store_cookies(&self, domain: &str, set_cookies: &[String]);
}

pub fn extract_domain(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}

/// Merges `Set-Cookie` values into an existing `Cookie` header value. Newer values
/// replace older ones by name, first-seen order is kept.
pub fn merge_cookies(existing: Option<&str>, set_cookies: &[String]) -> String {
    let mut jar: Vec<(String, String)> = Vec::new();

    let mut upsert = |pair: &str| {
        let Some((name, _)) = pair.split_once('=') else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        match jar.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = pair.trim().to_string(),
            None => jar.push((name.to_string(), pair.trim().to_string())),
        }
    };

    if let Some(existing) = existing {
        existing.split("; ").for_each(&mut upsert);
    }

    // Set-Cookie format: name=value; attr1; attr2... only the name=value part is kept
    for cookie in set_cookies {
        if let Some(pair) = cookie.split(';').next() {
            upsert(pair);
        }
    }

    jar.into_iter()
        .map(|(_, pair)| pair)
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct RedisCookieService {
    redis: Arc<RedisDatabase>,
}

impl RedisCookieService {
    pub fn new(redis: Arc<RedisDatabase>) -> Self {
        Self { redis }
    }

    fn cookie_key(&self, domain: &str) -> String {
        format!("sv_origin_cookies:{}", domain)
    }
}

#[async_trait::async_trait]
impl CookieServiceTrait for RedisCookieService {
    async fn get_cookies(&self, domain: &str) -> Option<String> {
        let key = self.cookie_key(domain);
        let mut conn = self.redis.connection.clone();

        let result: Result<Option<String>, redis::RedisError> = conn.get(&key).await;

        match result {
            Ok(cookies) => cookies,
            Err(e) => {
                error!("Failed to get cookies for domain {}: {}", domain, e);
                None
            }
        }
    }

    async fn store_cookies(&self, domain: &str, set_cookies: &[String]) {
        if set_cookies.is_empty() {
            return;
        }

        let existing = self.get_cookies(domain).await;
        let cookie_header = merge_cookies(existing.as_deref(), set_cookies);

        let key = self.cookie_key(domain);
        let mut conn = self.redis.connection.clone();
        let result: Result<(), redis::RedisError> =
            conn.set_ex(&key, &cookie_header, COOKIE_TTL_SECONDS).await;

        match result {
            Ok(_) => debug!("Stored cookies for domain {}", domain),
            Err(e) => error!("Failed to store cookies for domain {}: {}", domain, e),
        }
    }
}

/// Process-local jar for when no redis is configured. Entries expire like the redis
/// keys do and the host count is capped, the entry closest to expiry goes first.
pub struct MemoryCookieService {
    jar: Mutex<HashMap<String, (Instant, String)>>,
    ttl: Duration,
    max_hosts: usize,
}

impl Default for MemoryCookieService {
    fn default() -> Self {
        Self::with_limits(Duration::from_secs(COOKIE_TTL_SECONDS), MEMORY_JAR_MAX_HOSTS)
    }
}

impl MemoryCookieService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(ttl: Duration, max_hosts: usize) -> Self {
        Self {
            jar: Mutex::new(HashMap::new()),
            ttl,
            max_hosts: max_hosts.max(1),
        }
    }
}

#[async_trait::async_trait]
impl CookieServiceTrait for MemoryCookieService {
    async fn get_cookies(&self, domain: &str) -> Option<String> {
        let jar = self.jar.lock().ok()?;
        jar.get(domain)
            .filter(|(expires_at, _)| *expires_at > Instant::now())
            .map(|(_, cookies)| cookies.clone())
    }

    async fn store_cookies(&self, domain: &str, set_cookies: &[String]) {
        if set_cookies.is_empty() {
            return;
        }

        let Ok(mut jar) = self.jar.lock() else {
            error!("Cookie jar lock poisoned, dropping cookies for {}", domain);
            return;
        };

        let now = Instant::now();
        jar.retain(|_, (expires_at, _)| *expires_at > now);

        if !jar.contains_key(domain) && jar.len() >= self.max_hosts {
            let oldest = jar
                .iter()
                .min_by_key(|(_, (expires_at, _))| *expires_at)
                .map(|(host, _)| host.clone());
            if let Some(host) = oldest {
                debug!("Cookie jar full, evicting {}", host);
                jar.remove(&host);
            }
        }

        let merged = merge_cookies(jar.get(domain).map(|(_, c)| c.as_str()), set_cookies);
        debug!("Stored cookies for domain {}", domain);
        jar.insert(domain.to_string(), (now + self.ttl, merged));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_name_value_and_replaces_by_name() {
        let merged = merge_cookies(
            Some("session=old; region=eu"),
            &[
                "session=new; Path=/; HttpOnly".to_string(),
                "cdn=abc; Max-Age=60".to_string(),
            ],
        );
        assert_eq!(merged, "session=new; region=eu; cdn=abc");
    }

    #[test]
    fn merge_ignores_garbage() {
        assert_eq!(
            merge_cookies(None, &["novalue".to_string(), "=x".to_string()]),
            ""
        );
    }

    #[test]
    fn domain_extraction() {
        assert_eq!(
            extract_domain("https://cdn.example.com:8443/live/a.m3u8"),
            Some("cdn.example.com".to_string())
        );
        assert_eq!(extract_domain("not a url"), None);
    }

    #[tokio::test]
    async fn memory_jar_round_trip() {
        let jar = MemoryCookieService::new();
        assert!(jar.get_cookies("o.example").await.is_none());

        jar.store_cookies("o.example", &["a=1; Path=/".to_string()])
            .await;
        jar.store_cookies("o.example", &["b=2".to_string(), "a=3".to_string()])
            .await;

        assert_eq!(jar.get_cookies("o.example").await.as_deref(), Some("a=3; b=2"));
        assert!(jar.get_cookies("other.example").await.is_none());
    }

    #[tokio::test]
    async fn memory_jar_forgets_expired_hosts() {
        let jar = MemoryCookieService::with_limits(Duration::from_millis(20), 16);
        jar.store_cookies("o.example", &["a=1".to_string()]).await;
        assert_eq!(jar.get_cookies("o.example").await.as_deref(), Some("a=1"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(jar.get_cookies("o.example").await.is_none());

        // expired values don't leak into the next merge either
        jar.store_cookies("o.example", &["b=2".to_string()]).await;
        assert_eq!(jar.get_cookies("o.example").await.as_deref(), Some("b=2"));
    }

    #[tokio::test]
    async fn memory_jar_caps_the_number_of_hosts() {
        let jar = MemoryCookieService::with_limits(Duration::from_secs(60), 3);
        for i in 0..10 {
            jar.store_cookies(&format!("h{}.example", i), &["a=1".to_string()])
                .await;
        }

        assert_eq!(jar.jar.lock().unwrap().len(), 3);
        assert!(jar.get_cookies("h0.example").await.is_none());
        assert!(jar.get_cookies("h9.example").await.is_some());

        // refreshing a known host never evicts
        jar.store_cookies("h9.example", &["b=2".to_string()]).await;
        assert_eq!(jar.jar.lock().unwrap().len(), 3);
    }
}
