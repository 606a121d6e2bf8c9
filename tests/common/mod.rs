#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use streamvault::{
    AppConfig, SqliteDatabase,
    server::{ApplicationServer, services::AppServices},
};
use tokio::net::TcpListener;

pub const SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub base_url: String,
    pub services: AppServices,
    pub http: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// session token without going through the api
    pub fn token(&self, user_id: &str, is_admin: bool) -> String {
        self.services
            .token_util
            .issue(user_id, user_id, is_admin)
            .unwrap()
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        access_token_secret: SECRET.to_string(),
        upstream_timeout_secs: 5,
        ..AppConfig::default()
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_config()).await
}

pub async fn spawn_app_with(config: AppConfig) -> TestApp {
    let db = SqliteDatabase::in_memory().await.unwrap();
    let services = AppServices::new(db, None, Arc::new(config)).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(ApplicationServer::run(listener, services.clone()));

    TestApp {
        base_url: format!("http://{}", addr),
        services,
        http: reqwest::Client::new(),
    }
}

/// serves `router` on a random local port, returns its base url
pub async fn spawn_origin(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}
