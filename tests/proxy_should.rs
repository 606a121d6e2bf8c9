mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use common::{TestApp, spawn_app, spawn_app_with, spawn_origin, test_config};

const MANIFEST: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\nsegment1.ts\n#EXTINF:10.0,\n/abs/segment2.ts\n#EXT-X-ENDLIST\n";

fn segment_bytes() -> Vec<u8> {
    (0..376u32).map(|i| if i % 188 == 0 { 0x47 } else { i as u8 }).collect()
}

#[derive(Clone, Default)]
struct Origin {
    hits: Arc<AtomicUsize>,
}

async fn manifest(State(origin): State<Origin>) -> impl IntoResponse {
    origin.hits.fetch_add(1, Ordering::SeqCst);
    (
        [
            (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
            (header::SET_COOKIE, "session=abc; Path=/"),
        ],
        MANIFEST,
    )
}

/// no extension and a useless content type, has to be sniffed
async fn extensionless(State(origin): State<Origin>) -> impl IntoResponse {
    origin.hits.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "text/plain")], MANIFEST)
}

async fn segment(State(origin): State<Origin>, headers: HeaderMap) -> impl IntoResponse {
    origin.hits.fetch_add(1, Ordering::SeqCst);
    let bytes = segment_bytes();

    match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        Some("bytes=0-187") => (
            StatusCode::PARTIAL_CONTENT,
            [
                (header::CONTENT_TYPE, "video/mp2t".to_string()),
                (header::CONTENT_RANGE, format!("bytes 0-187/{}", bytes.len())),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            bytes[..188].to_vec(),
        ),
        _ => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "video/mp2t".to_string()),
                (header::CACHE_CONTROL, "no-store".to_string()),
                (header::ACCEPT_RANGES, "bytes".to_string()),
            ],
            bytes,
        ),
    }
}

async fn missing(State(origin): State<Origin>) -> impl IntoResponse {
    origin.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::NOT_FOUND, "<html>cloudflare says no</html>")
}

async fn start_origin() -> (String, Origin) {
    let origin = Origin::default();
    let router = Router::new()
        .route("/live/index.m3u8", get(manifest))
        .route("/live/segment1.ts", get(segment))
        .route("/live/play", get(extensionless))
        .route("/missing.m3u8", get(missing))
        .with_state(origin.clone());

    (spawn_origin(router).await, origin)
}

fn proxy_path(origin_url: &str, token: &str) -> String {
    format!(
        "/api/proxy/stream?url={}&token={}",
        urlencoding::encode(origin_url),
        token
    )
}

async fn get_manifest(app: &TestApp, origin_url: &str) -> String {
    let response = app
        .http
        .get(app.url(&proxy_path(origin_url, &app.token("viewer", false))))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/vnd.apple.mpegurl"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    response.text().await.unwrap()
}

#[tokio::test]
async fn reject_unauthenticated_requests_before_contacting_the_origin() {
    let (origin_url, origin) = start_origin().await;
    let app = spawn_app().await;
    let target = urlencoding::encode(&format!("{}/live/index.m3u8", origin_url)).into_owned();

    let no_token = app
        .http
        .get(app.url(&format!("/api/proxy/stream?url={}", target)))
        .send()
        .await
        .unwrap();
    assert_eq!(no_token.status(), StatusCode::UNAUTHORIZED);

    let bad_token = app
        .http
        .get(app.url(&format!("/api/proxy/stream?url={}&token=garbage", target)))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_token.status(), StatusCode::UNAUTHORIZED);

    let forged = app
        .http
        .get(app.url(&format!(
            "/api/proxy/stream?url={}&sub=viewer&exp=99999999999&sig=deadbeef",
            target
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(origin.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rewrite_every_manifest_line_to_a_signed_relay_link() {
    let (origin_url, _origin) = start_origin().await;
    let app = spawn_app().await;

    let body = get_manifest(&app, &format!("{}/live/index.m3u8", origin_url)).await;
    let lines: Vec<&str> = body.lines().collect();

    assert_eq!(lines[0], "#EXTM3U");
    assert_eq!(lines[1], "#EXT-X-TARGETDURATION:10");
    assert_eq!(lines[2], "#EXTINF:10.0,");

    let relative = format!(
        "/api/proxy/stream?url={}&sub=viewer&",
        urlencoding::encode(&format!("{}/live/segment1.ts", origin_url))
    );
    assert!(lines[3].starts_with(&relative), "got {}", lines[3]);

    let root_relative = format!(
        "/api/proxy/stream?url={}&sub=viewer&",
        urlencoding::encode(&format!("{}/abs/segment2.ts", origin_url))
    );
    assert!(lines[5].starts_with(&root_relative), "got {}", lines[5]);

    assert_eq!(lines[6], "#EXT-X-ENDLIST");
    assert!(!body.lines().any(|l| l == "segment1.ts"));
}

#[tokio::test]
async fn relay_segments_through_signed_links() {
    let (origin_url, origin) = start_origin().await;
    let app = spawn_app().await;

    let body = get_manifest(&app, &format!("{}/live/index.m3u8", origin_url)).await;
    let segment_link = body.lines().nth(3).unwrap().to_string();

    let response = app.http.get(app.url(&segment_link)).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp2t");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
    // only the listed headers pass through
    assert!(response.headers().get(header::CACHE_CONTROL).is_none());
    assert_eq!(response.bytes().await.unwrap().to_vec(), segment_bytes());

    assert_eq!(origin.hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn reject_signed_links_pointing_somewhere_else() {
    let (origin_url, origin) = start_origin().await;
    let app = spawn_app().await;

    let body = get_manifest(&app, &format!("{}/live/index.m3u8", origin_url)).await;
    let segment_link = body.lines().nth(3).unwrap().to_string();

    let swapped = segment_link.replace(
        &urlencoding::encode("segment1.ts").into_owned(),
        "segment9.ts",
    );
    assert_ne!(swapped, segment_link);

    let response = app.http.get(app.url(&swapped)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(origin.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn forward_range_requests() {
    let (origin_url, _origin) = start_origin().await;
    let app = spawn_app().await;

    let response = app
        .http
        .get(app.url(&proxy_path(
            &format!("{}/live/segment1.ts", origin_url),
            &app.token("viewer", false),
        )))
        .header(header::RANGE, "bytes=0-187")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-187/376");
    assert_eq!(response.bytes().await.unwrap().len(), 188);
}

#[tokio::test]
async fn sniff_manifests_without_extension_or_content_type() {
    let (origin_url, _origin) = start_origin().await;
    let app = spawn_app().await;

    let body = get_manifest(&app, &format!("{}/live/play", origin_url)).await;
    let expected = format!(
        "/api/proxy/stream?url={}",
        urlencoding::encode(&format!("{}/live/segment1.ts", origin_url))
    );
    assert!(body.lines().nth(3).unwrap().starts_with(&expected));
}

#[tokio::test]
async fn refuse_manifests_over_the_size_cap() {
    let (origin_url, _origin) = start_origin().await;
    let app = spawn_app_with(streamvault::AppConfig {
        max_manifest_bytes: 32,
        ..test_config()
    })
    .await;
    let token = app.token("viewer", false);

    // small enough to arrive in the one chunk read for sniffing
    for path in ["/live/play", "/live/index.m3u8"] {
        let response = app
            .http
            .get(app.url(&proxy_path(&format!("{}{}", origin_url, path), &token)))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY, "{}", path);
        let body: serde_json::Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("manifest too large"));
    }
}

#[tokio::test]
async fn accept_bearer_headers() {
    let (origin_url, _origin) = start_origin().await;
    let app = spawn_app().await;

    let response = app
        .http
        .get(app.url(&format!(
            "/api/proxy/m3u8?url={}",
            urlencoding::encode(&format!("{}/live/index.m3u8", origin_url))
        )))
        .bearer_auth(app.token("viewer", false))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn answer_bad_gateway_when_the_origin_fails() {
    let (origin_url, _origin) = start_origin().await;
    let app = spawn_app().await;
    let token = app.token("viewer", false);

    let not_found = app
        .http
        .get(app.url(&proxy_path(&format!("{}/missing.m3u8", origin_url), &token)))
        .send()
        .await
        .unwrap();
    assert_eq!(not_found.status(), StatusCode::BAD_GATEWAY);
    let body: serde_json::Value = not_found.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("404"));
    assert!(body["hint"].as_str().unwrap().contains("external player"));

    // nothing listens on port 9 locally
    let unreachable = app
        .http
        .get(app.url(&proxy_path("http://127.0.0.1:9/live.m3u8", &token)))
        .send()
        .await
        .unwrap();
    assert_eq!(unreachable.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn refuse_non_http_origins() {
    let app = spawn_app().await;

    let response = app
        .http
        .get(app.url(&proxy_path("ftp://origin/live.ts", &app.token("viewer", false))))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn answer_options_with_no_content() {
    let app = spawn_app().await;

    for path in ["/api/proxy/stream", "/api/proxy/m3u8"] {
        let response = app
            .http
            .request(reqwest::Method::OPTIONS, app.url(path))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}

#[tokio::test]
async fn replay_origin_cookies_on_later_requests() {
    let seen_cookie: Arc<std::sync::Mutex<Option<String>>> = Arc::default();
    let recorder = seen_cookie.clone();

    let router = Router::new()
        .route(
            "/live/index.m3u8",
            get(|| async {
                (
                    [
                        (header::CONTENT_TYPE, "application/vnd.apple.mpegurl"),
                        (header::SET_COOKIE, "session=abc; Path=/; HttpOnly"),
                    ],
                    MANIFEST,
                )
            }),
        )
        .route(
            "/live/segment1.ts",
            get(move |headers: HeaderMap| {
                let recorder = recorder.clone();
                async move {
                    *recorder.lock().unwrap() = headers
                        .get(header::COOKIE)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    ([(header::CONTENT_TYPE, "video/mp2t")], segment_bytes())
                }
            }),
        );
    let origin_url = spawn_origin(router).await;
    let app = spawn_app().await;

    let body = get_manifest(&app, &format!("{}/live/index.m3u8", origin_url)).await;
    let segment_link = body.lines().nth(3).unwrap().to_string();

    // the jar is written in the background
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let response = app.http.get(app.url(&segment_link)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(seen_cookie.lock().unwrap().as_deref(), Some("session=abc"));
}
