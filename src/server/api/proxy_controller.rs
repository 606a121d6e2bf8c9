use std::io::{Read, Write};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::Query,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use futures::{StreamExt, stream};
use serde::Deserialize;
use tracing::{debug, error, warn};
use url::Url;

use crate::m3u::{StreamKind, rewrite_manifest};
use crate::server::{
    error::{AppResult, Error},
    extractors::StreamAuthentication,
    services::{AppServices, cookie_services::extract_domain},
    utils::signature_utils::SignatureUtil,
};

/// headers copied from the origin when bytes are relayed untouched
const PASSTHROUGH_HEADERS: [header::HeaderName; 5] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
    header::CONTENT_ENCODING,
];

/// Supported compression encodings
#[derive(Debug, Clone, Copy, PartialEq)]
enum ContentEncoding {
    Zstd,
    Gzip,
    None,
}

impl ContentEncoding {
    /// determine the best encoding based on Accept-Encoding header
    /// apple HLS player sends "gzip, deflate" or "identity" and that has to be respected
    fn from_accept_encoding(accept_encoding: Option<&str>) -> Self {
        match accept_encoding {
            Some(v) => {
                // don't compress if client explicitly requests identity-only
                if v == "identity" || v.starts_with("identity,") {
                    return Self::None;
                }
                // prefer zstd if supported, fallback to gzip
                if v.contains("zstd") {
                    Self::Zstd
                } else if v.contains("gzip") {
                    Self::Gzip
                } else {
                    Self::None
                }
            }
            None => Self::None,
        }
    }

    fn as_header_value(&self) -> Option<&'static str> {
        match self {
            Self::Zstd => Some("zstd"),
            Self::Gzip => Some("gzip"),
            Self::None => None,
        }
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
        match self {
            Self::Zstd => zstd::encode_all(data, 3),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Self::None => Ok(data.to_vec()),
        }
    }
}

#[derive(Deserialize)]
struct ProxyQuery {
    url: String,
}

pub struct ProxyController;

impl ProxyController {
    pub fn app() -> Router {
        Router::new()
            .route("/stream", get(Self::proxy_get).options(Self::proxy_options))
            // older players still ask for this one
            .route("/m3u8", get(Self::proxy_get).options(Self::proxy_options))
            .layer(middleware::map_response(Self::relay_cors_headers))
    }

    /// Players fetch from any page that holds a link, auth lives in the query, not in
    /// cookies, so any origin may read the relay.
    async fn relay_cors_headers(mut response: Response) -> Response {
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Authorization, Range"),
        );
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("Content-Length, Content-Range, Accept-Ranges"),
        );
        response
    }

    async fn proxy_get(
        StreamAuthentication {
            subject,
            client_id,
            services,
        }: StreamAuthentication,
        Query(params): Query<ProxyQuery>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        if let Some(retry_after) = services
            .rate_limit
            .check_rate_limit(&client_id)
            .await
            .retry_after()
        {
            return Err(Error::RateLimited { retry_after });
        }

        let target_url = Self::decode_url(&params.url)?;
        let parsed = Url::parse(&target_url)
            .map_err(|_| Error::BadRequest("Invalid URL format".to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::BadRequest("Invalid URL format".to_string()));
        }

        debug!("Relaying for {}: {}", subject, target_url);

        let domain = extract_domain(&target_url);
        let stored_cookies = match domain.as_deref() {
            Some(d) => services.cookies.get_cookies(d).await,
            None => None,
        };

        let mut request_builder = services
            .http
            .get(parsed)
            .header(header::USER_AGENT, &services.config.upstream_user_agent)
            .header(header::ACCEPT, "*/*")
            .header(
                header::ACCEPT_ENCODING,
                Self::upstream_accept_encoding(&target_url, &headers),
            );

        if let Some(range) = headers.get(header::RANGE) {
            request_builder = request_builder.header(header::RANGE, range.clone());
        }

        if let Some(cookies) = stored_cookies {
            debug!("Adding stored cookies to request: {}", cookies);
            request_builder = request_builder.header(header::COOKIE, cookies);
        }

        // one attempt, the player decides whether to ask again
        let sent =
            tokio::time::timeout(services.config.upstream_timeout(), request_builder.send()).await;

        let target_response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!("Relay request to {} failed: {}", target_url, e);
                Self::record_error(&services, &client_id, "relay_request_failed");
                let reason = if e.is_timeout() {
                    "origin timed out".to_string()
                } else {
                    "origin unreachable".to_string()
                };
                return Err(Error::ProxyFailure(reason));
            }
            Err(_) => {
                error!("Relay request to {} timed out", target_url);
                Self::record_error(&services, &client_id, "relay_request_timeout");
                return Err(Error::ProxyFailure("origin timed out".to_string()));
            }
        };

        if let Some(d) = domain {
            let set_cookies: Vec<String> = target_response
                .headers()
                .get_all(header::SET_COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok().map(|s| s.to_string()))
                .collect();

            if !set_cookies.is_empty() {
                debug!("Storing {} cookies from response", set_cookies.len());
                let cookie_service = services.cookies.clone();
                tokio::spawn(async move {
                    cookie_service.store_cookies(&d, &set_cookies).await;
                });
            }
        }

        let response_status = target_response.status();
        if !response_status.is_success() {
            // the body is usually a cloudflare page, not worth logging
            error!(
                "User: {}, origin {} answered {}",
                subject, target_url, response_status
            );
            if response_status.is_client_error() {
                Self::record_error(&services, &client_id, "relay_upstream_client_error");
            }
            return Err(Error::ProxyFailure(format!(
                "origin returned {}",
                response_status.as_u16()
            )));
        }

        let content_type = target_response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let content_encoding = target_response
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_ascii_lowercase());

        // redirects move the manifest, relative lines resolve against where it ended up
        let final_url = target_response.url().clone();
        let status = target_response.status();
        let origin_headers = target_response.headers().clone();
        let mut body = Box::pin(target_response.bytes_stream());

        let kind = StreamKind::from_response(final_url.as_str(), content_type.as_deref());
        let (kind, first_chunk) = match kind {
            Some(kind) => (kind, None),
            None => {
                let first = match body.next().await {
                    Some(Ok(chunk)) => Some(chunk),
                    Some(Err(e)) => {
                        error!("Failed to read from {}: {}", target_url, e);
                        return Err(Error::ProxyFailure("origin stream broke".to_string()));
                    }
                    None => None,
                };
                let sniffed = first
                    .as_ref()
                    .map(|chunk| {
                        StreamKind::sniff(&Self::sniff_prefix(chunk, content_encoding.as_deref()))
                    })
                    .unwrap_or(StreamKind::Generic);
                (sniffed, first)
            }
        };
        debug!(
            "Content-Type: {:?}, Encoding: {:?}, kind: {:?}",
            content_type, content_encoding, kind
        );

        if kind == StreamKind::Hls {
            let limit = services.config.max_manifest_bytes;
            let mut raw: Vec<u8> = first_chunk.map(|c| c.to_vec()).unwrap_or_default();
            loop {
                if raw.len() > limit {
                    warn!("Manifest {} exceeds {} bytes", target_url, limit);
                    return Err(Error::ProxyFailure("manifest too large".to_string()));
                }
                let Some(chunk) = body.next().await else {
                    break;
                };
                let chunk = chunk.map_err(|e| {
                    error!("Failed to read manifest {}: {}", target_url, e);
                    Error::ProxyFailure("origin stream broke".to_string())
                })?;
                raw.extend_from_slice(&chunk);
            }

            let decompressed = Self::decompress(raw, content_encoding.as_deref(), limit)?;
            let text = String::from_utf8_lossy(&decompressed);

            let endpoint = Self::proxy_endpoint(services.config.public_url.as_deref());
            let expiry = SignatureUtil::generate_expiry(services.config.signed_link_ttl_hours);
            let processed_body = rewrite_manifest(&text, &final_url, |absolute| {
                services
                    .signature_util
                    .signed_link(&endpoint, &subject, expiry, absolute)
            });
            debug!(
                "Rewrote manifest {}, response length: {} bytes",
                target_url,
                processed_body.len()
            );

            return Self::build_m3u8_response(&processed_body, &headers);
        }

        let chunks = stream::iter(first_chunk.map(Ok::<Bytes, reqwest::Error>)).chain(body);
        let mut response = Body::from_stream(chunks).into_response();
        *response.status_mut() = status;

        let response_headers = response.headers_mut();
        for name in PASSTHROUGH_HEADERS {
            if let Some(value) = origin_headers.get(&name) {
                response_headers.insert(name, value.clone());
            }
        }
        if !response_headers.contains_key(header::CONTENT_TYPE) {
            response_headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(kind.content_type()),
            );
        }

        Ok(response)
    }

    async fn proxy_options() -> impl IntoResponse {
        StatusCode::NO_CONTENT
    }

    /// failures count against the client in the background, the response doesn't wait
    fn record_error(services: &AppServices, client_id: &str, error_type: &'static str) {
        let rate_limit = services.rate_limit.clone();
        let uid = client_id.to_string();
        tokio::spawn(async move {
            rate_limit.record_error(&uid, error_type).await;
        });
    }

    /// build m3u8 response with proper headers and optional compression
    fn build_m3u8_response(processed_body: &str, headers: &HeaderMap) -> AppResult<Response> {
        // apple hls likes gzip, not zstd
        let encoding = ContentEncoding::from_accept_encoding(
            headers
                .get(header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        );

        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(StreamKind::Hls.content_type()),
        );
        response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let response_body: Vec<u8> = if encoding != ContentEncoding::None {
            let compressed_body = encoding.compress(processed_body.as_bytes()).map_err(|e| {
                error!("Failed to compress response with {:?}: {}", encoding, e);
                Error::InternalServerErrorWithContext("Failed to compress response".to_string())
            })?;
            debug!(
                "Compressed M3U8 with {:?} from {} to {} bytes",
                encoding,
                processed_body.len(),
                compressed_body.len()
            );
            if let Some(enc_header) = encoding.as_header_value() {
                response_headers
                    .insert(header::CONTENT_ENCODING, HeaderValue::from_static(enc_header));
            }
            compressed_body
        } else {
            processed_body.as_bytes().to_vec()
        };

        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(response_body.len()));

        Ok((StatusCode::OK, response_headers, response_body).into_response())
    }

    /// Plain urls come percent-decoded by the query extractor already, anything else is
    /// taken as url-safe base64 with or without padding.
    fn decode_url(url_param: &str) -> AppResult<String> {
        let trimmed = url_param.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Ok(trimmed.to_string());
        }

        let mut padded = trimmed.to_string();
        while !padded.len().is_multiple_of(4) {
            padded.push('=');
        }

        URL_SAFE
            .decode(&padded)
            .map_err(|e| {
                debug!("Failed to decode base64 url: {}", e);
                Error::BadRequest("Invalid URL encoding".to_string())
            })
            .and_then(|bytes| {
                String::from_utf8(bytes)
                    .map_err(|_| Error::BadRequest("Invalid URL encoding".to_string()))
            })
    }

    /// where rewritten manifest lines point, relative when no public url is configured
    fn proxy_endpoint(public_url: Option<&str>) -> String {
        match public_url.map(|u| u.trim_end_matches('/')) {
            Some(base) if !base.is_empty() => format!("{}/api/proxy/stream", base),
            _ => "/api/proxy/stream".to_string(),
        }
    }

    /// Manifests are decoded here so only ask for what we can undo. Everything else is
    /// relayed as is, so the origin may only use what the client itself accepts.
    fn upstream_accept_encoding(target_url: &str, headers: &HeaderMap) -> HeaderValue {
        if StreamKind::from_url(target_url) == StreamKind::Hls {
            return HeaderValue::from_static("gzip, zstd");
        }

        headers
            .get(header::ACCEPT_ENCODING)
            .filter(|v| {
                v.to_str()
                    .map(|s| !s.contains("br") && !s.contains("deflate"))
                    .unwrap_or(false)
            })
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("identity"))
    }

    /// Decodes a buffered manifest, refusing to inflate past `limit` bytes.
    fn decompress(
        bytes: Vec<u8>,
        content_encoding: Option<&str>,
        limit: usize,
    ) -> AppResult<Vec<u8>> {
        match content_encoding {
            Some("zstd") => {
                debug!("Decompressing zstd-encoded manifest");
                let decoder = zstd::stream::read::Decoder::new(&bytes[..]).map_err(|e| {
                    error!("Failed to start zstd decoder: {}", e);
                    Error::ProxyFailure("could not decompress manifest".to_string())
                })?;
                Self::read_capped(decoder, limit)
            }
            Some("gzip") => {
                debug!("Decompressing gzip-encoded manifest");
                Self::read_capped(GzDecoder::new(&bytes[..]), limit)
            }
            None | Some("identity") if bytes.len() > limit => {
                Err(Error::ProxyFailure("manifest too large".to_string()))
            }
            None | Some("identity") => Ok(bytes),
            Some(other) => Err(Error::ProxyFailure(format!(
                "unsupported manifest encoding {}",
                other
            ))),
        }
    }

    fn read_capped<R: Read>(decoder: R, limit: usize) -> AppResult<Vec<u8>> {
        let mut decomp: Vec<u8> = Vec::new();
        decoder
            .take(limit as u64 + 1)
            .read_to_end(&mut decomp)
            .map_err(|e| {
                error!("Failed to decompress manifest: {}", e);
                Error::ProxyFailure("could not decompress manifest".to_string())
            })?;

        if decomp.len() > limit {
            warn!("Decompressed manifest exceeds {} bytes", limit);
            return Err(Error::ProxyFailure("manifest too large".to_string()));
        }
        Ok(decomp)
    }

    /// first plain bytes of a possibly gzipped chunk, enough to sniff on
    fn sniff_prefix(chunk: &[u8], content_encoding: Option<&str>) -> Vec<u8> {
        if content_encoding != Some("gzip") {
            return chunk.to_vec();
        }

        let mut buf = [0u8; 64];
        match GzDecoder::new(chunk).read(&mut buf) {
            Ok(n) => buf[..n].to_vec(),
            Err(_) => chunk.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_encoding_preference() {
        assert_eq!(
            ContentEncoding::from_accept_encoding(Some("gzip, deflate, br, zstd")),
            ContentEncoding::Zstd
        );
        assert_eq!(
            ContentEncoding::from_accept_encoding(Some("gzip, deflate")),
            ContentEncoding::Gzip
        );
        assert_eq!(
            ContentEncoding::from_accept_encoding(Some("identity")),
            ContentEncoding::None
        );
        assert_eq!(ContentEncoding::from_accept_encoding(None), ContentEncoding::None);
    }

    #[test]
    fn decode_plain_and_base64_urls() {
        assert_eq!(
            ProxyController::decode_url("http://o.example/live/a.m3u8").unwrap(),
            "http://o.example/live/a.m3u8"
        );

        let encoded = URL_SAFE.encode("https://o.example/x.ts");
        let unpadded = encoded.trim_end_matches('=');
        assert_eq!(
            ProxyController::decode_url(unpadded).unwrap(),
            "https://o.example/x.ts"
        );

        assert!(matches!(
            ProxyController::decode_url("%%%"),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn endpoint_is_relative_without_public_url() {
        assert_eq!(ProxyController::proxy_endpoint(None), "/api/proxy/stream");
        assert_eq!(ProxyController::proxy_endpoint(Some("")), "/api/proxy/stream");
        assert_eq!(
            ProxyController::proxy_endpoint(Some("https://tv.example.com/")),
            "https://tv.example.com/api/proxy/stream"
        );
    }

    #[test]
    fn gzip_manifest_round_trip() {
        let text = b"#EXTM3U\n#EXTINF:10,\nsegment1.ts\n";
        let gz = ContentEncoding::Gzip.compress(text).unwrap();

        assert_eq!(
            StreamKind::sniff(&ProxyController::sniff_prefix(&gz, Some("gzip"))),
            StreamKind::Hls
        );
        assert_eq!(
            ProxyController::decompress(gz, Some("gzip"), 1024).unwrap(),
            text.to_vec()
        );

        let zst = ContentEncoding::Zstd.compress(text).unwrap();
        assert_eq!(
            ProxyController::decompress(zst, Some("zstd"), 1024).unwrap(),
            text.to_vec()
        );

        assert!(matches!(
            ProxyController::decompress(text.to_vec(), Some("br"), 1024),
            Err(Error::ProxyFailure(_))
        ));
    }

    #[test]
    fn decompression_stops_at_the_manifest_cap() {
        let limit = 64 * 1024;
        // a few KiB on the wire, several MiB once inflated
        let bomb = vec![b'#'; 8 * 1024 * 1024];

        for encoding in [ContentEncoding::Gzip, ContentEncoding::Zstd] {
            let compressed = encoding.compress(&bomb).unwrap();
            assert!(compressed.len() < limit);

            let result = ProxyController::decompress(compressed, encoding.as_header_value(), limit);
            assert!(
                matches!(&result, Err(Error::ProxyFailure(msg)) if msg == "manifest too large"),
                "{:?} inflated past the cap",
                encoding
            );
        }

        let exact = vec![b'#'; limit];
        let gz = ContentEncoding::Gzip.compress(&exact).unwrap();
        assert_eq!(
            ProxyController::decompress(gz, Some("gzip"), limit).unwrap().len(),
            limit
        );

        assert!(matches!(
            ProxyController::decompress(vec![b'#'; limit + 1], None, limit),
            Err(Error::ProxyFailure(_))
        ));
    }

    #[test]
    fn manifests_only_ask_for_decodable_encodings() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip, br"));

        assert_eq!(
            ProxyController::upstream_accept_encoding("http://o/a.m3u8", &headers),
            "gzip, zstd"
        );
        assert_eq!(
            ProxyController::upstream_accept_encoding("http://o/a.ts", &headers),
            "identity"
        );
        assert_eq!(
            ProxyController::upstream_accept_encoding("http://o/a.ts", &HeaderMap::new()),
            "identity"
        );
    }
}
