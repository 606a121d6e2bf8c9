use serde::{Deserialize, Serialize};
use url::Url;

/// How a stream should be played back, and whether the relay has to rewrite it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// `.m3u8`/`.m3u` manifest, urls inside get rewritten
    Hls,
    /// raw transport stream, relayed as is
    MpegTs,
    /// anything else (mp4, extensionless, unknown), relayed as is
    Generic,
}

impl StreamKind {
    /// Guess from the url path alone. Plenty of IPTV origins drop the extension,
    /// those come back as `Generic` and need a look at the response.
    pub fn from_url(url: &str) -> Self {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_ascii_lowercase(),
            Err(_) => url
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_ascii_lowercase(),
        };

        if path.ends_with(".m3u8") || path.ends_with(".m3u") {
            Self::Hls
        } else if path.ends_with(".ts") {
            Self::MpegTs
        } else {
            Self::Generic
        }
    }

    /// `None` when the header says nothing useful (missing, octet-stream, text/plain).
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "application/vnd.apple.mpegurl"
            | "application/x-mpegurl"
            | "audio/mpegurl"
            | "audio/x-mpegurl" => Some(Self::Hls),
            "video/mp2t" | "video/mpeg" => Some(Self::MpegTs),
            m if m.starts_with("video/") || m.starts_with("audio/") => Some(Self::Generic),
            _ => None,
        }
    }

    /// Looks at the first bytes of a body, manifests start with `#EXTM3U`
    /// (optionally behind a BOM or whitespace).
    pub fn sniff(first_bytes: &[u8]) -> Self {
        let body = first_bytes
            .strip_prefix(b"\xef\xbb\xbf".as_slice())
            .unwrap_or(first_bytes);
        let start = body
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(body.len());

        if body[start..].starts_with(b"#EXTM3U") {
            Self::Hls
        } else if body.first() == Some(&0x47) {
            // ts sync byte
            Self::MpegTs
        } else {
            Self::Generic
        }
    }

    /// Decides from what is known before reading the body: content type first,
    /// then the url suffix. `None` means the body has to be sniffed.
    pub fn from_response(url: &str, content_type: Option<&str>) -> Option<Self> {
        if let Some(kind) = content_type.and_then(Self::from_content_type) {
            return Some(kind);
        }

        match Self::from_url(url) {
            Self::Generic => None,
            kind => Some(kind),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Hls => "application/vnd.apple.mpegurl",
            Self::MpegTs => "video/mp2t",
            Self::Generic => "application/octet-stream",
        }
    }
}
