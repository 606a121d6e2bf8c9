use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;
use url::Url;

static URI_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"URI="([^"]*)""#).expect("static regex should compile"));

/// Rewrites every url in an HLS manifest so it routes back through the relay.
///
/// `base_url` is the url the manifest was fetched from, relative lines are resolved
/// against it before being handed to `link`, which turns an absolute origin url into
/// the relay url. Lines that can't be resolved are left untouched.
pub fn rewrite_manifest<F>(text: &str, base_url: &Url, link: F) -> String
where
    F: Fn(&str) -> String,
{
    let mut rewritten = text
        .lines()
        .map(|line| {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                return line.to_string();
            }

            // keys, init segments and alternate renditions hide their urls in tags
            if trimmed.starts_with('#') {
                if !trimmed.contains("URI=\"") {
                    return line.to_string();
                }
                return URI_ATTR
                    .replace_all(line, |caps: &Captures| match resolve(base_url, &caps[1]) {
                        Some(absolute) => format!("URI=\"{}\"", link(absolute.as_str())),
                        None => caps[0].to_string(),
                    })
                    .into_owned();
            }

            match resolve(base_url, trimmed) {
                Some(absolute) => link(absolute.as_str()),
                None => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    if text.ends_with('\n') {
        rewritten.push('\n');
    }
    rewritten
}

fn resolve(base_url: &Url, reference: &str) -> Option<Url> {
    // data: and skd: style keys aren't fetchable through the relay
    if let Ok(parsed) = Url::parse(reference) {
        return matches!(parsed.scheme(), "http" | "https").then_some(parsed);
    }

    match base_url.join(reference) {
        Ok(resolved) => Some(resolved),
        Err(e) => {
            debug!("Failed to resolve manifest line {}: {}", reference, e);
            None
        }
    }
}
