use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TVG_LOGO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"tvg-logo="([^"]*)""#).expect("static regex should compile"));
static GROUP_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"group-title="([^"]*)""#).expect("static regex should compile"));

const EXTINF: &str = "#EXTINF:";

/// One playable entry pulled out of a playlist, in playlist order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedChannel {
    pub name: String,
    pub url: String,
    pub logo: Option<String>,
    pub group: Option<String>,
}

/// metadata of an `#EXTINF` line still waiting for its url line
struct PendingEntry {
    name: String,
    logo: Option<String>,
    group: Option<String>,
}

/// Parses M3U/M3U8 playlist text into channels.
///
/// Never fails: entries that can't be completed are dropped and anything
/// unrecognised degrades to fewer (or zero) channels.
pub fn parse_playlist(content: &str) -> Vec<ParsedChannel> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut channels = Vec::new();
    let mut pending: Option<PendingEntry> = None;

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if let Some(info) = line.strip_prefix(EXTINF) {
            // a second metadata line before any url drops the first one
            pending = parse_extinf(info);
            continue;
        }

        // #EXTVLCOPT, #KODIPROP, #EXTGRP and friends don't end the entry
        if line.starts_with('#') {
            continue;
        }

        if let Some(entry) = pending.take() {
            channels.push(ParsedChannel {
                name: entry.name,
                url: line.to_string(),
                logo: entry.logo,
                group: entry.group,
            });
        }
    }

    channels
}

fn parse_extinf(info: &str) -> Option<PendingEntry> {
    let (_, name) = info.rsplit_once(',')?;
    let name = name.trim();

    if name.is_empty() {
        return None;
    }

    Some(PendingEntry {
        name: name.to_string(),
        logo: capture_attr(&TVG_LOGO, info),
        group: capture_attr(&GROUP_TITLE, info),
    })
}

fn capture_attr(re: &Regex, info: &str) -> Option<String> {
    re.captures(info)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
