use streamvault::m3u::{ParsedChannel, StreamKind, parse_playlist, rewrite_manifest};
use url::Url;

fn playlist_of(n: usize) -> String {
    let mut text = String::from("#EXTM3U\n");
    for i in 0..n {
        text.push_str(&format!(
            "#EXTINF:-1 tvg-id=\"c{i}\" group-title=\"Group {g}\",Channel {i}\nhttp://origin.example/{i}.m3u8\n",
            g = i % 3
        ));
    }
    text
}

#[test]
fn return_one_record_per_pair_in_order() {
    for n in [0, 1, 7, 250] {
        let channels = parse_playlist(&playlist_of(n));
        assert_eq!(channels.len(), n);
        for (i, channel) in channels.iter().enumerate() {
            assert_eq!(channel.name, format!("Channel {}", i));
            assert_eq!(channel.url, format!("http://origin.example/{}.m3u8", i));
            assert_eq!(channel.group, Some(format!("Group {}", i % 3)));
        }
    }
}

#[test]
fn parse_the_reference_scenario() {
    let text = "#EXTM3U\n#EXTINF:-1 tvg-logo=\"x.png\" group-title=\"News\",CNN\nhttp://origin/cnn.m3u8\n";

    assert_eq!(
        parse_playlist(text),
        vec![ParsedChannel {
            name: "CNN".to_string(),
            url: "http://origin/cnn.m3u8".to_string(),
            logo: Some("x.png".to_string()),
            group: Some("News".to_string()),
        }]
    );
}

#[test]
fn drop_metadata_without_a_url() {
    let text = "#EXTM3U\n#EXTINF:-1,Orphan\n#EXTINF:-1,Kept\nhttp://origin/kept.ts\n";
    let channels = parse_playlist(text);

    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].name, "Kept");
}

#[test]
fn cope_with_windows_line_endings() {
    let text = "#EXTM3U\r\n#EXTINF:-1,CRLF\r\nhttp://origin/crlf.ts\r\n";
    let channels = parse_playlist(text);

    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].url, "http://origin/crlf.ts");
}

#[test]
fn be_idempotent() {
    let text = playlist_of(20);
    assert_eq!(parse_playlist(&text), parse_playlist(&text));
}

#[test]
fn classify_parsed_urls() {
    let channels = parse_playlist(
        "#EXTINF:-1,A\nhttp://o/a.m3u8\n#EXTINF:-1,B\nhttp://o/b.ts\n#EXTINF:-1,C\nhttp://o/live/c\n",
    );
    let kinds: Vec<StreamKind> = channels.iter().map(|c| StreamKind::from_url(&c.url)).collect();

    assert_eq!(
        kinds,
        vec![StreamKind::Hls, StreamKind::MpegTs, StreamKind::Generic]
    );
}

#[test]
fn rewrite_relative_segments_to_links_that_resolve_back() {
    let base = Url::parse("http://origin.example/live/chan/index.m3u8").unwrap();
    let manifest = "#EXTM3U\n#EXTINF:10,\nsegment1.ts\n";

    let rewritten = rewrite_manifest(manifest, &base, |absolute| {
        format!("/relay?u={}", urlencoding::encode(absolute))
    });

    let link = rewritten.lines().nth(2).unwrap();
    let target = urlencoding::decode(link.strip_prefix("/relay?u=").unwrap()).unwrap();
    assert_eq!(target, "http://origin.example/live/chan/segment1.ts");
}
